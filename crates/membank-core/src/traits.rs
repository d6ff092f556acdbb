pub trait Embedder: Send + Sync {
    /// Stable identifier for the backend/model (e.g., `local:bge-m3:d1024`).
    /// Cache entries are keyed by it, so two backends never share vectors.
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality (D).
    fn dim(&self) -> usize;
    /// Maximum token length accepted per input.
    fn max_len(&self) -> usize;
    /// Compute L2-normalized embeddings for a batch of input texts.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
