use membank_core::error::Error;
use membank_core::traits::Embedder;
use membank_embed::{default_embedder, HashedEmbedder, EMBED_DIM};

#[test]
fn hashed_embedder_shapes_and_determinism() {
    let embedder = HashedEmbedder::new(EMBED_DIM);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), EMBED_DIM, "embedding dim is {EMBED_DIM}");

    // Norm approximately 1.0
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    // Bit-identical for identical input, exactly what the cache relies on.
    assert_eq!(v1, v2);
}

#[test]
fn different_texts_produce_different_vectors() {
    let embedder = HashedEmbedder::new(EMBED_DIM);
    let embs = embedder
        .embed_batch(&["alpha bravo".to_string(), "charlie delta".to_string()])
        .expect("embed_batch");
    assert_ne!(embs[0], embs[1]);
}

// Env-var driven selection paths, kept in one test to avoid races between
// parallel tests mutating the process environment.
#[test]
fn backend_selection_and_missing_model_error() {
    std::env::remove_var("APP_USE_FAKE_EMBEDDINGS");
    std::env::set_var("APP_MODEL_DIR", "/definitely/not/a/model/dir");
    std::env::remove_var("MODEL_DIR");
    let err = match default_embedder() {
        Err(e) => e,
        Ok(_) => panic!("expected failure without a model directory"),
    };
    match err.downcast_ref::<Error>() {
        Some(Error::ModelUnavailable(_)) => {}
        other => panic!("expected ModelUnavailable, got {:?}", other),
    }

    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");
    let embedder = default_embedder().expect("embedder");
    assert_eq!(embedder.dim(), EMBED_DIM);
    assert!(embedder.embedder_id().starts_with("fake:"));
}
