use std::env;
use std::path::PathBuf;

use membank_core::config::{expand_path, Settings};
use membank_embed::default_embedder;
use membank_segment::{scan_corpus, Segmenter};
use membank_vector::store::ChunkStore;
use membank_vector::vectorize::Vectorizer;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let settings = Settings::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut corpus_dir: Option<PathBuf> = None;
    let mut limit: Option<usize> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--limit" => {
                if let Some(n) = args.get(i + 1).and_then(|a| a.parse::<usize>().ok()) {
                    limit = Some(n);
                    i += 1;
                } else {
                    eprintln!("Error: --limit requires a number");
                    std::process::exit(1);
                }
            }
            a if !a.starts_with('-') => corpus_dir = Some(PathBuf::from(a)),
            _ => {}
        }
        i += 1;
    }
    let corpus_dir = corpus_dir.unwrap_or_else(|| expand_path(&settings.corpus_dir));

    println!("membank indexer\n===============");
    println!("Corpus: {}", corpus_dir.display());

    let mut documents = scan_corpus(&corpus_dir)?;
    if let Some(n) = limit {
        println!("Limiting to the first {} documents", n);
        documents.truncate(n);
    }
    println!("Found {} markdown documents", documents.len());

    let segmenter = Segmenter::from_settings(&settings);
    let mut chunks = Vec::new();
    let mut skipped_sections = 0usize;
    for doc in &documents {
        let segmented = segmenter.segment(doc);
        chunks.extend(segmented.chunks);
        skipped_sections += segmented.skipped_sections;
    }
    println!("Segmented into {} chunks ({} oversized sections skipped)", chunks.len(), skipped_sections);

    if chunks.is_empty() {
        println!("Nothing to index.");
        return Ok(());
    }

    let index_dir = expand_path(&settings.index_dir);
    std::fs::create_dir_all(&index_dir)?;
    let vectorizer = Vectorizer::new(default_embedder()?, settings.embed_batch_size);
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

    let rt = tokio::runtime::Runtime::new()?;
    let table = rt.block_on(async {
        let store = ChunkStore::open(index_dir.to_string_lossy().as_ref()).await?;
        let embeddings = vectorizer.embed_many(store.connection(), &texts).await?;
        store.build(&chunks, &embeddings).await
    })?;

    println!("\nIndexing completed: {} chunks in snapshot {}", chunks.len(), table);
    println!("Search with: cargo run --bin membank-search '<query>'");
    Ok(())
}
