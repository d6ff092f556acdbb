use std::env;

use chrono::Utc;
use membank_core::config::{expand_path, Settings};
use membank_core::types::{RankedEntry, SearchOptions, UsageRecord};
use membank_embed::default_embedder;
use membank_learn::{UsageTracker, WeightStore};
use membank_rank::Ranker;
use membank_vector::store::ChunkStore;
use membank_vector::vectorize::Vectorizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let settings = Settings::load()?;

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <query> [--domain D] [--limit K] [--threshold T] [--select ID]", args[0]);
        eprintln!("Example: {} 'water storage' --domain homestead --limit 5", args[0]);
        std::process::exit(1);
    }
    let query = args[1].clone();
    let mut opts = SearchOptions::default();
    let mut selected: Option<String> = None;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--domain" => {
                opts.domain = args.get(i + 1).cloned();
                i += 1;
            }
            "--limit" => {
                opts.limit = args.get(i + 1).and_then(|a| a.parse().ok());
                i += 1;
            }
            "--threshold" => {
                opts.threshold = args.get(i + 1).and_then(|a| a.parse().ok());
                i += 1;
            }
            "--recency" => opts.recency = true,
            "--select" => {
                selected = args.get(i + 1).cloned();
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }

    let index_dir = expand_path(&settings.index_dir);
    let store = ChunkStore::open(index_dir.to_string_lossy().as_ref()).await?;
    let vectorizer = Vectorizer::new(default_embedder()?, settings.embed_batch_size);
    let weights = WeightStore::new(expand_path(&settings.weights_file))
        .load_or(settings.default_weights());
    let ranker = Ranker::new(&store, &vectorizer, weights, &settings);

    let results = ranker.search(&query, &opts).await?;

    println!("Found {} results for \"{}\"", results.len(), query);
    for (i, r) in results.iter().enumerate() {
        println!(
            "\n  {}. score={:.4} (semantic={:.4} lexical={:.4} boost={:.2})",
            i + 1,
            r.combined,
            r.scores.semantic,
            r.scores.lexical,
            r.scores.boost
        );
        println!("     id={}  domain={}  path={}", r.chunk.id, r.chunk.domain, r.chunk.doc_path);
        if !r.chunk.section_header.is_empty() {
            println!("     {}", r.chunk.section_header);
        }
        let preview: String = r.chunk.content.chars().take(160).collect();
        println!("     {}", preview.replace('\n', " "));
    }

    let record = UsageRecord {
        query,
        timestamp_ms: Utc::now().timestamp_millis(),
        domain: opts.domain.clone(),
        results: results.iter().map(RankedEntry::from_result).collect(),
        selected,
    };
    UsageTracker::new(expand_path(&settings.usage_log)).record(&record)?;
    Ok(())
}
