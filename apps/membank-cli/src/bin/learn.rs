use std::env;

use membank_core::config::{expand_path, Settings};
use membank_learn::{update_weights, UsageTracker, WeightStore};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let settings = Settings::load()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut window_days = settings.learn.window_days;
    let mut dry_run = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--window-days" => {
                if let Some(n) = args.get(i + 1).and_then(|a| a.parse::<i64>().ok()) {
                    window_days = n;
                    i += 1;
                } else {
                    eprintln!("Error: --window-days requires a number");
                    std::process::exit(1);
                }
            }
            "--dry-run" => dry_run = true,
            _ => {}
        }
        i += 1;
    }

    let tracker = UsageTracker::new(expand_path(&settings.usage_log));
    let records = tracker.recent(window_days)?;
    let with_selection = records.iter().filter(|r| r.selected.is_some()).count();
    println!("Loaded {} usage records from the last {} days ({} with a selection)",
        records.len(), window_days, with_selection);

    let store = WeightStore::new(expand_path(&settings.weights_file));
    let current = store.load_or(settings.default_weights());
    let updated = update_weights(current, &records, &settings.learn);

    println!("weights: semantic {:.4} -> {:.4}", current.semantic, updated.semantic);
    println!("         lexical  {:.4} -> {:.4}", current.lexical, updated.lexical);

    if updated == current {
        println!("No adjustment.");
        return Ok(());
    }
    if dry_run {
        println!("Dry run: weights not persisted.");
        return Ok(());
    }
    store.save(updated)?;
    println!("Weights persisted.");
    Ok(())
}
