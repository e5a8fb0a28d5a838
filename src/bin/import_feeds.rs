use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use nhl_features::config::{PipelineConfig, flag_value};
use nhl_features::feed::import_feed_dir;
use nhl_features::sqlite_store::SqliteStore;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut config = PipelineConfig::from_env().context("invalid NHL_* environment")?;
    config.apply_args(&args)?;
    let dir = flag_value(&args, "--dir")?
        .or_else(|| std::env::var("NHL_FEED_DIR").ok())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("pass --dir <live feed directory> or set NHL_FEED_DIR"))?;

    let mut store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("unable to open {}", config.db_path.display()))?;
    let summary = import_feed_dir(&mut store, &dir)
        .with_context(|| format!("unable to import {}", dir.display()))?;

    println!("Live feed import complete");
    println!("DB: {}", config.db_path.display());
    println!("Files: {}", summary.files_seen);
    println!("Games upserted: {}", summary.games_upserted);
    if !summary.errors.is_empty() {
        println!("errors: {}", summary.errors.len());
        for err in summary.errors.iter().take(6) {
            println!(" - {err}");
        }
    }
    Ok(())
}
