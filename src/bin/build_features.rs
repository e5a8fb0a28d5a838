use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use nhl_features::config::PipelineConfig;
use nhl_features::export::export_training_set;
use nhl_features::pipeline::run_pipeline;
use nhl_features::sqlite_store::SqliteStore;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut config = PipelineConfig::from_env().context("invalid NHL_* environment")?;
    config
        .apply_args(&args)
        .context("invalid command-line arguments")?;
    let skip_export = args.iter().any(|arg| arg == "--no-export");

    let mut store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("unable to open {}", config.db_path.display()))?;
    let report = run_pipeline(&mut store, &config);

    println!("Feature build complete");
    println!("DB: {}", config.db_path.display());
    println!("Prior season weight: {}", config.prior_season_weight);
    for outcome in &report.outcomes {
        println!(
            "season {}: states={} snapshots={} features written={} skipped={} imputed={}",
            outcome.season,
            outcome.team_states,
            outcome.snapshots,
            outcome.features_written,
            outcome.features_skipped,
            outcome.imputed_teams.len()
        );
        if let Some(err) = &outcome.error {
            println!("  error: {err}");
        }
    }

    if !skip_export {
        let rows = export_training_set(&store, &config.training_seasons, &config.export_path)
            .with_context(|| format!("unable to export {}", config.export_path.display()))?;
        println!(
            "Exported {rows} rows for {:?} to {}",
            config.training_seasons,
            config.export_path.display()
        );
    }

    if !report.all_succeeded() {
        let failed = report.failed().map(|o| o.season).collect::<Vec<_>>();
        return Err(anyhow!("seasons failed: {failed:?}"));
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
