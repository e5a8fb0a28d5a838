use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use nhl_features::config::{PipelineConfig, flag_value};
use nhl_features::game::FranchiseId;
use nhl_features::pipeline::matchup_features;
use nhl_features::prior_rates::RateStat;
use nhl_features::sqlite_store::SqliteStore;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut config = PipelineConfig::from_env().context("invalid NHL_* environment")?;
    config.apply_args(&args)?;
    let season = required(&args, "--season")?
        .parse::<i32>()
        .context("--season must be a year")?;
    let home = parse_team(&args, "--home")?;
    let away = parse_team(&args, "--away")?;

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("unable to open {}", config.db_path.display()))?;
    let features = matchup_features(&store, season, home, away, config.prior_season_weight)?;

    println!(
        "season {season}: {home} ({} played) vs {away} ({} played)",
        features.home_games_played, features.away_games_played
    );
    for rate in RateStat::ALL {
        println!(
            "{:<16} home={:>8.4} away={:>8.4}",
            rate.name(),
            features.home.get(rate),
            features.away.get(rate)
        );
    }
    Ok(())
}

fn required(args: &[String], flag: &str) -> Result<String> {
    flag_value(args, flag)?.ok_or_else(|| anyhow!("missing {flag}"))
}

fn parse_team(args: &[String], flag: &str) -> Result<FranchiseId> {
    let raw = required(args, flag)?;
    let id = raw
        .parse::<u32>()
        .with_context(|| format!("{flag} must be a franchise id, got {raw}"))?;
    Ok(FranchiseId(id))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
