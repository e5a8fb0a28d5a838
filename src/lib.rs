pub mod blend;
pub mod config;
pub mod error;
pub mod export;
pub mod feed;
pub mod game;
pub mod pipeline;
pub mod prior_rates;
pub mod snapshot;
pub mod sqlite_store;
pub mod store;
pub mod team_state;

pub use blend::{DEFAULT_PRIOR_SEASON_WEIGHT, FeatureRow, blend};
pub use config::PipelineConfig;
pub use error::{Component, FeatureError, StoreError};
pub use game::{FranchiseId, Game, GameType, Side, Stat, StatLine};
pub use pipeline::{PipelineReport, SeasonOutcome, matchup_features, run_pipeline};
pub use sqlite_store::SqliteStore;
pub use store::{GameStore, MemoryStore};
