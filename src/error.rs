use std::fmt;

use thiserror::Error;

use crate::game::{FranchiseId, Side};

/// Pipeline stage an error surfaced from, kept so a failed season can be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Games,
    TeamState,
    Snapshot,
    Blender,
    Export,
    Import,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Games => "games",
            Component::TeamState => "team_state",
            Component::Snapshot => "snapshot",
            Component::Blender => "blender",
            Component::Export => "export",
            Component::Import => "import",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot decode {table} row: {detail}")]
    Decode { table: &'static str, detail: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store rejected write for season {season}")]
    Rejected { season: i32 },
}

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error(
        "season {season} game {game_id}: expected exactly one {side} team state for franchise {franchise_id}, found {matches}"
    )]
    MissingTeamState {
        season: i32,
        game_id: String,
        franchise_id: FranchiseId,
        side: Side,
        matches: usize,
    },

    #[error("season {season}: franchise {franchise_id} played no games in the previous season")]
    NoPriorSeasonData { season: i32, franchise_id: FranchiseId },

    #[error("season {season}: no team has prior-season data to impute a league average from")]
    EmptyLeagueImputation { season: i32 },

    #[error("game {game_id}: feature {column} is not finite")]
    NonFiniteFeature { game_id: String, column: String },

    #[error("season {season} ({component}): {source}")]
    Store {
        season: i32,
        component: Component,
        #[source]
        source: StoreError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("feed error: {0}")]
    Feed(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeatureError {
    pub fn store(season: i32, component: Component) -> impl FnOnce(StoreError) -> Self {
        move |source| FeatureError::Store {
            season,
            component,
            source,
        }
    }
}
