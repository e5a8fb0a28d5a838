use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::blend::{blend_rates, build_feature_rows};
use crate::config::PipelineConfig;
use crate::error::{Component, FeatureError};
use crate::game::{FranchiseId, GameType};
use crate::prior_rates::{RateLine, RateStat, season_prior_rates};
use crate::snapshot::{SeasonGameSnapshot, assemble_season_snapshot};
use crate::store::{GameStore, SeasonBatch};
use crate::team_state::{final_state, season_team_states};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateSummary {
    pub team_states: usize,
    pub snapshots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureSummary {
    pub written: usize,
    pub skipped: usize,
    pub imputed_teams: Vec<FranchiseId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeasonOutcome {
    pub season: i32,
    pub team_states: usize,
    pub snapshots: usize,
    pub features_written: usize,
    pub features_skipped: usize,
    pub imputed_teams: Vec<FranchiseId>,
    pub error: Option<String>,
}

impl SeasonOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<SeasonOutcome>,
}

impl PipelineReport {
    pub fn failed(&self) -> impl Iterator<Item = &SeasonOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }
}

/// Recomputes and stores every team's season state and the season snapshot.
///
/// Only regular-season and playoff games count. Both tables are rewritten in one
/// batch, so a failure leaves the previously stored season untouched.
pub fn process_season_states<S: GameStore + ?Sized>(
    store: &mut S,
    season: i32,
) -> Result<StateSummary, FeatureError> {
    let games = store
        .fetch_games(season, &GameType::STANDINGS)
        .map_err(FeatureError::store(season, Component::Games))?;
    if games.is_empty() {
        info!(season, "no completed games stored");
        return Ok(StateSummary::default());
    }

    let team_states = season_team_states(&games);
    let snapshots = assemble_season_snapshot(&games, &team_states)?;
    store
        .write_season(SeasonBatch {
            season,
            team_states: &team_states,
            snapshots: &snapshots,
            features: &[],
        })
        .map_err(FeatureError::store(season, Component::TeamState))?;

    info!(
        season,
        games = games.len(),
        team_states = team_states.len(),
        "stored season state"
    );
    Ok(StateSummary {
        team_states: team_states.len(),
        snapshots: snapshots.len(),
    })
}

/// Builds and stores feature rows for the season's stored snapshot.
///
/// Games that already have a feature row are skipped, which makes the step safe to
/// re-run and lets an interrupted season resume. Needs `season - 1` processed.
pub fn build_season_features<S: GameStore + ?Sized>(
    store: &mut S,
    season: i32,
    prior_weight: u32,
) -> Result<FeatureSummary, FeatureError> {
    let snapshots = store
        .fetch_season_snapshot(season)
        .map_err(FeatureError::store(season, Component::Snapshot))?;
    let existing = store
        .existing_feature_ids(season)
        .map_err(FeatureError::store(season, Component::Blender))?;

    let teams: Vec<FranchiseId> = snapshots
        .iter()
        .flat_map(|s| [s.home.franchise_id, s.away.franchise_id])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let total = snapshots.len();
    let pending: Vec<SeasonGameSnapshot> = snapshots
        .into_iter()
        .filter(|s| !existing.contains(&s.game.game_id))
        .collect();
    let skipped = total - pending.len();

    if pending.is_empty() {
        info!(season, skipped, "feature rows already up to date");
        return Ok(FeatureSummary {
            written: 0,
            skipped,
            imputed_teams: Vec::new(),
        });
    }

    let previous_states = store
        .fetch_season_team_states(season - 1)
        .map_err(FeatureError::store(season, Component::Blender))?;
    let priors = season_prior_rates(season, &teams, &previous_states)?;
    let rows = build_feature_rows(&pending, &priors, prior_weight)?;

    store
        .write_season(SeasonBatch {
            season,
            features: &rows,
            ..SeasonBatch::default()
        })
        .map_err(FeatureError::store(season, Component::Blender))?;

    info!(season, written = rows.len(), skipped, "stored feature rows");
    Ok(FeatureSummary {
        written: rows.len(),
        skipped,
        imputed_teams: priors.imputed_teams(),
    })
}

fn run_season<S: GameStore + ?Sized>(
    store: &mut S,
    config: &PipelineConfig,
    season: i32,
    outcome: &mut SeasonOutcome,
) -> Result<(), FeatureError> {
    if config.seasons.contains(&season) {
        let states = process_season_states(store, season)?;
        outcome.team_states = states.team_states;
        outcome.snapshots = states.snapshots;
    }
    if config.feature_seasons.contains(&season) {
        let features = build_season_features(store, season, config.prior_season_weight)?;
        outcome.features_written = features.written;
        outcome.features_skipped = features.skipped;
        outcome.imputed_teams = features.imputed_teams;
    }
    Ok(())
}

/// Runs every configured season in increasing order.
///
/// A failing season is reported and does not stop later seasons; what earlier
/// seasons committed stays valid.
pub fn run_pipeline<S: GameStore + ?Sized>(store: &mut S, config: &PipelineConfig) -> PipelineReport {
    let seasons: BTreeSet<i32> = config
        .seasons
        .iter()
        .chain(config.feature_seasons.iter())
        .copied()
        .collect();

    let mut report = PipelineReport::default();
    for season in seasons {
        let mut outcome = SeasonOutcome {
            season,
            ..SeasonOutcome::default()
        };
        if let Err(err) = run_season(store, config, season, &mut outcome) {
            warn!(season, error = %err, "season failed");
            outcome.error = Some(err.to_string());
        }
        if let Err(err) = store.record_run(&outcome) {
            warn!(season, error = %err, "unable to record pipeline run");
        }
        report.outcomes.push(outcome);
    }
    report
}

/// Blended rates for a game that has not been played yet.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchupFeatures {
    pub season: i32,
    pub home_team_id: FranchiseId,
    pub away_team_id: FranchiseId,
    pub home_games_played: u32,
    pub away_games_played: u32,
    pub home: RateLine,
    pub away: RateLine,
}

/// Features for an upcoming `home` vs `away` game, from each team's latest stored
/// `season` totals. A team that has not played yet this season sits at its prior rate.
pub fn matchup_features<S: GameStore + ?Sized>(
    store: &S,
    season: i32,
    home: FranchiseId,
    away: FranchiseId,
    prior_weight: u32,
) -> Result<MatchupFeatures, FeatureError> {
    let current = store
        .fetch_season_team_states(season)
        .map_err(FeatureError::store(season, Component::TeamState))?;
    let previous = store
        .fetch_season_team_states(season - 1)
        .map_err(FeatureError::store(season, Component::Blender))?;

    // Before the season's first game the league is last season's teams.
    let league = if current.is_empty() { &previous } else { &current };
    let mut teams: BTreeSet<FranchiseId> = league.iter().map(|s| s.franchise_id).collect();
    teams.insert(home);
    teams.insert(away);
    let teams: Vec<FranchiseId> = teams.into_iter().collect();
    let priors = season_prior_rates(season, &teams, &previous)?;

    let side = |team: FranchiseId| -> Result<(u32, RateLine), FeatureError> {
        let prior = priors.get(team).ok_or(FeatureError::NoPriorSeasonData {
            season,
            franchise_id: team,
        })?;
        Ok(match final_state(&current, team) {
            Some(last) => (
                last.games_played_after,
                blend_rates(
                    |rate: RateStat| rate.after_total(last),
                    last.games_played_after,
                    &prior.rates,
                    prior_weight,
                ),
            ),
            None => (0, blend_rates(|_| 0.0, 0, &prior.rates, prior_weight)),
        })
    };

    let (home_games_played, home_rates) = side(home)?;
    let (away_games_played, away_rates) = side(away)?;
    Ok(MatchupFeatures {
        season,
        home_team_id: home,
        away_team_id: away,
        home_games_played,
        away_games_played,
        home: home_rates,
        away: away_rates,
    })
}
