use std::collections::{BTreeMap, HashSet};

use crate::blend::FeatureRow;
use crate::error::StoreError;
use crate::game::{FranchiseId, Game, GameType};
use crate::pipeline::SeasonOutcome;
use crate::snapshot::SeasonGameSnapshot;
use crate::team_state::TeamSeasonState;

/// Everything one processing step writes for a season; committed all-or-nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonBatch<'a> {
    pub season: i32,
    pub team_states: &'a [TeamSeasonState],
    pub snapshots: &'a [SeasonGameSnapshot],
    pub features: &'a [FeatureRow],
}

/// Read/write capability the pipeline is handed explicitly.
///
/// Reads of an unknown season return empty collections. Upserts are keyed by
/// natural key (`game_id`, or `franchise_id + season + game_id` for team states)
/// and replace existing rows, so repeating a write never duplicates anything.
pub trait GameStore {
    fn fetch_games(&self, season: i32, game_types: &[GameType]) -> Result<Vec<Game>, StoreError>;

    fn fetch_team_season_state(
        &self,
        season: i32,
        franchise_id: FranchiseId,
    ) -> Result<Vec<TeamSeasonState>, StoreError>;

    fn fetch_season_team_states(&self, season: i32) -> Result<Vec<TeamSeasonState>, StoreError>;

    fn fetch_season_snapshot(&self, season: i32) -> Result<Vec<SeasonGameSnapshot>, StoreError>;

    fn existing_feature_ids(&self, season: i32) -> Result<HashSet<String>, StoreError>;

    fn fetch_feature_rows(&self, seasons: &[i32]) -> Result<Vec<FeatureRow>, StoreError>;

    fn upsert_games(&mut self, games: &[Game]) -> Result<usize, StoreError>;

    fn upsert_team_season_state(&mut self, rows: &[TeamSeasonState]) -> Result<usize, StoreError>;

    fn upsert_season_snapshot(&mut self, rows: &[SeasonGameSnapshot]) -> Result<usize, StoreError>;

    fn upsert_feature_rows(&mut self, rows: &[FeatureRow]) -> Result<usize, StoreError>;

    /// Writes a season's batch by upserting each part. Implementations backed by real
    /// storage override this with a single transaction, and the stores in this crate
    /// also drop the season's old team states and snapshot when the batch carries
    /// team states.
    fn write_season(&mut self, batch: SeasonBatch<'_>) -> Result<(), StoreError> {
        self.upsert_team_season_state(batch.team_states)?;
        self.upsert_season_snapshot(batch.snapshots)?;
        self.upsert_feature_rows(batch.features)?;
        Ok(())
    }

    fn record_run(&mut self, _outcome: &SeasonOutcome) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-process store used by tests, benchmarks and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    games: BTreeMap<String, Game>,
    team_states: BTreeMap<(i32, FranchiseId, String), TeamSeasonState>,
    snapshots: BTreeMap<String, SeasonGameSnapshot>,
    features: BTreeMap<String, FeatureRow>,
    runs: Vec<SeasonOutcome>,
    failing_season: Option<i32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_games(games: impl IntoIterator<Item = Game>) -> Self {
        let mut store = Self::new();
        for game in games {
            store.games.insert(game.game_id.clone(), game);
        }
        store
    }

    /// Makes every write for `season` fail, to exercise partial-failure handling.
    pub fn fail_writes_for(&mut self, season: Option<i32>) {
        self.failing_season = season;
    }

    pub fn team_state_count(&self) -> usize {
        self.team_states.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn runs(&self) -> &[SeasonOutcome] {
        &self.runs
    }

    fn check_writable(&self, season: i32) -> Result<(), StoreError> {
        if self.failing_season == Some(season) {
            return Err(StoreError::Rejected { season });
        }
        Ok(())
    }

    fn check_rows(&self, seasons: impl IntoIterator<Item = i32>) -> Result<(), StoreError> {
        for season in seasons {
            self.check_writable(season)?;
        }
        Ok(())
    }
}

impl GameStore for MemoryStore {
    fn fetch_games(&self, season: i32, game_types: &[GameType]) -> Result<Vec<Game>, StoreError> {
        let mut out: Vec<Game> = self
            .games
            .values()
            .filter(|g| g.season == season && game_types.contains(&g.game_type))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.datetime
                .cmp(&b.datetime)
                .then_with(|| a.game_id.cmp(&b.game_id))
        });
        Ok(out)
    }

    fn fetch_team_season_state(
        &self,
        season: i32,
        franchise_id: FranchiseId,
    ) -> Result<Vec<TeamSeasonState>, StoreError> {
        let mut out: Vec<TeamSeasonState> = self
            .team_states
            .values()
            .filter(|s| s.season == season && s.franchise_id == franchise_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.games_played_after);
        Ok(out)
    }

    fn fetch_season_team_states(&self, season: i32) -> Result<Vec<TeamSeasonState>, StoreError> {
        let mut out: Vec<TeamSeasonState> = self
            .team_states
            .values()
            .filter(|s| s.season == season)
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.franchise_id, s.games_played_after));
        Ok(out)
    }

    fn fetch_season_snapshot(&self, season: i32) -> Result<Vec<SeasonGameSnapshot>, StoreError> {
        let mut out: Vec<SeasonGameSnapshot> = self
            .snapshots
            .values()
            .filter(|s| s.game.season == season)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.game
                .datetime
                .cmp(&b.game.datetime)
                .then_with(|| a.game.game_id.cmp(&b.game.game_id))
        });
        Ok(out)
    }

    fn existing_feature_ids(&self, season: i32) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .features
            .values()
            .filter(|f| f.season == season)
            .map(|f| f.game_id.clone())
            .collect())
    }

    fn fetch_feature_rows(&self, seasons: &[i32]) -> Result<Vec<FeatureRow>, StoreError> {
        let mut out: Vec<FeatureRow> = self
            .features
            .values()
            .filter(|f| seasons.contains(&f.season))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.season, a.datetime, &a.game_id).cmp(&(b.season, b.datetime, &b.game_id))
        });
        Ok(out)
    }

    fn upsert_games(&mut self, games: &[Game]) -> Result<usize, StoreError> {
        self.check_rows(games.iter().map(|g| g.season))?;
        for game in games {
            self.games.insert(game.game_id.clone(), game.clone());
        }
        Ok(games.len())
    }

    fn upsert_team_season_state(&mut self, rows: &[TeamSeasonState]) -> Result<usize, StoreError> {
        self.check_rows(rows.iter().map(|r| r.season))?;
        for row in rows {
            self.team_states.insert(
                (row.season, row.franchise_id, row.game_id.clone()),
                row.clone(),
            );
        }
        Ok(rows.len())
    }

    fn upsert_season_snapshot(&mut self, rows: &[SeasonGameSnapshot]) -> Result<usize, StoreError> {
        self.check_rows(rows.iter().map(|r| r.game.season))?;
        for row in rows {
            self.snapshots.insert(row.game.game_id.clone(), row.clone());
        }
        Ok(rows.len())
    }

    fn upsert_feature_rows(&mut self, rows: &[FeatureRow]) -> Result<usize, StoreError> {
        self.check_rows(rows.iter().map(|r| r.season))?;
        for row in rows {
            self.features.insert(row.game_id.clone(), row.clone());
        }
        Ok(rows.len())
    }

    fn write_season(&mut self, batch: SeasonBatch<'_>) -> Result<(), StoreError> {
        // Validate up front so a rejected batch leaves nothing behind.
        self.check_writable(batch.season)?;
        if !batch.team_states.is_empty() {
            self.team_states.retain(|(season, _, _), _| *season != batch.season);
            self.snapshots.retain(|_, snap| snap.game.season != batch.season);
        }
        self.upsert_team_season_state(batch.team_states)?;
        self.upsert_season_snapshot(batch.snapshots)?;
        self.upsert_feature_rows(batch.features)?;
        Ok(())
    }

    fn record_run(&mut self, outcome: &SeasonOutcome) -> Result<(), StoreError> {
        self.runs.push(outcome.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{GameStore, MemoryStore, SeasonBatch};
    use crate::game::{FranchiseId, Game, GameType, Side};
    use crate::snapshot::assemble_season_snapshot;
    use crate::team_state::season_team_states;

    fn games() -> Vec<Game> {
        let start = Utc.with_ymd_and_hms(2015, 10, 7, 23, 0, 0).unwrap();
        (0..2)
            .map(|n| {
                Game::new(
                    format!("201502000{}", n + 1),
                    2015,
                    GameType::Regular,
                    start + Duration::days(n),
                    FranchiseId(1),
                    FranchiseId(2),
                    Side::Home,
                )
            })
            .collect()
    }

    fn write(store: &mut MemoryStore, games: &[Game]) {
        let states = season_team_states(games);
        let snapshots = assemble_season_snapshot(games, &states).unwrap();
        store
            .write_season(SeasonBatch {
                season: 2015,
                team_states: &states,
                snapshots: &snapshots,
                features: &[],
            })
            .unwrap();
    }

    #[test]
    fn state_batch_replaces_the_seasons_rows() {
        let mut store = MemoryStore::new();
        let games = games();
        write(&mut store, &games);
        assert_eq!(store.team_state_count(), 4);

        write(&mut store, &games[..1]);
        assert_eq!(store.team_state_count(), 2);
        assert_eq!(store.fetch_season_snapshot(2015).unwrap().len(), 1);
    }

    #[test]
    fn rejected_batch_writes_nothing() {
        let mut store = MemoryStore::new();
        store.fail_writes_for(Some(2015));
        let games = games();
        let states = season_team_states(&games);
        let batch = SeasonBatch {
            season: 2015,
            team_states: &states,
            ..SeasonBatch::default()
        };
        assert!(store.write_season(batch).is_err());
        assert_eq!(store.team_state_count(), 0);
    }
}
