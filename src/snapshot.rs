use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::FeatureError;
use crate::game::{FranchiseId, Game, Side, StatLine};
use crate::team_state::TeamSeasonState;

/// One side's season-to-date state entering a game. Only `_before` totals live here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideSnapshot {
    pub franchise_id: FranchiseId,
    pub games_played_before: u32,
    pub wins_before: u32,
    pub losses_before: u32,
    pub for_before: StatLine,
    pub against_before: StatLine,
}

impl From<&TeamSeasonState> for SideSnapshot {
    fn from(state: &TeamSeasonState) -> Self {
        Self {
            franchise_id: state.franchise_id,
            games_played_before: state.games_played_before,
            wins_before: state.wins_before,
            losses_before: state.losses_before,
            for_before: state.for_before,
            against_before: state.against_before,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonGameSnapshot {
    pub game: Game,
    pub home: SideSnapshot,
    pub away: SideSnapshot,
}

impl SeasonGameSnapshot {
    pub fn side(&self, side: Side) -> &SideSnapshot {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }
}

/// Joins each game with the home and away teams' pre-game state.
///
/// Every game must match exactly one state row per side; a missing or duplicated
/// row aborts the whole season instead of dropping the game. Output is sorted by
/// `(datetime, game_id)`.
pub fn assemble_season_snapshot(
    season_games: &[Game],
    team_states: &[TeamSeasonState],
) -> Result<Vec<SeasonGameSnapshot>, FeatureError> {
    let mut index: HashMap<(FranchiseId, &str), Vec<&TeamSeasonState>> = HashMap::new();
    for state in team_states {
        index
            .entry((state.franchise_id, state.game_id.as_str()))
            .or_default()
            .push(state);
    }

    let lookup = |game: &Game, side: Side| -> Result<SideSnapshot, FeatureError> {
        let franchise_id = game.team(side);
        let matches = index
            .get(&(franchise_id, game.game_id.as_str()))
            .map(Vec::as_slice)
            .unwrap_or_default();
        match matches {
            [state] => Ok(SideSnapshot::from(*state)),
            _ => Err(FeatureError::MissingTeamState {
                season: game.season,
                game_id: game.game_id.clone(),
                franchise_id,
                side,
                matches: matches.len(),
            }),
        }
    };

    let mut out = Vec::with_capacity(season_games.len());
    for game in season_games {
        out.push(SeasonGameSnapshot {
            home: lookup(game, Side::Home)?,
            away: lookup(game, Side::Away)?,
            game: game.clone(),
        });
    }
    out.sort_by(|a, b| {
        a.game
            .datetime
            .cmp(&b.game.datetime)
            .then_with(|| a.game.game_id.cmp(&b.game.game_id))
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::assemble_season_snapshot;
    use crate::error::FeatureError;
    use crate::game::{FranchiseId, Game, GameType, Side, Stat};
    use crate::team_state::season_team_states;

    fn games() -> Vec<Game> {
        let start = Utc.with_ymd_and_hms(2016, 10, 12, 23, 0, 0).unwrap();
        vec![
            Game::new("a", 2016, GameType::Regular, start, FranchiseId(1), FranchiseId(2), Side::Home)
                .with_stat(Side::Home, Stat::Goals, 3.0)
                .with_stat(Side::Away, Stat::Goals, 1.0),
            Game::new(
                "b",
                2016,
                GameType::Regular,
                start + Duration::days(1),
                FranchiseId(2),
                FranchiseId(1),
                Side::Home,
            )
            .with_stat(Side::Home, Stat::Goals, 4.0)
            .with_stat(Side::Away, Stat::Goals, 2.0),
        ]
    }

    #[test]
    fn snapshot_carries_only_pre_game_totals() {
        let games = games();
        let states = season_team_states(&games);
        let snapshot = assemble_season_snapshot(&games, &states).unwrap();
        assert_eq!(snapshot.len(), 2);

        let first = &snapshot[0];
        assert_eq!(first.home.games_played_before, 0);
        assert_eq!(first.home.for_before.get(Stat::Goals), 0.0);
        assert_eq!(first.away.against_before.get(Stat::Goals), 0.0);

        let second = &snapshot[1];
        assert_eq!(second.game.game_id, "b");
        assert_eq!(second.home.franchise_id, FranchiseId(2));
        assert_eq!(second.home.for_before.get(Stat::Goals), 1.0);
        assert_eq!(second.home.losses_before, 1);
        assert_eq!(second.away.for_before.get(Stat::Goals), 3.0);
        assert_eq!(second.away.wins_before, 1);
    }

    #[test]
    fn missing_state_aborts_assembly() {
        let games = games();
        let states: Vec<_> = season_team_states(&games)
            .into_iter()
            .filter(|s| !(s.franchise_id == FranchiseId(1) && s.game_id == "b"))
            .collect();
        let err = assemble_season_snapshot(&games, &states).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::MissingTeamState {
                ref game_id,
                franchise_id: FranchiseId(1),
                side: Side::Away,
                matches: 0,
                ..
            } if game_id == "b"
        ));
    }

    #[test]
    fn duplicated_state_aborts_assembly() {
        let games = games();
        let mut states = season_team_states(&games);
        let dup = states[0].clone();
        states.push(dup);
        let err = assemble_season_snapshot(&games, &states).unwrap_err();
        assert!(matches!(err, FeatureError::MissingTeamState { matches: 2, .. }));
    }
}
