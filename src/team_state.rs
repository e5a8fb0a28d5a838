use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::{FranchiseId, Game, Side, StatLine};

/// Running season totals for one team, as of immediately before and after one of its games.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSeasonState {
    pub franchise_id: FranchiseId,
    pub season: i32,
    pub game_id: String,
    pub datetime: DateTime<Utc>,
    pub games_played_before: u32,
    pub games_played_after: u32,
    pub wins_before: u32,
    pub wins_after: u32,
    pub losses_before: u32,
    pub losses_after: u32,
    pub for_before: StatLine,
    pub for_after: StatLine,
    pub against_before: StatLine,
    pub against_after: StatLine,
}

impl TeamSeasonState {
    pub fn won(&self) -> bool {
        self.wins_after > self.wins_before
    }
}

/// Cumulative before/after totals for `franchise_id` over its games in `games`.
///
/// Games that do not involve the franchise are ignored. The remaining games are
/// accumulated in `datetime` order; the game id only breaks exact timestamp ties,
/// since id order does not follow the calendar once games get rescheduled.
/// Returns one row per game the franchise played, in chronological order.
pub fn compute_team_season_state(games: &[Game], franchise_id: FranchiseId) -> Vec<TeamSeasonState> {
    let mut team_games: Vec<(&Game, Side)> = games
        .iter()
        .filter_map(|g| g.side_of(franchise_id).map(|side| (g, side)))
        .collect();
    team_games.sort_by(|(a, _), (b, _)| {
        a.datetime
            .cmp(&b.datetime)
            .then_with(|| a.game_id.cmp(&b.game_id))
    });

    let mut out = Vec::with_capacity(team_games.len());
    let mut games_played = 0u32;
    let mut wins = 0u32;
    let mut for_totals = StatLine::default();
    let mut against_totals = StatLine::default();

    for (game, side) in team_games {
        let win = u32::from(game.winner == side);
        let for_after = for_totals.add(game.stats(side));
        let against_after = against_totals.add(game.stats(side.opposite()));

        out.push(TeamSeasonState {
            franchise_id,
            season: game.season,
            game_id: game.game_id.clone(),
            datetime: game.datetime,
            games_played_before: games_played,
            games_played_after: games_played + 1,
            wins_before: wins,
            wins_after: wins + win,
            losses_before: games_played - wins,
            losses_after: games_played + 1 - wins - win,
            for_before: for_totals,
            for_after,
            against_before: against_totals,
            against_after,
        });

        games_played += 1;
        wins += win;
        for_totals = for_after;
        against_totals = against_after;
    }
    out
}

/// Every franchise appearing on either side of a game, sorted.
pub fn teams_in_season(games: &[Game]) -> Vec<FranchiseId> {
    games
        .iter()
        .flat_map(|g| [g.home_team_id, g.away_team_id])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Team states for every franchise in a season. Teams are independent, so they are
/// computed in parallel; output stays grouped by ascending franchise id.
pub fn season_team_states(games: &[Game]) -> Vec<TeamSeasonState> {
    let teams = teams_in_season(games);
    let per_team: Vec<Vec<TeamSeasonState>> = teams
        .par_iter()
        .map(|team| compute_team_season_state(games, *team))
        .collect();
    debug!(teams = teams.len(), "computed team season states");
    per_team.into_iter().flatten().collect()
}

/// The row after a team's last game of the season, i.e. its full-season totals.
pub fn final_state(states: &[TeamSeasonState], franchise_id: FranchiseId) -> Option<&TeamSeasonState> {
    states
        .iter()
        .filter(|s| s.franchise_id == franchise_id)
        .max_by_key(|s| s.games_played_after)
}
