use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FeatureError;
use crate::game::{FranchiseId, Stat, StatLine};
use crate::snapshot::SideSnapshot;
use crate::team_state::{TeamSeasonState, final_state};

/// Per-game rates that feed the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateStat {
    GoalsFor,
    GoalsAgainst,
    ShotsFor,
    ShotsAgainst,
    Wins,
}

impl RateStat {
    pub const COUNT: usize = 5;
    pub const ALL: [RateStat; RateStat::COUNT] = [
        RateStat::GoalsFor,
        RateStat::GoalsAgainst,
        RateStat::ShotsFor,
        RateStat::ShotsAgainst,
        RateStat::Wins,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RateStat::GoalsFor => "goals_for",
            RateStat::GoalsAgainst => "goals_against",
            RateStat::ShotsFor => "shots_for",
            RateStat::ShotsAgainst => "shots_against",
            RateStat::Wins => "wins",
        }
    }

    /// Picks this rate's numerator out of a set of cumulative totals.
    pub fn total(self, wins: u32, for_totals: &StatLine, against_totals: &StatLine) -> f64 {
        match self {
            RateStat::GoalsFor => for_totals.get(Stat::Goals),
            RateStat::GoalsAgainst => against_totals.get(Stat::Goals),
            RateStat::ShotsFor => for_totals.get(Stat::Shots),
            RateStat::ShotsAgainst => against_totals.get(Stat::Shots),
            RateStat::Wins => f64::from(wins),
        }
    }

    pub fn after_total(self, state: &TeamSeasonState) -> f64 {
        self.total(state.wins_after, &state.for_after, &state.against_after)
    }

    pub fn before_total(self, side: &SideSnapshot) -> f64 {
        self.total(side.wins_before, &side.for_before, &side.against_before)
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RateLine([f64; RateStat::COUNT]);

impl RateLine {
    pub fn get(&self, rate: RateStat) -> f64 {
        self.0[rate.index()]
    }

    pub fn set(&mut self, rate: RateStat, value: f64) {
        self.0[rate.index()] = value;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPriorSeasonRate {
    pub franchise_id: FranchiseId,
    /// The season these rates are a prior for (the rates come from `season - 1`).
    pub season: i32,
    pub prior_games_played: u32,
    pub rates: RateLine,
    pub imputed: bool,
}

/// Prior-season rates for every team of one target season.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorRateTable {
    pub season: i32,
    pub league_average: RateLine,
    pub teams: BTreeMap<FranchiseId, TeamPriorSeasonRate>,
}

impl PriorRateTable {
    pub fn get(&self, franchise_id: FranchiseId) -> Option<&TeamPriorSeasonRate> {
        self.teams.get(&franchise_id)
    }

    pub fn imputed_teams(&self) -> Vec<FranchiseId> {
        self.teams
            .values()
            .filter(|r| r.imputed)
            .map(|r| r.franchise_id)
            .collect()
    }
}

/// A team's full-season per-game rates from `previous_states` (season `season - 1`).
pub fn prior_season_rate(
    season: i32,
    franchise_id: FranchiseId,
    previous_states: &[TeamSeasonState],
) -> Result<TeamPriorSeasonRate, FeatureError> {
    let last = final_state(previous_states, franchise_id)
        .filter(|s| s.games_played_after > 0)
        .ok_or(FeatureError::NoPriorSeasonData {
            season,
            franchise_id,
        })?;

    let games = f64::from(last.games_played_after);
    let mut rates = RateLine::default();
    for rate in RateStat::ALL {
        rates.set(rate, rate.after_total(last) / games);
    }
    Ok(TeamPriorSeasonRate {
        franchise_id,
        season,
        prior_games_played: last.games_played_after,
        rates,
        imputed: false,
    })
}

/// Prior rates for `teams`, imputing the league average for teams without a previous season.
///
/// The average is taken per statistic over the teams of this target season that do
/// have prior data. Fails when no team has any.
pub fn season_prior_rates(
    season: i32,
    teams: &[FranchiseId],
    previous_states: &[TeamSeasonState],
) -> Result<PriorRateTable, FeatureError> {
    let mut known = BTreeMap::new();
    let mut missing = Vec::new();
    for team in teams {
        match prior_season_rate(season, *team, previous_states) {
            Ok(rate) => {
                known.insert(*team, rate);
            }
            Err(FeatureError::NoPriorSeasonData { franchise_id, .. }) => missing.push(franchise_id),
            Err(err) => return Err(err),
        }
    }

    if known.is_empty() {
        return Err(FeatureError::EmptyLeagueImputation { season });
    }

    let n = known.len() as f64;
    let mut league_average = RateLine::default();
    for rate in RateStat::ALL {
        let sum: f64 = known.values().map(|r| r.rates.get(rate)).sum();
        league_average.set(rate, sum / n);
    }

    for franchise_id in missing {
        info!(season, %franchise_id, "no prior season, imputing league average");
        known.insert(
            franchise_id,
            TeamPriorSeasonRate {
                franchise_id,
                season,
                prior_games_played: 0,
                rates: league_average,
                imputed: true,
            },
        );
    }

    Ok(PriorRateTable {
        season,
        league_average,
        teams: known,
    })
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use chrono::{Duration, TimeZone, Utc};

    use super::{RateStat, prior_season_rate, season_prior_rates};
    use crate::error::FeatureError;
    use crate::game::{FranchiseId, Game, GameType, Side, Stat};
    use crate::team_state::season_team_states;

    fn previous_season() -> Vec<Game> {
        let start = Utc.with_ymd_and_hms(2014, 10, 8, 23, 0, 0).unwrap();
        let mk = |id: &str, day: i64, home: u32, away: u32, winner: Side, hg: f64, ag: f64| {
            Game::new(
                id,
                2014,
                GameType::Regular,
                start + Duration::days(day),
                FranchiseId(home),
                FranchiseId(away),
                winner,
            )
            .with_stat(Side::Home, Stat::Goals, hg)
            .with_stat(Side::Away, Stat::Goals, ag)
            .with_stat(Side::Home, Stat::Shots, 30.0)
            .with_stat(Side::Away, Stat::Shots, 20.0)
        };
        vec![
            mk("p1", 0, 2, 3, Side::Home, 4.0, 1.0),
            mk("p2", 1, 3, 2, Side::Home, 3.0, 2.0),
            mk("p3", 2, 2, 3, Side::Away, 0.0, 2.0),
            mk("p4", 3, 3, 2, Side::Away, 1.0, 5.0),
        ]
    }

    #[test]
    fn prior_rate_divides_final_totals_by_games_played() {
        let states = season_team_states(&previous_season());
        let rate = prior_season_rate(2015, FranchiseId(2), &states).unwrap();
        assert_eq!(rate.prior_games_played, 4);
        assert_approx_eq!(rate.rates.get(RateStat::GoalsFor), (4.0 + 2.0 + 0.0 + 5.0) / 4.0);
        assert_approx_eq!(rate.rates.get(RateStat::GoalsAgainst), (1.0 + 3.0 + 2.0 + 1.0) / 4.0);
        assert_approx_eq!(rate.rates.get(RateStat::ShotsFor), (30.0 + 20.0 + 30.0 + 20.0) / 4.0);
        assert_approx_eq!(rate.rates.get(RateStat::Wins), 0.5);
        assert!(!rate.imputed);
    }

    #[test]
    fn team_without_previous_season_is_reported() {
        let states = season_team_states(&previous_season());
        let err = prior_season_rate(2015, FranchiseId(9), &states).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::NoPriorSeasonData {
                season: 2015,
                franchise_id: FranchiseId(9)
            }
        ));
    }

    #[test]
    fn new_team_gets_mean_of_teams_with_prior_data() {
        let states = season_team_states(&previous_season());
        let teams = [FranchiseId(1), FranchiseId(2), FranchiseId(3)];
        let table = season_prior_rates(2015, &teams, &states).unwrap();

        let b = table.get(FranchiseId(2)).unwrap().rates;
        let c = table.get(FranchiseId(3)).unwrap().rates;
        let a = table.get(FranchiseId(1)).unwrap();
        assert!(a.imputed);
        for rate in RateStat::ALL {
            assert_approx_eq!(a.rates.get(rate), (b.get(rate) + c.get(rate)) / 2.0);
        }
        assert_eq!(table.imputed_teams(), vec![FranchiseId(1)]);
    }

    #[test]
    fn league_without_any_prior_data_fails() {
        let err = season_prior_rates(2015, &[FranchiseId(1), FranchiseId(4)], &[]).unwrap_err();
        assert!(matches!(err, FeatureError::EmptyLeagueImputation { season: 2015 }));
    }
}
