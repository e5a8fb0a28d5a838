use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;
use crate::game::{FranchiseId, GameType, Side};
use crate::prior_rates::{PriorRateTable, RateLine, RateStat};
use crate::snapshot::{SeasonGameSnapshot, SideSnapshot};

pub const DEFAULT_PRIOR_SEASON_WEIGHT: u32 = 10;

/// Shrinks the current-season rate towards the prior-season rate.
///
/// The prior season counts as `prior_weight` pseudo-games played at `prior_rate`.
/// With no games played yet the result is exactly `prior_rate` whatever
/// `current_before` holds; as games accumulate it converges to
/// `current_before / current_games_played`.
pub fn blend(current_before: f64, current_games_played: u32, prior_rate: f64, prior_weight: u32) -> f64 {
    if current_games_played == 0 {
        return prior_rate;
    }
    let w = f64::from(prior_weight);
    (w * prior_rate + current_before) / (f64::from(current_games_played) + w)
}

/// Blended rates for every [`RateStat`] given one team's cumulative totals.
pub fn blend_rates(
    totals: impl Fn(RateStat) -> f64,
    games_played: u32,
    prior: &RateLine,
    prior_weight: u32,
) -> RateLine {
    let mut out = RateLine::default();
    for rate in RateStat::ALL {
        out.set(
            rate,
            blend(totals(rate), games_played, prior.get(rate), prior_weight),
        );
    }
    out
}

/// Model-ready row: identity, outcome label and blended per-game rates for both sides.
///
/// Field order is the column order of the exported training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub game_id: String,
    pub game_type: GameType,
    pub season: i32,
    pub datetime: DateTime<Utc>,
    pub home_team_id: FranchiseId,
    pub away_team_id: FranchiseId,
    pub home_win: bool,
    pub goals_for_per_game_home: f64,
    pub goals_for_per_game_away: f64,
    pub goals_against_per_game_home: f64,
    pub goals_against_per_game_away: f64,
    pub shots_for_per_game_home: f64,
    pub shots_for_per_game_away: f64,
    pub shots_against_per_game_home: f64,
    pub shots_against_per_game_away: f64,
    pub wins_per_game_home: f64,
    pub wins_per_game_away: f64,
}

impl FeatureRow {
    pub fn column_name(rate: RateStat, side: Side) -> String {
        format!("{}_per_game_{}", rate.name(), side.as_str())
    }

    pub fn rate(&self, rate: RateStat, side: Side) -> f64 {
        *self.rate_slot(rate, side)
    }

    pub fn set_rate(&mut self, rate: RateStat, side: Side, value: f64) {
        *self.rate_slot_mut(rate, side) = value;
    }

    fn rate_slot(&self, rate: RateStat, side: Side) -> &f64 {
        match (rate, side) {
            (RateStat::GoalsFor, Side::Home) => &self.goals_for_per_game_home,
            (RateStat::GoalsFor, Side::Away) => &self.goals_for_per_game_away,
            (RateStat::GoalsAgainst, Side::Home) => &self.goals_against_per_game_home,
            (RateStat::GoalsAgainst, Side::Away) => &self.goals_against_per_game_away,
            (RateStat::ShotsFor, Side::Home) => &self.shots_for_per_game_home,
            (RateStat::ShotsFor, Side::Away) => &self.shots_for_per_game_away,
            (RateStat::ShotsAgainst, Side::Home) => &self.shots_against_per_game_home,
            (RateStat::ShotsAgainst, Side::Away) => &self.shots_against_per_game_away,
            (RateStat::Wins, Side::Home) => &self.wins_per_game_home,
            (RateStat::Wins, Side::Away) => &self.wins_per_game_away,
        }
    }

    fn rate_slot_mut(&mut self, rate: RateStat, side: Side) -> &mut f64 {
        match (rate, side) {
            (RateStat::GoalsFor, Side::Home) => &mut self.goals_for_per_game_home,
            (RateStat::GoalsFor, Side::Away) => &mut self.goals_for_per_game_away,
            (RateStat::GoalsAgainst, Side::Home) => &mut self.goals_against_per_game_home,
            (RateStat::GoalsAgainst, Side::Away) => &mut self.goals_against_per_game_away,
            (RateStat::ShotsFor, Side::Home) => &mut self.shots_for_per_game_home,
            (RateStat::ShotsFor, Side::Away) => &mut self.shots_for_per_game_away,
            (RateStat::ShotsAgainst, Side::Home) => &mut self.shots_against_per_game_home,
            (RateStat::ShotsAgainst, Side::Away) => &mut self.shots_against_per_game_away,
            (RateStat::Wins, Side::Home) => &mut self.wins_per_game_home,
            (RateStat::Wins, Side::Away) => &mut self.wins_per_game_away,
        }
    }

    /// Rejects rows carrying NaN or infinite features.
    pub fn validate(&self) -> Result<(), FeatureError> {
        for rate in RateStat::ALL {
            for side in Side::BOTH {
                if !self.rate(rate, side).is_finite() {
                    return Err(FeatureError::NonFiniteFeature {
                        game_id: self.game_id.clone(),
                        column: Self::column_name(rate, side),
                    });
                }
            }
        }
        Ok(())
    }
}

fn side_rates(side: &SideSnapshot, priors: &PriorRateTable, weight: u32) -> Option<RateLine> {
    let prior = priors.get(side.franchise_id)?;
    Some(blend_rates(
        |rate| rate.before_total(side),
        side.games_played_before,
        &prior.rates,
        weight,
    ))
}

/// Feature rows for already assembled snapshots of one season.
///
/// Every team in `snapshots` must have an entry in `priors`; a team without one is
/// reported as having no prior-season data rather than silently skipped.
pub fn build_feature_rows(
    snapshots: &[SeasonGameSnapshot],
    priors: &PriorRateTable,
    prior_weight: u32,
) -> Result<Vec<FeatureRow>, FeatureError> {
    let mut out = Vec::with_capacity(snapshots.len());
    for snap in snapshots {
        let game = &snap.game;
        let mut row = FeatureRow {
            game_id: game.game_id.clone(),
            game_type: game.game_type,
            season: game.season,
            datetime: game.datetime,
            home_team_id: game.home_team_id,
            away_team_id: game.away_team_id,
            home_win: game.home_win(),
            goals_for_per_game_home: 0.0,
            goals_for_per_game_away: 0.0,
            goals_against_per_game_home: 0.0,
            goals_against_per_game_away: 0.0,
            shots_for_per_game_home: 0.0,
            shots_for_per_game_away: 0.0,
            shots_against_per_game_home: 0.0,
            shots_against_per_game_away: 0.0,
            wins_per_game_home: 0.0,
            wins_per_game_away: 0.0,
        };
        for side in Side::BOTH {
            let snapshot_side = snap.side(side);
            let rates = side_rates(snapshot_side, priors, prior_weight).ok_or(
                FeatureError::NoPriorSeasonData {
                    season: priors.season,
                    franchise_id: snapshot_side.franchise_id,
                },
            )?;
            for rate in RateStat::ALL {
                row.set_rate(rate, side, rates.get(rate));
            }
        }
        row.validate()?;
        out.push(row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use chrono::{TimeZone, Utc};

    use super::{FeatureRow, blend};
    use crate::error::FeatureError;
    use crate::game::{FranchiseId, GameType, Side};
    use crate::prior_rates::RateStat;

    #[test]
    fn zero_games_returns_prior_rate() {
        for current in [0.0, 3.0, 117.0] {
            assert_eq!(blend(current, 0, 2.5, 10), 2.5);
            assert_eq!(blend(current, 0, 0.61, 1), 0.61);
        }
    }

    #[test]
    fn blend_lies_between_prior_and_current_rate() {
        let prior = 2.5;
        let (total, games) = (30.0, 10);
        let current_rate = total / games as f64;
        let value = blend(total, games, prior, 10);
        assert!(value > prior && value < current_rate);
        assert_approx_eq!(value, 2.75);
    }

    #[test]
    fn blend_converges_to_current_rate() {
        let value = blend(3.0 * 10_000.0, 10_000, 1.0, 10);
        assert!((value - 3.0).abs() < 0.01);
    }

    #[test]
    fn three_game_example() {
        // Goals-for 2, 4, 3 entering the season at 2.5 per game.
        assert_approx_eq!(blend(0.0, 0, 2.5, 10), 2.5);
        assert_approx_eq!(blend(2.0, 1, 2.5, 10), 27.0 / 11.0);
        assert_approx_eq!(blend(6.0, 2, 2.5, 10), 31.0 / 12.0);
        assert_approx_eq!(blend(6.0, 2, 2.5, 10), 2.5833, 1e-4);
    }

    #[test]
    fn non_finite_feature_is_rejected() {
        let mut row = FeatureRow {
            game_id: "g".to_string(),
            game_type: GameType::Regular,
            season: 2015,
            datetime: Utc.with_ymd_and_hms(2015, 10, 7, 23, 0, 0).unwrap(),
            home_team_id: FranchiseId(1),
            away_team_id: FranchiseId(2),
            home_win: true,
            goals_for_per_game_home: 1.0,
            goals_for_per_game_away: 1.0,
            goals_against_per_game_home: 1.0,
            goals_against_per_game_away: 1.0,
            shots_for_per_game_home: 1.0,
            shots_for_per_game_away: 1.0,
            shots_against_per_game_home: 1.0,
            shots_against_per_game_away: 1.0,
            wins_per_game_home: 0.5,
            wins_per_game_away: 0.5,
        };
        assert!(row.validate().is_ok());

        row.set_rate(RateStat::ShotsFor, Side::Away, f64::NAN);
        let err = row.validate().unwrap_err();
        assert!(matches!(
            err,
            FeatureError::NonFiniteFeature { ref column, .. } if column == "shots_for_per_game_away"
        ));
    }
}
