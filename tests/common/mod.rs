#![allow(dead_code)]

use chrono::{TimeZone, Utc};

use nhl_features::config::PipelineConfig;
use nhl_features::game::{FranchiseId, Game, GameType, Side, Stat};

pub const T1: FranchiseId = FranchiseId(1);
pub const T2: FranchiseId = FranchiseId(2);
pub const T3: FranchiseId = FranchiseId(3);

/// A regular-season game on October `day` of `season`, won by whoever scored more.
pub fn game(
    id: &str,
    season: i32,
    day: u32,
    (home, away): (FranchiseId, FranchiseId),
    (home_goals, away_goals): (u32, u32),
    (home_shots, away_shots): (u32, u32),
) -> Game {
    let winner = if home_goals > away_goals {
        Side::Home
    } else {
        Side::Away
    };
    Game::new(
        id,
        season,
        GameType::Regular,
        Utc.with_ymd_and_hms(season, 10, day, 23, 0, 0).unwrap(),
        home,
        away,
        winner,
    )
    .with_stat(Side::Home, Stat::Goals, f64::from(home_goals))
    .with_stat(Side::Away, Stat::Goals, f64::from(away_goals))
    .with_stat(Side::Home, Stat::Shots, f64::from(home_shots))
    .with_stat(Side::Away, Stat::Shots, f64::from(away_shots))
}

/// 2014: teams 1 and 2 split two games, 5 goals each.
pub fn prior_season() -> Vec<Game> {
    vec![
        game("2014020001", 2014, 8, (T1, T2), (3, 1), (30, 25)),
        game("2014020002", 2014, 10, (T2, T1), (4, 2), (28, 32)),
    ]
}

/// 2015: team 1 scores 2, 4 and 3; team 3 is new to the league.
pub fn current_season() -> Vec<Game> {
    vec![
        game("2015020001", 2015, 7, (T1, T2), (2, 1), (33, 20)),
        game("2015020002", 2015, 9, (T3, T1), (2, 4), (27, 29)),
        game("2015020003", 2015, 11, (T1, T2), (3, 5), (35, 31)),
    ]
}

pub fn config() -> PipelineConfig {
    PipelineConfig {
        seasons: vec![2014, 2015],
        feature_seasons: vec![2015],
        training_seasons: vec![2015],
        ..PipelineConfig::default()
    }
}
