use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable franchise identity; survives relocations and renames, unlike the club name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FranchiseId(pub u32);

impl fmt::Display for FranchiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Preseason,
    Regular,
    Playoff,
}

impl GameType {
    /// Game types that count towards standings.
    pub const STANDINGS: [GameType; 2] = [GameType::Regular, GameType::Playoff];

    pub fn code(self) -> i64 {
        match self {
            GameType::Preseason => 1,
            GameType::Regular => 2,
            GameType::Playoff => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(GameType::Preseason),
            2 => Some(GameType::Regular),
            3 => Some(GameType::Playoff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Home, Side::Away];

    pub fn opposite(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "home" => Some(Side::Home),
            "away" => Some(Side::Away),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw per-side counting statistics carried by every boxscore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Shots,
    Goals,
    Pim,
    PpGoals,
    PpAttempts,
    FoPercent,
    Blocks,
    Takeaways,
    Giveaways,
    Hits,
}

impl Stat {
    pub const COUNT: usize = 10;
    pub const ALL: [Stat; Stat::COUNT] = [
        Stat::Shots,
        Stat::Goals,
        Stat::Pim,
        Stat::PpGoals,
        Stat::PpAttempts,
        Stat::FoPercent,
        Stat::Blocks,
        Stat::Takeaways,
        Stat::Giveaways,
        Stat::Hits,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stat::Shots => "shots",
            Stat::Goals => "goals",
            Stat::Pim => "pim",
            Stat::PpGoals => "pp_goals",
            Stat::PpAttempts => "pp_attempts",
            Stat::FoPercent => "fo_percent",
            Stat::Blocks => "blocks",
            Stat::Takeaways => "takeaways",
            Stat::Giveaways => "giveaways",
            Stat::Hits => "hits",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One value per [`Stat`]. Faceoff percentage is fractional, so everything is `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatLine([f64; Stat::COUNT]);

impl StatLine {
    pub fn get(&self, stat: Stat) -> f64 {
        self.0[stat.index()]
    }

    pub fn set(&mut self, stat: Stat, value: f64) {
        self.0[stat.index()] = value;
    }

    pub fn with(mut self, stat: Stat, value: f64) -> Self {
        self.set(stat, value);
        self
    }

    pub fn add(&self, other: &StatLine) -> StatLine {
        let mut out = *self;
        for (acc, v) in out.0.iter_mut().zip(other.0.iter()) {
            *acc += v;
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stat, f64)> + '_ {
        Stat::ALL.iter().map(|stat| (*stat, self.get(*stat)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    pub season: i32,
    pub game_type: GameType,
    pub datetime: DateTime<Utc>,
    pub home_team_id: FranchiseId,
    pub away_team_id: FranchiseId,
    pub home_name: String,
    pub away_name: String,
    pub winner: Side,
    pub shootout: bool,
    pub home_stats: StatLine,
    pub away_stats: StatLine,
}

impl Game {
    pub fn new(
        game_id: impl Into<String>,
        season: i32,
        game_type: GameType,
        datetime: DateTime<Utc>,
        home_team_id: FranchiseId,
        away_team_id: FranchiseId,
        winner: Side,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            season,
            game_type,
            datetime,
            home_team_id,
            away_team_id,
            home_name: String::new(),
            away_name: String::new(),
            winner,
            shootout: false,
            home_stats: StatLine::default(),
            away_stats: StatLine::default(),
        }
    }

    pub fn with_stat(mut self, side: Side, stat: Stat, value: f64) -> Self {
        match side {
            Side::Home => self.home_stats.set(stat, value),
            Side::Away => self.away_stats.set(stat, value),
        }
        self
    }

    pub fn team(&self, side: Side) -> FranchiseId {
        match side {
            Side::Home => self.home_team_id,
            Side::Away => self.away_team_id,
        }
    }

    pub fn stats(&self, side: Side) -> &StatLine {
        match side {
            Side::Home => &self.home_stats,
            Side::Away => &self.away_stats,
        }
    }

    /// Which side `team` played on, if it played in this game at all.
    pub fn side_of(&self, team: FranchiseId) -> Option<Side> {
        if self.home_team_id == team {
            Some(Side::Home)
        } else if self.away_team_id == team {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn home_win(&self) -> bool {
        self.winner == Side::Home
    }
}
