use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Component, FeatureError};
use crate::game::{FranchiseId, Game, GameType, Side, Stat, StatLine};
use crate::store::GameStore;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveFeed {
    #[serde(deserialize_with = "string_or_number")]
    game_pk: String,
    game_data: GameData,
    live_data: LiveData,
}

#[derive(Debug, Deserialize)]
struct GameData {
    datetime: GameDateTime,
    status: GameStatus,
    teams: HomeAway<TeamInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameDateTime {
    date_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameStatus {
    detailed_state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamInfo {
    franchise_id: u32,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct HomeAway<T> {
    home: T,
    away: T,
}

impl<T> HomeAway<T> {
    fn get(&self, side: Side) -> &T {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LiveData {
    linescore: Linescore,
    boxscore: Boxscore,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Linescore {
    #[serde(default)]
    has_shootout: bool,
    shootout_info: Option<HomeAway<ShootoutSide>>,
}

#[derive(Debug, Deserialize)]
struct ShootoutSide {
    #[serde(default)]
    scores: u32,
}

#[derive(Debug, Deserialize)]
struct Boxscore {
    teams: HomeAway<BoxscoreTeam>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BoxscoreTeam {
    team_stats: TeamStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamStats {
    team_skater_stats: SkaterStats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkaterStats {
    #[serde(deserialize_with = "float_or_zero", default)]
    goals: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    pim: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    shots: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    power_play_goals: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    power_play_opportunities: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    face_off_win_percentage: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    blocked: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    takeaways: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    giveaways: f64,
    #[serde(deserialize_with = "float_or_zero", default)]
    hits: f64,
}

impl SkaterStats {
    fn stat_line(&self) -> StatLine {
        StatLine::default()
            .with(Stat::Shots, self.shots)
            .with(Stat::Goals, self.goals)
            .with(Stat::Pim, self.pim)
            .with(Stat::PpGoals, self.power_play_goals)
            .with(Stat::PpAttempts, self.power_play_opportunities)
            .with(Stat::FoPercent, self.face_off_win_percentage)
            .with(Stat::Blocks, self.blocked)
            .with(Stat::Takeaways, self.takeaways)
            .with(Stat::Giveaways, self.giveaways)
            .with(Stat::Hits, self.hits)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s.trim().to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a game code, got {other}"
        ))),
    }
}

// Some feeds publish faceOffWinPercentage as a string.
fn float_or_zero<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Season and game type encoded in a game code such as `2015020001`.
pub fn decode_game_code(game_id: &str) -> Result<(i32, GameType), FeatureError> {
    let invalid = || FeatureError::Feed(format!("malformed game code {game_id:?}"));
    let (Some(season), Some(code)) = (game_id.get(..4), game_id.get(4..6)) else {
        return Err(invalid());
    };
    let season = season.parse::<i32>().map_err(|_| invalid())?;
    let code = code.parse::<i64>().map_err(|_| invalid())?;
    let game_type = GameType::from_code(code).ok_or_else(invalid)?;
    Ok((season, game_type))
}

fn winner(feed: &LiveFeed, home_goals: f64, away_goals: f64) -> Side {
    let linescore = &feed.live_data.linescore;
    let (home, away) = match (&linescore.shootout_info, linescore.has_shootout) {
        (Some(info), true) => (f64::from(info.home.scores), f64::from(info.away.scores)),
        _ => (home_goals, away_goals),
    };
    if home > away { Side::Home } else { Side::Away }
}

/// Converts one game's live-feed document into a [`Game`]. Only final games are accepted.
pub fn parse_live_feed(value: serde_json::Value) -> Result<Game, FeatureError> {
    let feed: LiveFeed = serde_json::from_value(value)
        .map_err(|err| FeatureError::Feed(format!("unexpected live feed layout: {err}")))?;
    build_game(feed)
}

pub fn parse_live_feed_str(raw: &str) -> Result<Game, FeatureError> {
    let feed: LiveFeed = serde_json::from_str(raw)
        .map_err(|err| FeatureError::Feed(format!("unexpected live feed layout: {err}")))?;
    build_game(feed)
}

fn build_game(feed: LiveFeed) -> Result<Game, FeatureError> {
    let game_id = feed.game_pk.clone();
    let state = feed.game_data.status.detailed_state.trim();
    if state != "Final" {
        return Err(FeatureError::Feed(format!(
            "game {game_id} is not final ({state})"
        )));
    }
    let (season, game_type) = decode_game_code(&game_id)?;
    let datetime = DateTime::parse_from_rfc3339(feed.game_data.datetime.date_time.trim())
        .map_err(|err| FeatureError::Feed(format!("game {game_id}: bad dateTime: {err}")))?
        .with_timezone(&Utc);

    let stats = |side: Side| {
        feed.live_data
            .boxscore
            .teams
            .get(side)
            .team_stats
            .team_skater_stats
            .stat_line()
    };
    let home_stats = stats(Side::Home);
    let away_stats = stats(Side::Away);
    let winner = winner(&feed, home_stats.get(Stat::Goals), away_stats.get(Stat::Goals));
    let teams = &feed.game_data.teams;

    let mut game = Game::new(
        game_id,
        season,
        game_type,
        datetime,
        FranchiseId(teams.home.franchise_id),
        FranchiseId(teams.away.franchise_id),
        winner,
    );
    game.home_name = teams.home.name.clone();
    game.away_name = teams.away.name.clone();
    game.shootout = feed.live_data.linescore.has_shootout;
    game.home_stats = home_stats;
    game.away_stats = away_stats;
    Ok(game)
}

#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub files_seen: usize,
    pub games_upserted: usize,
    pub errors: Vec<String>,
}

/// Parses every `*.json` live feed in `dir` and upserts the games, one write per season.
///
/// A file that cannot be read or parsed is logged and counted; it does not stop the import.
pub fn import_feed_dir<S: GameStore + ?Sized>(
    store: &mut S,
    dir: &Path,
) -> Result<ImportSummary, FeatureError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut summary = ImportSummary {
        files_seen: paths.len(),
        ..ImportSummary::default()
    };
    let mut by_season: BTreeMap<i32, Vec<Game>> = BTreeMap::new();
    for path in &paths {
        let parsed = std::fs::read_to_string(path)
            .map_err(FeatureError::from)
            .and_then(|raw| parse_live_feed_str(&raw));
        match parsed {
            Ok(game) => by_season.entry(game.season).or_default().push(game),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping live feed");
                summary.errors.push(format!("{}: {err}", path.display()));
            }
        }
    }

    for (season, games) in by_season {
        summary.games_upserted += store
            .upsert_games(&games)
            .map_err(FeatureError::store(season, Component::Import))?;
    }
    info!(
        dir = %dir.display(),
        files = summary.files_seen,
        games = summary.games_upserted,
        errors = summary.errors.len(),
        "imported live feeds"
    );
    Ok(summary)
}
