use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::blend::FeatureRow;
use crate::error::StoreError;
use crate::game::{FranchiseId, Game, GameType, Side, Stat, StatLine};
use crate::pipeline::SeasonOutcome;
use crate::prior_rates::RateStat;
use crate::snapshot::{SeasonGameSnapshot, SideSnapshot};
use crate::store::{GameStore, SeasonBatch};
use crate::team_state::TeamSeasonState;

struct TableDef {
    name: &'static str,
    columns: Vec<(String, &'static str)>,
    key: &'static [&'static str],
}

impl TableDef {
    fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn create_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|(name, ty)| format!("{name} {ty} NOT NULL"))
            .collect::<Vec<_>>()
            .join(",\n    ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    PRIMARY KEY ({})\n);\n\
             CREATE INDEX IF NOT EXISTS idx_{}_season ON {}(season);\n",
            self.name,
            cols,
            self.key.join(", "),
            self.name,
            self.name
        )
    }

    fn upsert_sql(&self) -> String {
        let placeholders = (1..=self.columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = self
            .columns
            .iter()
            .filter(|(name, _)| !self.key.contains(&name.as_str()))
            .map(|(name, _)| format!("{name} = excluded.{name}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
            self.name,
            self.column_list(),
            placeholders,
            self.key.join(", "),
            updates
        )
    }

    fn select_sql(&self, filter: &str) -> String {
        format!("SELECT {} FROM {} {}", self.column_list(), self.name, filter)
    }
}

fn stat_columns(prefix: &str, suffix: &str) -> Vec<(String, &'static str)> {
    Stat::ALL
        .iter()
        .map(|stat| (format!("{prefix}{}{suffix}", stat.name()), "REAL"))
        .collect()
}

fn game_columns() -> Vec<(String, &'static str)> {
    let mut cols: Vec<(String, &'static str)> = [
        ("game_id", "TEXT"),
        ("season", "INTEGER"),
        ("game_type", "INTEGER"),
        ("datetime", "TEXT"),
        ("home_franchise_id", "INTEGER"),
        ("away_franchise_id", "INTEGER"),
        ("home_name", "TEXT"),
        ("away_name", "TEXT"),
        ("winner", "TEXT"),
        ("shootout", "INTEGER"),
    ]
    .into_iter()
    .map(|(name, ty)| (name.to_string(), ty))
    .collect();
    cols.extend(stat_columns("home_", ""));
    cols.extend(stat_columns("away_", ""));
    cols
}

const GAME_COLUMN_COUNT: usize = 10 + 2 * Stat::COUNT;
const SIDE_SNAPSHOT_COLUMN_COUNT: usize = 3 + 2 * Stat::COUNT;

static BOXSCORE: Lazy<TableDef> = Lazy::new(|| TableDef {
    name: "boxscore",
    columns: game_columns(),
    key: &["game_id"],
});

static TEAM_SEASON_STATE: Lazy<TableDef> = Lazy::new(|| {
    let mut columns: Vec<(String, &'static str)> = [
        ("franchise_id", "INTEGER"),
        ("season", "INTEGER"),
        ("game_id", "TEXT"),
        ("datetime", "TEXT"),
        ("games_played_before", "INTEGER"),
        ("games_played_after", "INTEGER"),
        ("wins_before", "INTEGER"),
        ("wins_after", "INTEGER"),
        ("losses_before", "INTEGER"),
        ("losses_after", "INTEGER"),
    ]
    .into_iter()
    .map(|(name, ty)| (name.to_string(), ty))
    .collect();
    columns.extend(stat_columns("", "_for_before"));
    columns.extend(stat_columns("", "_for_after"));
    columns.extend(stat_columns("", "_against_before"));
    columns.extend(stat_columns("", "_against_after"));
    TableDef {
        name: "team_season_state",
        columns,
        key: &["franchise_id", "season", "game_id"],
    }
});

static SEASON_SNAPSHOT: Lazy<TableDef> = Lazy::new(|| {
    let mut columns = game_columns();
    for side in Side::BOTH {
        let prefix = side.as_str();
        columns.push((format!("{prefix}_games_played_before"), "INTEGER"));
        columns.push((format!("{prefix}_wins_before"), "INTEGER"));
        columns.push((format!("{prefix}_losses_before"), "INTEGER"));
        columns.extend(stat_columns(&format!("{prefix}_"), "_for_before"));
        columns.extend(stat_columns(&format!("{prefix}_"), "_against_before"));
    }
    TableDef {
        name: "season_snapshot",
        columns,
        key: &["game_id"],
    }
});

static ML_FEATURES: Lazy<TableDef> = Lazy::new(|| {
    let mut columns: Vec<(String, &'static str)> = [
        ("game_id", "TEXT"),
        ("game_type", "INTEGER"),
        ("season", "INTEGER"),
        ("datetime", "TEXT"),
        ("home_team_id", "INTEGER"),
        ("away_team_id", "INTEGER"),
        ("home_win", "INTEGER"),
    ]
    .into_iter()
    .map(|(name, ty)| (name.to_string(), ty))
    .collect();
    for rate in RateStat::ALL {
        for side in Side::BOTH {
            columns.push((FeatureRow::column_name(rate, side), "REAL"));
        }
    }
    TableDef {
        name: "ml_features",
        columns,
        key: &["game_id"],
    }
});

/// SQLite-backed [`GameStore`]. Each season batch commits in one transaction.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn count_rows(&self, table: &str) -> Result<usize, StoreError> {
        let known = [
            BOXSCORE.name,
            TEAM_SEASON_STATE.name,
            SEASON_SNAPSHOT.name,
            ML_FEATURES.name,
            "pipeline_runs",
        ];
        if !known.contains(&table) {
            return Err(StoreError::Decode {
                table: "sqlite_master",
                detail: format!("unknown table {table}"),
            });
        }
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    let mut sql = String::from("PRAGMA journal_mode = WAL;\n");
    for table in [&*BOXSCORE, &*TEAM_SEASON_STATE, &*SEASON_SNAPSHOT, &*ML_FEATURES] {
        sql.push_str(&table.create_sql());
    }
    sql.push_str(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            finished_at TEXT NOT NULL,
            season INTEGER NOT NULL,
            team_states INTEGER NOT NULL,
            snapshots INTEGER NOT NULL,
            features_written INTEGER NOT NULL,
            features_skipped INTEGER NOT NULL,
            imputed_json TEXT NOT NULL,
            error TEXT NULL
        );
        "#,
    );
    conn.execute_batch(&sql)?;
    Ok(())
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decode_failure(idx: usize, table: &'static str, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        Box::new(StoreError::Decode { table, detail }),
    )
}

fn get_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn get_game_type(row: &Row<'_>, idx: usize) -> rusqlite::Result<GameType> {
    let code: i64 = row.get(idx)?;
    GameType::from_code(code)
        .ok_or_else(|| decode_failure(idx, "game", format!("unknown game type {code}")))
}

fn get_side(row: &Row<'_>, idx: usize) -> rusqlite::Result<Side> {
    let raw: String = row.get(idx)?;
    Side::parse(&raw).ok_or_else(|| decode_failure(idx, "game", format!("unknown winner {raw}")))
}

fn get_stat_line(row: &Row<'_>, offset: usize) -> rusqlite::Result<StatLine> {
    let mut line = StatLine::default();
    for (i, stat) in Stat::ALL.iter().enumerate() {
        line.set(*stat, row.get(offset + i)?);
    }
    Ok(line)
}

fn push_stat_line(values: &mut Vec<Value>, line: &StatLine) {
    values.extend(line.iter().map(|(_, v)| Value::Real(v)));
}

fn game_values(game: &Game) -> Vec<Value> {
    let mut values = vec![
        Value::Text(game.game_id.clone()),
        Value::Integer(i64::from(game.season)),
        Value::Integer(game.game_type.code()),
        Value::Text(format_datetime(&game.datetime)),
        Value::Integer(i64::from(game.home_team_id.0)),
        Value::Integer(i64::from(game.away_team_id.0)),
        Value::Text(game.home_name.clone()),
        Value::Text(game.away_name.clone()),
        Value::Text(game.winner.as_str().to_string()),
        Value::Integer(i64::from(game.shootout)),
    ];
    push_stat_line(&mut values, &game.home_stats);
    push_stat_line(&mut values, &game.away_stats);
    values
}

fn decode_game(row: &Row<'_>, offset: usize) -> rusqlite::Result<Game> {
    Ok(Game {
        game_id: row.get(offset)?,
        season: row.get(offset + 1)?,
        game_type: get_game_type(row, offset + 2)?,
        datetime: get_datetime(row, offset + 3)?,
        home_team_id: FranchiseId(row.get(offset + 4)?),
        away_team_id: FranchiseId(row.get(offset + 5)?),
        home_name: row.get(offset + 6)?,
        away_name: row.get(offset + 7)?,
        winner: get_side(row, offset + 8)?,
        shootout: row.get(offset + 9)?,
        home_stats: get_stat_line(row, offset + 10)?,
        away_stats: get_stat_line(row, offset + 10 + Stat::COUNT)?,
    })
}

fn team_state_values(state: &TeamSeasonState) -> Vec<Value> {
    let mut values = vec![
        Value::Integer(i64::from(state.franchise_id.0)),
        Value::Integer(i64::from(state.season)),
        Value::Text(state.game_id.clone()),
        Value::Text(format_datetime(&state.datetime)),
        Value::Integer(i64::from(state.games_played_before)),
        Value::Integer(i64::from(state.games_played_after)),
        Value::Integer(i64::from(state.wins_before)),
        Value::Integer(i64::from(state.wins_after)),
        Value::Integer(i64::from(state.losses_before)),
        Value::Integer(i64::from(state.losses_after)),
    ];
    push_stat_line(&mut values, &state.for_before);
    push_stat_line(&mut values, &state.for_after);
    push_stat_line(&mut values, &state.against_before);
    push_stat_line(&mut values, &state.against_after);
    values
}

fn decode_team_state(row: &Row<'_>) -> rusqlite::Result<TeamSeasonState> {
    Ok(TeamSeasonState {
        franchise_id: FranchiseId(row.get(0)?),
        season: row.get(1)?,
        game_id: row.get(2)?,
        datetime: get_datetime(row, 3)?,
        games_played_before: row.get(4)?,
        games_played_after: row.get(5)?,
        wins_before: row.get(6)?,
        wins_after: row.get(7)?,
        losses_before: row.get(8)?,
        losses_after: row.get(9)?,
        for_before: get_stat_line(row, 10)?,
        for_after: get_stat_line(row, 10 + Stat::COUNT)?,
        against_before: get_stat_line(row, 10 + 2 * Stat::COUNT)?,
        against_after: get_stat_line(row, 10 + 3 * Stat::COUNT)?,
    })
}

fn snapshot_values(snap: &SeasonGameSnapshot) -> Vec<Value> {
    let mut values = game_values(&snap.game);
    for side in Side::BOTH {
        let s = snap.side(side);
        values.push(Value::Integer(i64::from(s.games_played_before)));
        values.push(Value::Integer(i64::from(s.wins_before)));
        values.push(Value::Integer(i64::from(s.losses_before)));
        push_stat_line(&mut values, &s.for_before);
        push_stat_line(&mut values, &s.against_before);
    }
    values
}

fn decode_side_snapshot(
    row: &Row<'_>,
    offset: usize,
    franchise_id: FranchiseId,
) -> rusqlite::Result<SideSnapshot> {
    Ok(SideSnapshot {
        franchise_id,
        games_played_before: row.get(offset)?,
        wins_before: row.get(offset + 1)?,
        losses_before: row.get(offset + 2)?,
        for_before: get_stat_line(row, offset + 3)?,
        against_before: get_stat_line(row, offset + 3 + Stat::COUNT)?,
    })
}

fn decode_snapshot(row: &Row<'_>) -> rusqlite::Result<SeasonGameSnapshot> {
    let game = decode_game(row, 0)?;
    let home = decode_side_snapshot(row, GAME_COLUMN_COUNT, game.home_team_id)?;
    let away = decode_side_snapshot(
        row,
        GAME_COLUMN_COUNT + SIDE_SNAPSHOT_COLUMN_COUNT,
        game.away_team_id,
    )?;
    Ok(SeasonGameSnapshot { game, home, away })
}

fn feature_values(row: &FeatureRow) -> Vec<Value> {
    let mut values = vec![
        Value::Text(row.game_id.clone()),
        Value::Integer(row.game_type.code()),
        Value::Integer(i64::from(row.season)),
        Value::Text(format_datetime(&row.datetime)),
        Value::Integer(i64::from(row.home_team_id.0)),
        Value::Integer(i64::from(row.away_team_id.0)),
        Value::Integer(i64::from(row.home_win)),
    ];
    for rate in RateStat::ALL {
        for side in Side::BOTH {
            values.push(Value::Real(row.rate(rate, side)));
        }
    }
    values
}

fn decode_feature_row(row: &Row<'_>) -> rusqlite::Result<FeatureRow> {
    let mut out = FeatureRow {
        game_id: row.get(0)?,
        game_type: get_game_type(row, 1)?,
        season: row.get(2)?,
        datetime: get_datetime(row, 3)?,
        home_team_id: FranchiseId(row.get(4)?),
        away_team_id: FranchiseId(row.get(5)?),
        home_win: row.get(6)?,
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
    let mut idx = 7;
    for rate in RateStat::ALL {
        for side in Side::BOTH {
            out.set_rate(rate, side, row.get(idx)?);
            idx += 1;
        }
    }
    Ok(out)
}

fn upsert_rows<T>(
    conn: &Connection,
    table: &TableDef,
    rows: &[T],
    to_values: impl Fn(&T) -> Vec<Value>,
) -> Result<usize, StoreError> {
    let mut stmt = conn.prepare_cached(&table.upsert_sql())?;
    for row in rows {
        stmt.execute(params_from_iter(to_values(row)))?;
    }
    Ok(rows.len())
}

fn write_batch(conn: &Connection, batch: &SeasonBatch<'_>) -> Result<(), StoreError> {
    if !batch.team_states.is_empty() {
        conn.execute(
            "DELETE FROM team_season_state WHERE season = ?1",
            params![batch.season],
        )?;
        conn.execute(
            "DELETE FROM season_snapshot WHERE season = ?1",
            params![batch.season],
        )?;
    }
    upsert_rows(conn, &TEAM_SEASON_STATE, batch.team_states, team_state_values)?;
    upsert_rows(conn, &SEASON_SNAPSHOT, batch.snapshots, snapshot_values)?;
    upsert_rows(conn, &ML_FEATURES, batch.features, feature_values)?;
    Ok(())
}

impl GameStore for SqliteStore {
    fn fetch_games(&self, season: i32, game_types: &[GameType]) -> Result<Vec<Game>, StoreError> {
        if game_types.is_empty() {
            return Ok(Vec::new());
        }
        let codes = game_types
            .iter()
            .map(|t| t.code().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = BOXSCORE.select_sql(&format!(
            "WHERE season = ?1 AND game_type IN ({codes}) ORDER BY datetime ASC, game_id ASC"
        ));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![season], |row| decode_game(row, 0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn fetch_team_season_state(
        &self,
        season: i32,
        franchise_id: FranchiseId,
    ) -> Result<Vec<TeamSeasonState>, StoreError> {
        let sql = TEAM_SEASON_STATE.select_sql(
            "WHERE season = ?1 AND franchise_id = ?2 ORDER BY games_played_after ASC",
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![season, i64::from(franchise_id.0)], decode_team_state)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn fetch_season_team_states(&self, season: i32) -> Result<Vec<TeamSeasonState>, StoreError> {
        let sql = TEAM_SEASON_STATE
            .select_sql("WHERE season = ?1 ORDER BY franchise_id ASC, games_played_after ASC");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![season], decode_team_state)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn fetch_season_snapshot(&self, season: i32) -> Result<Vec<SeasonGameSnapshot>, StoreError> {
        let sql =
            SEASON_SNAPSHOT.select_sql("WHERE season = ?1 ORDER BY datetime ASC, game_id ASC");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![season], decode_snapshot)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn existing_feature_ids(&self, season: i32) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT game_id FROM ml_features WHERE season = ?1")?;
        let rows = stmt.query_map(params![season], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    fn fetch_feature_rows(&self, seasons: &[i32]) -> Result<Vec<FeatureRow>, StoreError> {
        if seasons.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=seasons.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = ML_FEATURES.select_sql(&format!(
            "WHERE season IN ({placeholders}) ORDER BY season ASC, datetime ASC, game_id ASC"
        ));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(seasons.iter()), decode_feature_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn upsert_games(&mut self, games: &[Game]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let n = upsert_rows(&tx, &BOXSCORE, games, game_values)?;
        tx.commit()?;
        Ok(n)
    }

    fn upsert_team_season_state(&mut self, rows: &[TeamSeasonState]) -> Result<usize, StoreError> {
        upsert_rows(&self.conn, &TEAM_SEASON_STATE, rows, team_state_values)
    }

    fn upsert_season_snapshot(&mut self, rows: &[SeasonGameSnapshot]) -> Result<usize, StoreError> {
        upsert_rows(&self.conn, &SEASON_SNAPSHOT, rows, snapshot_values)
    }

    fn upsert_feature_rows(&mut self, rows: &[FeatureRow]) -> Result<usize, StoreError> {
        upsert_rows(&self.conn, &ML_FEATURES, rows, feature_values)
    }

    fn write_season(&mut self, batch: SeasonBatch<'_>) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        write_batch(&tx, &batch)?;
        tx.commit()?;
        Ok(())
    }

    fn record_run(&mut self, outcome: &SeasonOutcome) -> Result<(), StoreError> {
        let imputed: Vec<u32> = outcome.imputed_teams.iter().map(|t| t.0).collect();
        self.conn.execute(
            "INSERT INTO pipeline_runs(finished_at, season, team_states, snapshots, features_written, features_skipped, imputed_json, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Utc::now().to_rfc3339(),
                outcome.season,
                outcome.team_states as i64,
                outcome.snapshots as i64,
                outcome.features_written as i64,
                outcome.features_skipped as i64,
                serde_json::to_string(&imputed)?,
                outcome.error,
            ],
        )?;
        Ok(())
    }
}
