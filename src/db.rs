use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::model::{PlayerSeasonRow, PlayerWeekRow, SnapshotMeta, TriggeredBy};
use crate::source;

pub const STAGING_TABLE: &str = "staging_player_week";
pub const WEEK_TABLE: &str = "player_week";
pub const SEASON_TABLE: &str = "player_season";
pub const META_TABLE: &str = "snapshot_meta";

pub const WEEK_COLUMNS: [&str; 29] = [
    "season",
    "week",
    "player_id",
    "player_name",
    "team",
    "position",
    "snaps",
    "snap_share",
    "routes",
    "route_participation",
    "targets",
    "target_share",
    "receptions",
    "receiving_yards",
    "receiving_tds",
    "air_yards",
    "rush_attempts",
    "rushing_yards",
    "rushing_tds",
    "tprr",
    "yprr",
    "yards_per_carry",
    "epa_per_play",
    "success_rate",
    "adot",
    "yac_per_reception",
    "fantasy_points_std",
    "fantasy_points_half",
    "fantasy_points_ppr",
];

pub const SEASON_COLUMNS: [&str; 32] = [
    "snapshot_id",
    "season",
    "through_week",
    "player_id",
    "player_name",
    "team",
    "position",
    "games_played",
    "snaps",
    "routes",
    "targets",
    "receptions",
    "receiving_yards",
    "receiving_tds",
    "air_yards",
    "rush_attempts",
    "rushing_yards",
    "rushing_tds",
    "fantasy_points_std",
    "fantasy_points_half",
    "fantasy_points_ppr",
    "fantasy_points_ppr_per_game",
    "snap_share",
    "route_participation",
    "target_share",
    "tprr",
    "yprr",
    "yards_per_carry",
    "epa_per_play",
    "success_rate",
    "adot",
    "yac_per_reception",
];

pub const META_COLUMNS: &str = "id, season, week, data_version, is_official, row_count, team_count, \
     validation_passed, validation_errors, published_at, triggered_by, content_hash";

const WEEK_COLUMN_DDL: &str = r#"
    season INTEGER NOT NULL,
    week INTEGER NOT NULL,
    player_id TEXT NULL,
    player_name TEXT NOT NULL,
    team TEXT NULL,
    position TEXT NULL,
    snaps INTEGER NULL,
    snap_share REAL NULL,
    routes INTEGER NULL,
    route_participation REAL NULL,
    targets INTEGER NULL,
    target_share REAL NULL,
    receptions INTEGER NULL,
    receiving_yards REAL NULL,
    receiving_tds INTEGER NULL,
    air_yards REAL NULL,
    rush_attempts INTEGER NULL,
    rushing_yards REAL NULL,
    rushing_tds INTEGER NULL,
    tprr REAL NULL,
    yprr REAL NULL,
    yards_per_carry REAL NULL,
    epa_per_play REAL NULL,
    success_rate REAL NULL,
    adot REAL NULL,
    yac_per_reception REAL NULL,
    fantasy_points_std REAL NULL,
    fantasy_points_half REAL NULL,
    fantasy_points_ppr REAL NULL
"#;

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable wal")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    let ddl = format!(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS snapshot_meta (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            data_version TEXT NOT NULL,
            is_official INTEGER NOT NULL,
            row_count INTEGER NOT NULL,
            team_count INTEGER NOT NULL,
            validation_passed INTEGER NOT NULL,
            validation_errors TEXT NULL,
            published_at TEXT NOT NULL,
            triggered_by TEXT NOT NULL,
            content_hash TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_snapshot_meta_season_week ON snapshot_meta(season, week);

        CREATE TABLE IF NOT EXISTS staging_player_week ({WEEK_COLUMN_DDL});
        CREATE INDEX IF NOT EXISTS idx_staging_season_week ON staging_player_week(season, week);

        CREATE TABLE IF NOT EXISTS player_week (
            snapshot_id INTEGER NOT NULL REFERENCES snapshot_meta(id),
            {WEEK_COLUMN_DDL}
        );
        CREATE INDEX IF NOT EXISTS idx_player_week_snapshot ON player_week(snapshot_id);
        CREATE INDEX IF NOT EXISTS idx_player_week_season_week ON player_week(season, week);
        CREATE INDEX IF NOT EXISTS idx_player_week_player ON player_week(player_id);

        CREATE TABLE IF NOT EXISTS player_season (
            snapshot_id INTEGER NOT NULL REFERENCES snapshot_meta(id),
            season INTEGER NOT NULL,
            through_week INTEGER NOT NULL,
            player_id TEXT NOT NULL,
            player_name TEXT NOT NULL,
            team TEXT NULL,
            position TEXT NULL,
            games_played INTEGER NOT NULL,
            snaps INTEGER NOT NULL,
            routes INTEGER NOT NULL,
            targets INTEGER NOT NULL,
            receptions INTEGER NOT NULL,
            receiving_yards REAL NOT NULL,
            receiving_tds INTEGER NOT NULL,
            air_yards REAL NOT NULL,
            rush_attempts INTEGER NOT NULL,
            rushing_yards REAL NOT NULL,
            rushing_tds INTEGER NOT NULL,
            fantasy_points_std REAL NOT NULL,
            fantasy_points_half REAL NOT NULL,
            fantasy_points_ppr REAL NOT NULL,
            fantasy_points_ppr_per_game REAL NULL,
            snap_share REAL NULL,
            route_participation REAL NULL,
            target_share REAL NULL,
            tprr REAL NULL,
            yprr REAL NULL,
            yards_per_carry REAL NULL,
            epa_per_play REAL NULL,
            success_rate REAL NULL,
            adot REAL NULL,
            yac_per_reception REAL NULL,
            PRIMARY KEY (snapshot_id, player_id)
        );
        CREATE INDEX IF NOT EXISTS idx_player_season_player ON player_season(player_id, season);

        CREATE TRIGGER IF NOT EXISTS snapshot_meta_immutable_update BEFORE UPDATE ON snapshot_meta
        BEGIN SELECT RAISE(ABORT, 'snapshot_meta rows are immutable'); END;
        CREATE TRIGGER IF NOT EXISTS snapshot_meta_immutable_delete BEFORE DELETE ON snapshot_meta
        BEGIN SELECT RAISE(ABORT, 'snapshot_meta rows are immutable'); END;
        CREATE TRIGGER IF NOT EXISTS player_week_immutable_update BEFORE UPDATE ON player_week
        BEGIN SELECT RAISE(ABORT, 'player_week rows are immutable'); END;
        CREATE TRIGGER IF NOT EXISTS player_week_immutable_delete BEFORE DELETE ON player_week
        BEGIN SELECT RAISE(ABORT, 'player_week rows are immutable'); END;
        CREATE TRIGGER IF NOT EXISTS player_season_immutable_update BEFORE UPDATE ON player_season
        BEGIN SELECT RAISE(ABORT, 'player_season rows are immutable'); END;
        CREATE TRIGGER IF NOT EXISTS player_season_immutable_delete BEFORE DELETE ON player_season
        BEGIN SELECT RAISE(ABORT, 'player_season rows are immutable'); END;

        CREATE TABLE IF NOT EXISTS pipeline_locks (
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            holder TEXT NOT NULL,
            acquired_at INTEGER NOT NULL,
            PRIMARY KEY (season, week)
        );

        CREATE TABLE IF NOT EXISTS pipeline_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            triggered_by TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            outcome TEXT NULL,
            snapshot_id INTEGER NULL,
            errors_json TEXT NOT NULL
        );
        "#
    );
    conn.execute_batch(&ddl).context("create sqlite schema")?;
    source::init_raw_schema(conn)?;
    Ok(())
}

/// Multi-row INSERT, `batch_size` rows per statement.
pub fn insert_batched(
    conn: &Connection,
    table: &str,
    columns: &[&str],
    rows: &[Vec<Value>],
    batch_size: usize,
) -> Result<usize> {
    let placeholder = format!("({})", vec!["?"; columns.len()].join(", "));
    let column_list = columns.join(", ");
    let mut written = 0usize;
    for chunk in rows.chunks(batch_size.max(1)) {
        debug_assert!(chunk.iter().all(|row| row.len() == columns.len()));
        let values = vec![placeholder.as_str(); chunk.len()].join(", ");
        let sql = format!("INSERT INTO {table} ({column_list}) VALUES {values}");
        written += conn
            .execute(&sql, params_from_iter(chunk.iter().flatten()))
            .with_context(|| format!("insert batch of {} rows into {table}", chunk.len()))?;
    }
    Ok(written)
}

pub fn week_row_values(row: &PlayerWeekRow) -> Vec<Value> {
    vec![
        Value::Integer(row.season as i64),
        Value::Integer(row.week as i64),
        text(row.player_id.as_deref()),
        Value::Text(row.player_name.clone()),
        text(row.team.as_deref()),
        text(row.position.as_deref()),
        int(row.snaps),
        real(row.snap_share),
        int(row.routes),
        real(row.route_participation),
        int(row.targets),
        real(row.target_share),
        int(row.receptions),
        real(row.receiving_yards),
        int(row.receiving_tds),
        real(row.air_yards),
        int(row.rush_attempts),
        real(row.rushing_yards),
        int(row.rushing_tds),
        real(row.tprr),
        real(row.yprr),
        real(row.yards_per_carry),
        real(row.epa_per_play),
        real(row.success_rate),
        real(row.adot),
        real(row.yac_per_reception),
        real(row.fantasy_points_std),
        real(row.fantasy_points_half),
        real(row.fantasy_points_ppr),
    ]
}

/// Reads [`WEEK_COLUMNS`] starting at column `base`.
pub fn week_row_from_sql(row: &Row<'_>, base: usize) -> rusqlite::Result<PlayerWeekRow> {
    Ok(PlayerWeekRow {
        season: row.get(base)?,
        week: row.get(base + 1)?,
        player_id: row.get(base + 2)?,
        player_name: row.get(base + 3)?,
        team: row.get(base + 4)?,
        position: row.get(base + 5)?,
        snaps: row.get(base + 6)?,
        snap_share: row.get(base + 7)?,
        routes: row.get(base + 8)?,
        route_participation: row.get(base + 9)?,
        targets: row.get(base + 10)?,
        target_share: row.get(base + 11)?,
        receptions: row.get(base + 12)?,
        receiving_yards: row.get(base + 13)?,
        receiving_tds: row.get(base + 14)?,
        air_yards: row.get(base + 15)?,
        rush_attempts: row.get(base + 16)?,
        rushing_yards: row.get(base + 17)?,
        rushing_tds: row.get(base + 18)?,
        tprr: row.get(base + 19)?,
        yprr: row.get(base + 20)?,
        yards_per_carry: row.get(base + 21)?,
        epa_per_play: row.get(base + 22)?,
        success_rate: row.get(base + 23)?,
        adot: row.get(base + 24)?,
        yac_per_reception: row.get(base + 25)?,
        fantasy_points_std: row.get(base + 26)?,
        fantasy_points_half: row.get(base + 27)?,
        fantasy_points_ppr: row.get(base + 28)?,
    })
}

pub fn season_row_values(row: &PlayerSeasonRow) -> Vec<Value> {
    vec![
        Value::Integer(row.snapshot_id),
        Value::Integer(row.season as i64),
        Value::Integer(row.through_week as i64),
        Value::Text(row.player_id.clone()),
        Value::Text(row.player_name.clone()),
        text(row.team.as_deref()),
        text(row.position.as_deref()),
        Value::Integer(row.games_played),
        Value::Integer(row.snaps),
        Value::Integer(row.routes),
        Value::Integer(row.targets),
        Value::Integer(row.receptions),
        Value::Real(row.receiving_yards),
        Value::Integer(row.receiving_tds),
        Value::Real(row.air_yards),
        Value::Integer(row.rush_attempts),
        Value::Real(row.rushing_yards),
        Value::Integer(row.rushing_tds),
        Value::Real(row.fantasy_points_std),
        Value::Real(row.fantasy_points_half),
        Value::Real(row.fantasy_points_ppr),
        real(row.fantasy_points_ppr_per_game),
        real(row.snap_share),
        real(row.route_participation),
        real(row.target_share),
        real(row.tprr),
        real(row.yprr),
        real(row.yards_per_carry),
        real(row.epa_per_play),
        real(row.success_rate),
        real(row.adot),
        real(row.yac_per_reception),
    ]
}

pub fn season_row_from_sql(row: &Row<'_>) -> rusqlite::Result<PlayerSeasonRow> {
    Ok(PlayerSeasonRow {
        snapshot_id: row.get(0)?,
        season: row.get(1)?,
        through_week: row.get(2)?,
        player_id: row.get(3)?,
        player_name: row.get(4)?,
        team: row.get(5)?,
        position: row.get(6)?,
        games_played: row.get(7)?,
        snaps: row.get(8)?,
        routes: row.get(9)?,
        targets: row.get(10)?,
        receptions: row.get(11)?,
        receiving_yards: row.get(12)?,
        receiving_tds: row.get(13)?,
        air_yards: row.get(14)?,
        rush_attempts: row.get(15)?,
        rushing_yards: row.get(16)?,
        rushing_tds: row.get(17)?,
        fantasy_points_std: row.get(18)?,
        fantasy_points_half: row.get(19)?,
        fantasy_points_ppr: row.get(20)?,
        fantasy_points_ppr_per_game: row.get(21)?,
        snap_share: row.get(22)?,
        route_participation: row.get(23)?,
        target_share: row.get(24)?,
        tprr: row.get(25)?,
        yprr: row.get(26)?,
        yards_per_carry: row.get(27)?,
        epa_per_play: row.get(28)?,
        success_rate: row.get(29)?,
        adot: row.get(30)?,
        yac_per_reception: row.get(31)?,
    })
}

/// Expects the column order of [`META_COLUMNS`].
pub fn meta_from_sql(row: &Row<'_>) -> rusqlite::Result<SnapshotMeta> {
    let triggered_raw: String = row.get(10)?;
    let triggered_by = triggered_raw
        .parse::<TriggeredBy>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, err.into()))?;
    Ok(SnapshotMeta {
        id: row.get(0)?,
        season: row.get(1)?,
        week: row.get(2)?,
        data_version: row.get(3)?,
        is_official: row.get::<_, i64>(4)? != 0,
        row_count: row.get(5)?,
        team_count: row.get(6)?,
        validation_passed: row.get::<_, i64>(7)? != 0,
        validation_errors: row.get(8)?,
        published_at: row.get(9)?,
        triggered_by,
        content_hash: row.get(11)?,
    })
}

pub fn record_run_start(
    conn: &Connection,
    season: i32,
    week: u32,
    triggered_by: TriggeredBy,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO pipeline_runs(season, week, triggered_by, started_at, errors_json)
         VALUES (?1, ?2, ?3, ?4, '[]')",
        params![season, week, triggered_by.as_str(), Utc::now().to_rfc3339()],
    )
    .context("insert pipeline run")?;
    Ok(conn.last_insert_rowid())
}

pub fn record_run_finish(
    conn: &Connection,
    run_id: i64,
    outcome: &str,
    snapshot_id: Option<i64>,
    errors: &[String],
) -> Result<()> {
    let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "UPDATE pipeline_runs
         SET finished_at = ?1, outcome = ?2, snapshot_id = ?3, errors_json = ?4
         WHERE run_id = ?5",
        params![Utc::now().to_rfc3339(), outcome, snapshot_id, errors_json, run_id],
    )
    .context("update pipeline run")?;
    Ok(())
}

pub fn table_counts(conn: &Connection) -> Result<BTreeMap<String, i64>> {
    let mut out = BTreeMap::new();
    for table in [META_TABLE, WEEK_TABLE, SEASON_TABLE, STAGING_TABLE] {
        let count = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .with_context(|| format!("count rows in {table}"))?;
        out.insert(table.to_string(), count);
    }
    Ok(out)
}

fn int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

fn real(v: Option<f64>) -> Value {
    match v {
        Some(x) if x.is_finite() => Value::Real(x),
        _ => Value::Null,
    }
}

fn text(v: Option<&str>) -> Value {
    v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null)
}
