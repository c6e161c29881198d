//! Read-only accessors over published snapshots.
//!
//! Only rows owned by a validated snapshot are ever returned, and the
//! season/week paths only look at official snapshots.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::db::{self, META_COLUMNS, SEASON_COLUMNS, SEASON_TABLE, WEEK_COLUMNS, WEEK_TABLE};
use crate::model::{PlayerSeasonRow, SnapshotMeta, SnapshotWeekRow};

pub const DEFAULT_SEARCH_LIMIT: usize = 25;
pub const MAX_SEARCH_LIMIT: usize = 200;
/// SQLite takes OFFSET as a signed 64-bit integer.
pub const MAX_SEARCH_OFFSET: usize = i64::MAX as usize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWeekFilter {
    pub player_id: Option<String>,
    pub name: Option<String>,
    pub team: Option<String>,
    pub position: Option<String>,
    pub min_routes: Option<i64>,
    pub min_snaps: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    pub season: i32,
    pub week: u32,
    pub position: Option<String>,
    pub min_routes: Option<i64>,
    pub min_snaps: Option<i64>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub snapshot_id: Option<i64>,
    pub total: i64,
    pub limit: usize,
    pub offset: usize,
    pub rows: Vec<SnapshotWeekRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub latest_snapshot: Option<SnapshotMeta>,
    pub table_counts: BTreeMap<String, i64>,
    pub checked_at: String,
}

/// Newest official, validated snapshot across all seasons.
pub fn current_snapshot_meta(conn: &Connection) -> Result<Option<SnapshotMeta>> {
    conn.query_row(
        &format!(
            "SELECT {META_COLUMNS} FROM snapshot_meta
             WHERE is_official = 1 AND validation_passed = 1
             ORDER BY id DESC LIMIT 1"
        ),
        [],
        db::meta_from_sql,
    )
    .optional()
    .context("query current snapshot meta")
}

pub fn snapshot_meta_by_id(conn: &Connection, snapshot_id: i64) -> Result<Option<SnapshotMeta>> {
    conn.query_row(
        &format!("SELECT {META_COLUMNS} FROM snapshot_meta WHERE id = ?1"),
        params![snapshot_id],
        db::meta_from_sql,
    )
    .optional()
    .context("query snapshot meta by id")
}

pub fn latest_official_snapshot(
    conn: &Connection,
    season: i32,
    week: u32,
) -> Result<Option<SnapshotMeta>> {
    conn.query_row(
        &format!(
            "SELECT {META_COLUMNS} FROM snapshot_meta
             WHERE season = ?1 AND week = ?2 AND is_official = 1 AND validation_passed = 1
             ORDER BY id DESC LIMIT 1"
        ),
        params![season, week],
        db::meta_from_sql,
    )
    .optional()
    .context("query latest official snapshot")
}

/// All rows of one snapshot, whatever its official flag.
pub fn snapshot_rows(conn: &Connection, snapshot_id: i64) -> Result<Vec<SnapshotWeekRow>> {
    filtered_week_rows(conn, snapshot_id, &PlayerWeekFilter::default(), None)
}

pub fn player_week(
    conn: &Connection,
    season: i32,
    week: u32,
    filter: &PlayerWeekFilter,
) -> Result<Vec<SnapshotWeekRow>> {
    let Some(meta) = latest_official_snapshot(conn, season, week)? else {
        return Ok(Vec::new());
    };
    filtered_week_rows(conn, meta.id, filter, None)
}

pub fn team_week(
    conn: &Connection,
    team: &str,
    season: i32,
    week: u32,
    position: Option<&str>,
) -> Result<Vec<SnapshotWeekRow>> {
    let filter = PlayerWeekFilter {
        team: Some(team.to_string()),
        position: position.map(str::to_string),
        ..Default::default()
    };
    player_week(conn, season, week, &filter)
}

/// Season row with the latest through-week among official snapshots.
pub fn player_season(
    conn: &Connection,
    player_id: &str,
    season: i32,
) -> Result<Option<PlayerSeasonRow>> {
    let columns = prefixed(&SEASON_COLUMNS, "ps");
    conn.query_row(
        &format!(
            "SELECT {columns} FROM {SEASON_TABLE} ps
             JOIN snapshot_meta m ON m.id = ps.snapshot_id
             WHERE ps.player_id = ?1 AND ps.season = ?2
               AND m.is_official = 1 AND m.validation_passed = 1
             ORDER BY ps.through_week DESC, ps.snapshot_id DESC
             LIMIT 1"
        ),
        params![player_id, season],
        db::season_row_from_sql,
    )
    .optional()
    .context("query player season row")
}

pub fn season_rows(conn: &Connection, snapshot_id: i64) -> Result<Vec<PlayerSeasonRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM {SEASON_TABLE} WHERE snapshot_id = ?1 ORDER BY player_id ASC",
            SEASON_COLUMNS.join(", ")
        ))
        .context("prepare season rows query")?;
    let rows = stmt
        .query_map(params![snapshot_id], db::season_row_from_sql)
        .context("query season rows")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode season row")?);
    }
    Ok(out)
}

/// Paginated, PPR-ranked search over the latest official snapshot for the week.
pub fn search(conn: &Connection, params: &SearchParams) -> Result<SearchPage> {
    let limit = params.limit.clamp(1, MAX_SEARCH_LIMIT);
    let offset = params.offset.min(MAX_SEARCH_OFFSET);
    let Some(meta) = latest_official_snapshot(conn, params.season, params.week)? else {
        return Ok(SearchPage {
            snapshot_id: None,
            total: 0,
            limit,
            offset,
            rows: Vec::new(),
        });
    };
    let filter = PlayerWeekFilter {
        name: params.q.clone(),
        position: params.position.clone(),
        min_routes: params.min_routes,
        min_snaps: params.min_snaps,
        ..Default::default()
    };
    let (where_sql, args) = filter_clause(meta.id, &filter);
    let total = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {WEEK_TABLE} WHERE {where_sql}"),
            params_from_iter(args.iter()),
            |row| row.get::<_, i64>(0),
        )
        .context("count search results")?;
    let rows = filtered_week_rows(conn, meta.id, &filter, Some((limit, offset)))?;
    Ok(SearchPage {
        snapshot_id: Some(meta.id),
        total,
        limit,
        offset,
        rows,
    })
}

pub fn health(conn: &Connection) -> Result<HealthReport> {
    Ok(HealthReport {
        latest_snapshot: current_snapshot_meta(conn)?,
        table_counts: db::table_counts(conn)?,
        checked_at: Utc::now().to_rfc3339(),
    })
}

fn filtered_week_rows(
    conn: &Connection,
    snapshot_id: i64,
    filter: &PlayerWeekFilter,
    page: Option<(usize, usize)>,
) -> Result<Vec<SnapshotWeekRow>> {
    let (where_sql, args) = filter_clause(snapshot_id, filter);
    let mut sql = format!(
        "SELECT snapshot_id, {} FROM {WEEK_TABLE} WHERE {where_sql}
         ORDER BY fantasy_points_ppr IS NULL, fantasy_points_ppr DESC, player_name ASC",
        WEEK_COLUMNS.join(", ")
    );
    if let Some((limit, offset)) = page {
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
    }
    let mut stmt = conn.prepare(&sql).context("prepare player week query")?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            Ok(SnapshotWeekRow {
                snapshot_id: row.get(0)?,
                stats: db::week_row_from_sql(row, 1)?,
            })
        })
        .context("query player week rows")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode player week row")?);
    }
    Ok(out)
}

fn filter_clause(snapshot_id: i64, filter: &PlayerWeekFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["snapshot_id = ?".to_string()];
    let mut args = vec![Value::Integer(snapshot_id)];
    if let Some(id) = non_blank(filter.player_id.as_deref()) {
        clauses.push("player_id = ?".to_string());
        args.push(Value::Text(id.to_string()));
    }
    if let Some(name) = non_blank(filter.name.as_deref()) {
        clauses.push("player_name LIKE ?".to_string());
        args.push(Value::Text(format!("%{name}%")));
    }
    if let Some(team) = non_blank(filter.team.as_deref()) {
        clauses.push("UPPER(team) = ?".to_string());
        args.push(Value::Text(team.to_ascii_uppercase()));
    }
    if let Some(position) = non_blank(filter.position.as_deref()) {
        clauses.push("UPPER(position) = ?".to_string());
        args.push(Value::Text(position.to_ascii_uppercase()));
    }
    if let Some(min) = filter.min_routes {
        clauses.push("COALESCE(routes, 0) >= ?".to_string());
        args.push(Value::Integer(min));
    }
    if let Some(min) = filter.min_snaps {
        clauses.push("COALESCE(snaps, 0) >= ?".to_string());
        args.push(Value::Integer(min));
    }
    (clauses.join(" AND "), args)
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn prefixed(columns: &[&str], alias: &str) -> String {
    columns
        .iter()
        .map(|c| format!("{alias}.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_clause_skips_blank_values() {
        let filter = PlayerWeekFilter {
            name: Some("  ".into()),
            team: Some("kc".into()),
            min_routes: Some(10),
            ..Default::default()
        };
        let (sql, args) = filter_clause(4, &filter);
        assert_eq!(
            sql,
            "snapshot_id = ? AND UPPER(team) = ? AND COALESCE(routes, 0) >= ?"
        );
        assert_eq!(args.len(), 3);
        assert_eq!(args[1], Value::Text("KC".into()));
    }

    #[test]
    fn empty_database_reads_are_empty_not_errors() {
        let conn = db::open_in_memory().unwrap();
        assert!(current_snapshot_meta(&conn).unwrap().is_none());
        assert!(player_week(&conn, 2025, 1, &PlayerWeekFilter::default())
            .unwrap()
            .is_empty());
        assert!(player_season(&conn, "p1", 2025).unwrap().is_none());
        let page = search(
            &conn,
            &SearchParams {
                q: None,
                season: 2025,
                week: 1,
                position: None,
                min_routes: None,
                min_snaps: None,
                limit: 10,
                offset: 0,
            },
        )
        .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.snapshot_id.is_none());
    }
}
