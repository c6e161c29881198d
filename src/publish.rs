use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::db::{self, WEEK_COLUMNS, WEEK_TABLE};
use crate::error::PipelineError;
use crate::model::{StagingRow, TriggeredBy};
use crate::staging;
use crate::validate::ValidationResult;

/// Metrics every published row is expected to carry.
pub const CORE_METRICS: [&str; 5] = [
    "fantasy_points_ppr",
    "routes",
    "targets",
    "snaps",
    "receptions",
];

#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub season: i32,
    pub week: u32,
    pub data_version: &'a str,
    pub triggered_by: TriggeredBy,
    pub official: bool,
    pub validation: &'a ValidationResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub checked: bool,
    pub null_counts: BTreeMap<String, i64>,
}

impl IntegrityReport {
    pub fn total_nulls(&self) -> i64 {
        self.null_counts.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub snapshot_id: i64,
    pub rows_published: usize,
    pub content_hash: String,
    pub integrity: IntegrityReport,
}

/// Promotes the staged rows for one season/week into a new snapshot.
///
/// The metadata insert and the row copy commit together; the integrity check
/// runs afterwards and only logs.
pub fn publish_snapshot(
    conn: &mut Connection,
    req: &PublishRequest<'_>,
    batch_size: usize,
) -> Result<PublishReport> {
    let validation = req.validation;
    if !validation.passed() || validation.season != req.season || validation.week != req.week {
        return Err(PipelineError::ValidationNotPassed {
            season: req.season,
            week: req.week,
        }
        .into());
    }

    let rows = staging::load_staging_rows(conn, req.season, req.week)?;
    let content_hash = content_fingerprint(&rows)?;

    let tx = conn.transaction().context("begin publish transaction")?;
    tx.execute(
        "INSERT INTO snapshot_meta (
            season, week, data_version, is_official, row_count, team_count,
            validation_passed, validation_errors, published_at, triggered_by, content_hash
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?9, ?10)",
        params![
            req.season,
            req.week,
            req.data_version,
            req.official as i64,
            validation.row_count,
            validation.team_count,
            validation.error_summary(),
            Utc::now().to_rfc3339(),
            req.triggered_by.as_str(),
            content_hash,
        ],
    )
    .context("insert snapshot meta")?;
    let snapshot_id = tx.last_insert_rowid();

    let mut columns = Vec::with_capacity(WEEK_COLUMNS.len() + 1);
    columns.push("snapshot_id");
    columns.extend(WEEK_COLUMNS);
    let values = rows
        .iter()
        .map(|row| {
            let mut v = Vec::with_capacity(columns.len());
            v.push(Value::Integer(snapshot_id));
            v.extend(db::week_row_values(row));
            v
        })
        .collect::<Vec<_>>();
    let rows_published = db::insert_batched(&tx, WEEK_TABLE, &columns, &values, batch_size)?;
    tx.commit().context("commit publish transaction")?;

    log::info!(
        "published snapshot {snapshot_id}: season {} week {} rows={rows_published} version={} official={} trigger={}",
        req.season,
        req.week,
        req.data_version,
        req.official,
        req.triggered_by,
    );

    let integrity = match integrity_check(conn, snapshot_id) {
        Ok(report) => report,
        Err(err) => {
            log::warn!("integrity check for snapshot {snapshot_id} could not run: {err:#}");
            IntegrityReport::default()
        }
    };

    Ok(PublishReport {
        snapshot_id,
        rows_published,
        content_hash,
        integrity,
    })
}

/// Counts published rows with a null in each core metric. Nulls are warned
/// about, never rolled back.
pub fn integrity_check(conn: &Connection, snapshot_id: i64) -> Result<IntegrityReport> {
    let select = CORE_METRICS
        .iter()
        .map(|col| format!("COALESCE(SUM(CASE WHEN {col} IS NULL THEN 1 ELSE 0 END), 0)"))
        .collect::<Vec<_>>()
        .join(", ");
    let counts = conn
        .query_row(
            &format!("SELECT {select} FROM {WEEK_TABLE} WHERE snapshot_id = ?1"),
            params![snapshot_id],
            |row| {
                let mut out = Vec::with_capacity(CORE_METRICS.len());
                for idx in 0..CORE_METRICS.len() {
                    out.push(row.get::<_, i64>(idx)?);
                }
                Ok(out)
            },
        )
        .context("query core metric null counts")?;

    let mut report = IntegrityReport {
        checked: true,
        null_counts: BTreeMap::new(),
    };
    for (metric, nulls) in CORE_METRICS.iter().zip(counts) {
        if nulls > 0 {
            log::warn!("snapshot {snapshot_id}: {nulls} rows have null {metric}");
        }
        report.null_counts.insert((*metric).to_string(), nulls);
    }
    Ok(report)
}

/// SHA-256 over the rows in a canonical order (player id, name, team, then the
/// serialized row), so reordering the feed does not change the fingerprint.
pub fn content_fingerprint(rows: &[StagingRow]) -> Result<String> {
    let mut ordered = rows
        .iter()
        .map(|row| {
            let json = serde_json::to_vec(row)
                .with_context(|| format!("serialize row for {} fingerprint", row.player_name))?;
            Ok((row, json))
        })
        .collect::<Result<Vec<_>>>()?;
    ordered.sort_by(|(a, a_json), (b, b_json)| {
        a.player_id
            .cmp(&b.player_id)
            .then_with(|| a.player_name.cmp(&b.player_name))
            .then_with(|| a.team.cmp(&b.team))
            .then_with(|| a_json.cmp(b_json))
    });
    let mut hasher = Sha256::new();
    for (_, json) in ordered {
        hasher.update(&json);
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}
