use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::TriggeredBy;
use crate::aggregate::{self, AggregateReport};
use crate::pipeline::{self, RunOutcome, RunRequest};
use crate::query;
use crate::source::RawStatSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SchedulerOutcome {
    #[serde(rename_all = "camelCase")]
    UpToDate {
        season: i32,
        latest_official_week: Option<u32>,
        latest_raw_week: u32,
    },
    #[serde(rename_all = "camelCase")]
    Published {
        season: i32,
        week: u32,
        outcome: Box<RunOutcome>,
    },
    #[serde(rename_all = "camelCase")]
    Reaggregated {
        season: i32,
        week: u32,
        snapshot_id: i64,
        report: AggregateReport,
    },
}

pub fn latest_official_week(conn: &Connection, season: i32) -> Result<Option<u32>> {
    conn.query_row(
        "SELECT MAX(week) FROM snapshot_meta
         WHERE season = ?1 AND is_official = 1 AND validation_passed = 1",
        params![season],
        |row| row.get::<_, Option<u32>>(0),
    )
    .context("query latest official week")
}

/// Publishes the newest raw week if it is ahead of the latest official snapshot.
///
/// When the latest official snapshot is current but lost its season rows to a
/// failed aggregation, those rows are derived instead. Calling this again with
/// no new raw data is a no-op that returns the same `UpToDate` result.
pub fn auto_snapshot(
    conn: &mut Connection,
    source: &dyn RawStatSource,
    cfg: &PipelineConfig,
    season: i32,
) -> Result<SchedulerOutcome> {
    let official = latest_official_week(conn, season)?;
    let Some(raw) = source
        .latest_week(season)
        .with_context(|| format!("read latest raw week for season {season}"))?
    else {
        log::error!("raw source has no rows for season {season}");
        return Err(PipelineError::NoRawData { season }.into());
    };

    if let Some(week) = official.filter(|week| raw <= *week) {
        let current = query::latest_official_snapshot(conn, season, week)?.map(|meta| meta.id);
        let stranded = match current {
            Some(id) if aggregate::missing_season_rows(conn, id)? => Some(id),
            _ => None,
        };
        if let Some(snapshot_id) = stranded {
            log::warn!("snapshot {snapshot_id} for season {season} week {week} has no season rows");
            let report = pipeline::reaggregate(conn, cfg, snapshot_id)?;
            return Ok(SchedulerOutcome::Reaggregated {
                season,
                week,
                snapshot_id,
                report,
            });
        }
        log::info!(
            "season {season} up to date: official week {week} raw week {raw}"
        );
        return Ok(SchedulerOutcome::UpToDate {
            season,
            latest_official_week: official,
            latest_raw_week: raw,
        });
    }

    log::info!(
        "season {season}: raw week {raw} is ahead of official week {}; running pipeline",
        official.map(|w| w.to_string()).unwrap_or_else(|| "none".to_string())
    );
    let outcome = pipeline::run_week(
        conn,
        source,
        cfg,
        &RunRequest::new(season, raw, TriggeredBy::Auto),
    )?;
    Ok(SchedulerOutcome::Published {
        season,
        week: raw,
        outcome: Box::new(outcome),
    })
}
