use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, AggregateReport};
use crate::config::PipelineConfig;
use crate::db;
use crate::error::PipelineError;
use crate::lock::with_run_lock;
use crate::model::TriggeredBy;
use crate::publish::{self, PublishReport, PublishRequest};
use crate::query;
use crate::source::RawStatSource;
use crate::staging::{self, StagingReport};
use crate::validate::{self, Thresholds, ValidationResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub season: i32,
    pub week: u32,
    pub data_version: Option<String>,
    pub triggered_by: TriggeredBy,
    pub official: bool,
}

impl RunRequest {
    pub fn new(season: i32, week: u32, triggered_by: TriggeredBy) -> Self {
        Self {
            season,
            week,
            data_version: None,
            triggered_by,
            official: true,
        }
    }

    fn resolved_data_version(&self) -> String {
        self.data_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}w{:02}-{}",
                    self.season,
                    self.week,
                    Utc::now().format("%Y%m%d%H%M%S")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub snapshot_id: i64,
    pub data_version: String,
    pub staging: StagingReport,
    pub validation: ValidationResult,
    pub publish: PublishReport,
    pub aggregate: AggregateReport,
}

/// Stage, validate, publish and aggregate one season/week.
///
/// Both the scheduler and manual triggers come through here. A failed gate
/// returns `PipelineError::Validation` and leaves the staged rows in place.
pub fn run_week(
    conn: &mut Connection,
    source: &dyn RawStatSource,
    cfg: &PipelineConfig,
    req: &RunRequest,
) -> Result<RunOutcome> {
    let run_id = db::record_run_start(conn, req.season, req.week, req.triggered_by)?;
    let result = with_run_lock(conn, req.season, req.week, cfg.lock_ttl_secs, |conn| {
        execute(conn, source, cfg, req)
    });

    let recorded = match &result {
        Ok(outcome) => db::record_run_finish(conn, run_id, "published", Some(outcome.snapshot_id), &[]),
        Err(err) => {
            let (label, errors) = match PipelineError::from_anyhow(err) {
                Some(PipelineError::Validation { errors, .. }) => {
                    ("validation_failed", errors.clone())
                }
                Some(PipelineError::RunInProgress { .. }) => ("locked", vec![err.to_string()]),
                _ => ("error", vec![format!("{err:#}")]),
            };
            db::record_run_finish(conn, run_id, label, None, &errors)
        }
    };
    if let Err(err) = recorded {
        log::warn!("could not record pipeline run {run_id}: {err:#}");
    }
    result
}

/// Derives the season rows of an already published snapshot.
///
/// Used when aggregation failed after the publish committed. Errors if the
/// snapshot is unknown or already has season rows.
pub fn reaggregate(
    conn: &mut Connection,
    cfg: &PipelineConfig,
    snapshot_id: i64,
) -> Result<AggregateReport> {
    let meta = query::snapshot_meta_by_id(conn, snapshot_id)?
        .ok_or_else(|| anyhow!("snapshot {snapshot_id} does not exist"))?;
    log::warn!(
        "re-deriving season rows for snapshot {snapshot_id} (season {} week {})",
        meta.season,
        meta.week
    );
    with_run_lock(conn, meta.season, meta.week, cfg.lock_ttl_secs, |conn| {
        aggregate::aggregate_season(
            conn,
            snapshot_id,
            meta.season,
            meta.week,
            cfg.rate_averaging,
            cfg.batch_size,
        )
    })
}

fn execute(
    conn: &mut Connection,
    source: &dyn RawStatSource,
    cfg: &PipelineConfig,
    req: &RunRequest,
) -> Result<RunOutcome> {
    let (season, week) = (req.season, req.week);
    let staging = staging::load_staging(conn, source, season, week, cfg.batch_size)?;

    let validation = validate::validate_staging(
        conn,
        season,
        week,
        Thresholds {
            min_rows: cfg.min_rows,
            min_teams: cfg.min_teams,
        },
    )?;
    if !validation.passed() {
        return Err(PipelineError::Validation {
            season,
            week,
            errors: validation.errors,
        }
        .into());
    }

    let data_version = req.resolved_data_version();
    let publish = publish::publish_snapshot(
        conn,
        &PublishRequest {
            season,
            week,
            data_version: &data_version,
            triggered_by: req.triggered_by,
            official: req.official,
            validation: &validation,
        },
        cfg.batch_size,
    )?;

    let aggregate = aggregate::aggregate_season(
        conn,
        publish.snapshot_id,
        season,
        week,
        cfg.rate_averaging,
        cfg.batch_size,
    )?;

    Ok(RunOutcome {
        snapshot_id: publish.snapshot_id,
        data_version,
        staging,
        validation,
        publish,
        aggregate,
    })
}
