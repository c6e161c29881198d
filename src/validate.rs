use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::db::STAGING_TABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub min_rows: i64,
    pub min_teams: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub season: i32,
    pub week: u32,
    pub row_count: i64,
    pub team_count: i64,
    pub null_player_ids: i64,
    pub duplicate_player_ids: i64,
    pub errors: Vec<String>,
}

/// Raw counts read from staging for one season/week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingFigures {
    pub row_count: i64,
    pub team_count: i64,
    pub null_player_ids: i64,
    /// Rows beyond the first for each repeated player id.
    pub duplicate_player_ids: i64,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Gates staged rows for `season`/`week`. Failures come back as messages in
/// the result; only storage problems are returned as `Err`.
pub fn validate_staging(
    conn: &Connection,
    season: i32,
    week: u32,
    thresholds: Thresholds,
) -> Result<ValidationResult> {
    let figures = conn
        .query_row(
            &format!(
                "SELECT COUNT(*),
                        COUNT(DISTINCT team),
                        COALESCE(SUM(CASE WHEN player_id IS NULL OR TRIM(player_id) = '' THEN 1 ELSE 0 END), 0),
                        COUNT(player_id) - COUNT(DISTINCT player_id)
                 FROM {STAGING_TABLE}
                 WHERE season = ?1 AND week = ?2"
            ),
            params![season, week],
            |row| {
                Ok(StagingFigures {
                    row_count: row.get(0)?,
                    team_count: row.get(1)?,
                    null_player_ids: row.get(2)?,
                    duplicate_player_ids: row.get(3)?,
                })
            },
        )
        .context("query staging validation figures")?;

    let result = evaluate(season, week, figures, thresholds);
    if result.passed() {
        log::info!(
            "validation {season} week {week} passed: rows={} teams={}",
            figures.row_count,
            figures.team_count
        );
    } else {
        log::error!(
            "validation {season} week {week} failed: {}",
            result.errors.join("; ")
        );
    }
    Ok(result)
}

pub fn evaluate(
    season: i32,
    week: u32,
    figures: StagingFigures,
    thresholds: Thresholds,
) -> ValidationResult {
    let StagingFigures {
        row_count,
        team_count,
        null_player_ids,
        duplicate_player_ids,
    } = figures;
    let mut errors = Vec::new();
    if row_count < thresholds.min_rows {
        errors.push(format!(
            "row count {row_count} is below the minimum of {}",
            thresholds.min_rows
        ));
    }
    if team_count < thresholds.min_teams {
        errors.push(format!(
            "distinct team count {team_count} is below the minimum of {}",
            thresholds.min_teams
        ));
    }
    if null_player_ids > 0 {
        errors.push(format!(
            "{null_player_ids} rows are missing a player identifier"
        ));
    }
    if duplicate_player_ids > 0 {
        errors.push(format!(
            "{duplicate_player_ids} rows repeat a player identifier already staged for the week"
        ));
    }
    ValidationResult {
        season,
        week,
        row_count,
        team_count,
        null_player_ids,
        duplicate_player_ids,
        errors,
    }
}
