//! Season-to-date aggregation over published weekly rows.
//!
//! Always re-derived from weekly rows, never from an earlier season row.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::config::RateAveraging;
use crate::db::{self, SEASON_COLUMNS, SEASON_TABLE, WEEK_COLUMNS, WEEK_TABLE};
use crate::model::{PlayerSeasonRow, PlayerWeekRow};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub snapshot_id: i64,
    pub season: i32,
    pub through_week: u32,
    pub weekly_rows_read: usize,
    pub players_written: usize,
}

struct RateSpec {
    value: fn(&PlayerWeekRow) -> Option<f64>,
    volume: fn(&PlayerWeekRow) -> f64,
    assign: fn(&mut PlayerSeasonRow, Option<f64>),
}

const RATES: [RateSpec; 10] = [
    RateSpec {
        value: |r| r.snap_share,
        volume: |r| r.snaps.unwrap_or(0) as f64,
        assign: |s, v| s.snap_share = v,
    },
    RateSpec {
        value: |r| r.route_participation,
        volume: |r| r.routes.unwrap_or(0) as f64,
        assign: |s, v| s.route_participation = v,
    },
    RateSpec {
        value: |r| r.target_share,
        volume: |r| r.routes.unwrap_or(0) as f64,
        assign: |s, v| s.target_share = v,
    },
    RateSpec {
        value: |r| r.tprr,
        volume: |r| r.routes.unwrap_or(0) as f64,
        assign: |s, v| s.tprr = v,
    },
    RateSpec {
        value: |r| r.yprr,
        volume: |r| r.routes.unwrap_or(0) as f64,
        assign: |s, v| s.yprr = v,
    },
    RateSpec {
        value: |r| r.yards_per_carry,
        volume: |r| r.rush_attempts.unwrap_or(0) as f64,
        assign: |s, v| s.yards_per_carry = v,
    },
    RateSpec {
        value: |r| r.epa_per_play,
        volume: |r| (r.targets.unwrap_or(0) + r.rush_attempts.unwrap_or(0)) as f64,
        assign: |s, v| s.epa_per_play = v,
    },
    RateSpec {
        value: |r| r.success_rate,
        volume: |r| (r.targets.unwrap_or(0) + r.rush_attempts.unwrap_or(0)) as f64,
        assign: |s, v| s.success_rate = v,
    },
    RateSpec {
        value: |r| r.adot,
        volume: |r| r.targets.unwrap_or(0) as f64,
        assign: |s, v| s.adot = v,
    },
    RateSpec {
        value: |r| r.yac_per_reception,
        volume: |r| r.receptions.unwrap_or(0) as f64,
        assign: |s, v| s.yac_per_reception = v,
    },
];

/// Derives one season row per player for `snapshot_id` and writes them.
///
/// Each week up to `through_week` contributes the rows of its newest official,
/// validated snapshot no newer than `snapshot_id`; the snapshot's own week always
/// uses `snapshot_id`, official or not.
pub fn aggregate_season(
    conn: &mut Connection,
    snapshot_id: i64,
    season: i32,
    through_week: u32,
    averaging: RateAveraging,
    batch_size: usize,
) -> Result<AggregateReport> {
    let existing = season_row_count(conn, snapshot_id)?;
    if existing > 0 {
        return Err(anyhow!(
            "season rows already derived for snapshot {snapshot_id} ({existing} rows)"
        ));
    }
    let snapshot_season: Option<i32> = conn
        .query_row(
            "SELECT season FROM snapshot_meta WHERE id = ?1",
            params![snapshot_id],
            |row| row.get(0),
        )
        .optional()
        .context("look up snapshot season")?;
    match snapshot_season {
        None => return Err(anyhow!("snapshot {snapshot_id} does not exist")),
        Some(s) if s != season => {
            return Err(anyhow!(
                "snapshot {snapshot_id} belongs to season {s}, not {season}"
            ));
        }
        Some(_) => {}
    }

    let weekly = load_season_source_rows(conn, snapshot_id, season, through_week)?;
    let rows = fold_season_rows(snapshot_id, season, through_week, &weekly, averaging);

    let values = rows.iter().map(db::season_row_values).collect::<Vec<_>>();
    let tx = conn.transaction().context("begin season aggregate transaction")?;
    let players_written =
        db::insert_batched(&tx, SEASON_TABLE, &SEASON_COLUMNS, &values, batch_size)?;
    tx.commit().context("commit season aggregate transaction")?;

    log::info!(
        "aggregated snapshot {snapshot_id}: season {season} through week {through_week} weekly_rows={} players={players_written} averaging={}",
        weekly.len(),
        averaging.as_str(),
    );

    Ok(AggregateReport {
        snapshot_id,
        season,
        through_week,
        weekly_rows_read: weekly.len(),
        players_written,
    })
}

pub fn season_row_count(conn: &Connection, snapshot_id: i64) -> Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {SEASON_TABLE} WHERE snapshot_id = ?1"),
        params![snapshot_id],
        |row| row.get(0),
    )
    .context("count existing season rows")
}

/// True when the snapshot has published weekly rows but no derived season rows,
/// which happens when aggregation failed after the publish committed.
pub fn missing_season_rows(conn: &Connection, snapshot_id: i64) -> Result<bool> {
    conn.query_row(
        &format!(
            "SELECT EXISTS (SELECT 1 FROM {WEEK_TABLE} WHERE snapshot_id = ?1)
                AND NOT EXISTS (SELECT 1 FROM {SEASON_TABLE} WHERE snapshot_id = ?1)"
        ),
        params![snapshot_id],
        |row| row.get::<_, bool>(0),
    )
    .context("check for missing season rows")
}

pub fn load_season_source_rows(
    conn: &Connection,
    snapshot_id: i64,
    season: i32,
    through_week: u32,
) -> Result<Vec<PlayerWeekRow>> {
    let columns = WEEK_COLUMNS
        .iter()
        .map(|c| format!("pw.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        r#"
        WITH chosen AS (
            SELECT week, MAX(id) AS snapshot_id
            FROM snapshot_meta
            WHERE season = ?1
              AND week <= ?2
              AND validation_passed = 1
              AND id <= ?3
              AND (is_official = 1 OR id = ?3)
              AND week <> (SELECT week FROM snapshot_meta WHERE id = ?3)
            GROUP BY week
            UNION ALL
            SELECT week, id FROM snapshot_meta WHERE id = ?3 AND season = ?1 AND week <= ?2
        )
        SELECT {columns}
        FROM {WEEK_TABLE} pw
        JOIN chosen ON pw.snapshot_id = chosen.snapshot_id
        WHERE pw.player_id IS NOT NULL
        ORDER BY pw.week ASC, pw.player_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql).context("prepare season source query")?;
    let rows = stmt
        .query_map(params![season, through_week, snapshot_id], |row| {
            db::week_row_from_sql(row, 0)
        })
        .context("query season source rows")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode weekly row")?);
    }
    Ok(out)
}

/// Groups weekly rows by player and folds them. Rows without a player id are
/// skipped. Output is sorted by player id.
pub fn fold_season_rows(
    snapshot_id: i64,
    season: i32,
    through_week: u32,
    weekly: &[PlayerWeekRow],
    averaging: RateAveraging,
) -> Vec<PlayerSeasonRow> {
    let mut groups: HashMap<&str, Vec<&PlayerWeekRow>> = HashMap::new();
    for row in weekly {
        if row.season != season || row.week > through_week {
            continue;
        }
        let Some(player_id) = row.player_id.as_deref() else {
            continue;
        };
        groups.entry(player_id).or_default().push(row);
    }

    let mut out = groups
        .into_par_iter()
        .map(|(player_id, mut weeks)| {
            weeks.sort_by_key(|r| r.week);
            fold_player(snapshot_id, season, through_week, player_id, &weeks, averaging)
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| a.player_id.cmp(&b.player_id));
    out
}

fn fold_player(
    snapshot_id: i64,
    season: i32,
    through_week: u32,
    player_id: &str,
    weeks: &[&PlayerWeekRow],
    averaging: RateAveraging,
) -> PlayerSeasonRow {
    // Identity fields follow the most recent week.
    let latest = weeks.last().copied();
    let mut out = PlayerSeasonRow {
        snapshot_id,
        season,
        through_week,
        player_id: player_id.to_string(),
        player_name: latest.map(|r| r.player_name.clone()).unwrap_or_default(),
        team: latest.and_then(|r| r.team.clone()),
        position: latest.and_then(|r| r.position.clone()),
        ..Default::default()
    };

    for row in weeks {
        if row.participated() {
            out.games_played += 1;
        }
        out.snaps += row.snaps.unwrap_or(0);
        out.routes += row.routes.unwrap_or(0);
        out.targets += row.targets.unwrap_or(0);
        out.receptions += row.receptions.unwrap_or(0);
        out.receiving_yards += row.receiving_yards.unwrap_or(0.0);
        out.receiving_tds += row.receiving_tds.unwrap_or(0);
        out.air_yards += row.air_yards.unwrap_or(0.0);
        out.rush_attempts += row.rush_attempts.unwrap_or(0);
        out.rushing_yards += row.rushing_yards.unwrap_or(0.0);
        out.rushing_tds += row.rushing_tds.unwrap_or(0);
        out.fantasy_points_std += row.fantasy_points_std.unwrap_or(0.0);
        out.fantasy_points_half += row.fantasy_points_half.unwrap_or(0.0);
        out.fantasy_points_ppr += row.fantasy_points_ppr.unwrap_or(0.0);
    }
    out.fantasy_points_ppr_per_game =
        (out.games_played > 0).then(|| out.fantasy_points_ppr / out.games_played as f64);

    for rate in &RATES {
        let samples = weeks
            .iter()
            .copied()
            .filter_map(|row| {
                let volume = (rate.volume)(row);
                let value = (rate.value)(row)?;
                (volume > 0.0 && value.is_finite()).then_some((value, volume))
            })
            .collect::<Vec<_>>();
        (rate.assign)(&mut out, average(&samples, averaging));
    }
    out
}

/// `samples` are `(value, volume)` pairs from qualifying weeks.
pub fn average(samples: &[(f64, f64)], averaging: RateAveraging) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    match averaging {
        RateAveraging::QualifyingWeekMean => {
            Some(samples.iter().map(|(v, _)| v).sum::<f64>() / samples.len() as f64)
        }
        RateAveraging::VolumeWeighted => {
            let total_volume = samples.iter().map(|(_, w)| w).sum::<f64>();
            if total_volume <= 0.0 {
                return None;
            }
            Some(samples.iter().map(|(v, w)| v * w).sum::<f64>() / total_volume)
        }
    }
}
