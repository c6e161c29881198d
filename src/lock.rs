use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::PipelineError;

/// Runs `f` while holding the `(season, week)` run marker.
///
/// The marker is a row in `pipeline_locks`; a second caller gets
/// `PipelineError::RunInProgress` until the first releases it or the marker is
/// older than `ttl_secs`. Released whether `f` succeeds or fails.
pub fn with_run_lock<T>(
    conn: &mut Connection,
    season: i32,
    week: u32,
    ttl_secs: i64,
    f: impl FnOnce(&mut Connection) -> Result<T>,
) -> Result<T> {
    let holder = acquire(conn, season, week, ttl_secs)?;
    let result = f(conn);
    if let Err(err) = release(conn, season, week, &holder) {
        log::error!("failed to release run lock {season} week {week}: {err:#}");
        if result.is_ok() {
            return Err(err);
        }
    }
    result
}

pub fn acquire(conn: &Connection, season: i32, week: u32, ttl_secs: i64) -> Result<String> {
    let stamp = Utc::now();
    let now = stamp.timestamp();
    let holder = format!(
        "{}-{}",
        std::process::id(),
        stamp.timestamp_nanos_opt().unwrap_or_default()
    );
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO pipeline_locks (season, week, holder, acquired_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![season, week, holder, now],
        )
        .context("insert run lock")?;
    if inserted == 1 {
        log::debug!("acquired run lock {season} week {week} as {holder}");
        return Ok(holder);
    }

    let current = conn
        .query_row(
            "SELECT holder, acquired_at FROM pipeline_locks WHERE season = ?1 AND week = ?2",
            params![season, week],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()
        .context("read run lock")?;
    let Some((current_holder, acquired_at)) = current else {
        // Released between our insert and read; try once more.
        let retried = conn
            .execute(
                "INSERT OR IGNORE INTO pipeline_locks (season, week, holder, acquired_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![season, week, holder, now],
            )
            .context("retry run lock")?;
        if retried == 1 {
            return Ok(holder);
        }
        return Err(PipelineError::RunInProgress {
            season,
            week,
            holder: "unknown".to_string(),
        }
        .into());
    };

    if now - acquired_at >= ttl_secs {
        // Compare-and-swap on the stale holder so two reclaimers cannot both win.
        let swapped = conn
            .execute(
                "UPDATE pipeline_locks SET holder = ?1, acquired_at = ?2
                 WHERE season = ?3 AND week = ?4 AND holder = ?5",
                params![holder, now, season, week, current_holder],
            )
            .context("reclaim stale run lock")?;
        if swapped == 1 {
            log::warn!(
                "reclaimed stale run lock {season} week {week} from {current_holder} (age {}s)",
                now - acquired_at
            );
            return Ok(holder);
        }
    }

    Err(PipelineError::RunInProgress {
        season,
        week,
        holder: current_holder,
    }
    .into())
}

pub fn release(conn: &Connection, season: i32, week: u32, holder: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM pipeline_locks WHERE season = ?1 AND week = ?2 AND holder = ?3",
        params![season, week, holder],
    )
    .context("release run lock")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use anyhow::anyhow;

    #[test]
    fn second_holder_is_rejected_until_release() {
        let conn = db::open_in_memory().unwrap();
        let first = acquire(&conn, 2025, 5, 600).unwrap();
        let err = acquire(&conn, 2025, 5, 600).unwrap_err();
        assert!(matches!(
            PipelineError::from_anyhow(&err),
            Some(PipelineError::RunInProgress { .. })
        ));
        // Other weeks are independent.
        assert!(acquire(&conn, 2025, 6, 600).is_ok());
        release(&conn, 2025, 5, &first).unwrap();
        assert!(acquire(&conn, 2025, 5, 600).is_ok());
    }

    #[test]
    fn stale_marker_is_reclaimed() {
        let conn = db::open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO pipeline_locks (season, week, holder, acquired_at) VALUES (2025, 5, 'crashed', 0)",
            [],
        )
        .unwrap();
        let holder = acquire(&conn, 2025, 5, 60).unwrap();
        assert_ne!(holder, "crashed");
    }

    #[test]
    fn marker_records_current_epoch_seconds() {
        let conn = db::open_in_memory().unwrap();
        let before = Utc::now().timestamp();
        let holder = acquire(&conn, 2025, 7, 60).unwrap();
        let after = Utc::now().timestamp();
        let (stored, acquired_at): (String, i64) = conn
            .query_row(
                "SELECT holder, acquired_at FROM pipeline_locks WHERE season = 2025 AND week = 7",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(stored, holder);
        assert!((before..=after).contains(&acquired_at));
        assert!(holder.starts_with(&format!("{}-", std::process::id())));

        // A marker still inside its TTL is not taken over.
        conn.execute(
            "UPDATE pipeline_locks SET acquired_at = ?1 WHERE season = 2025 AND week = 7",
            params![after - 30],
        )
        .unwrap();
        assert!(acquire(&conn, 2025, 7, 60).is_err());
    }

    #[test]
    fn lock_released_after_failure() {
        let mut conn = db::open_in_memory().unwrap();
        let res: Result<()> = with_run_lock(&mut conn, 2025, 1, 600, |_| Err(anyhow!("boom")));
        assert!(res.is_err());
        let held: i64 = conn
            .query_row("SELECT COUNT(*) FROM pipeline_locks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(held, 0);
    }
}
