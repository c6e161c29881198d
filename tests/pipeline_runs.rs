mod common;

use common::{SEASON, config, fake, lenient_config, week_of, Line};
use weekly_snapshots::db;
use weekly_snapshots::error::PipelineError;
use weekly_snapshots::lock;
use weekly_snapshots::model::TriggeredBy;
use weekly_snapshots::pipeline::{self, RunRequest};
use weekly_snapshots::query;
use weekly_snapshots::source::MemorySource;
use weekly_snapshots::staging;

fn count(conn: &rusqlite::Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn full_week_publishes_snapshot_and_season_rows() {
    let mut conn = db::open_in_memory().unwrap();
    let source = fake(1, 30, 250);
    let cfg = config();

    let mut req = RunRequest::new(SEASON, 1, TriggeredBy::Admin);
    req.data_version = Some("feed-2025w01".to_string());
    let outcome = pipeline::run_week(&mut conn, &source, &cfg, &req).unwrap();

    assert_eq!(outcome.staging.staged_rows, 250);
    assert_eq!(outcome.validation.row_count, 250);
    assert_eq!(outcome.validation.team_count, 30);
    assert_eq!(outcome.publish.rows_published, 250);
    assert_eq!(outcome.publish.integrity.total_nulls(), 0);
    assert_eq!(outcome.aggregate.players_written, 250);

    let meta = query::snapshot_meta_by_id(&conn, outcome.snapshot_id)
        .unwrap()
        .unwrap();
    assert_eq!(meta.data_version, "feed-2025w01");
    assert!(meta.is_official);
    assert!(meta.validation_passed);
    assert_eq!(meta.row_count, 250);
    assert_eq!(meta.content_hash.len(), 64);

    let week_rows = count(
        &conn,
        &format!(
            "SELECT COUNT(*) FROM player_week WHERE snapshot_id = {}",
            outcome.snapshot_id
        ),
    );
    assert_eq!(week_rows, 250);
    let outcome_label: String = conn
        .query_row("SELECT outcome FROM pipeline_runs ORDER BY run_id DESC LIMIT 1", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(outcome_label, "published");
}

#[test]
fn short_week_fails_validation_and_publishes_nothing() {
    let mut conn = db::open_in_memory().unwrap();
    let source = fake(1, 32, 180);

    let err = pipeline::run_week(
        &mut conn,
        &source,
        &config(),
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap_err();

    let Some(PipelineError::Validation { errors, .. }) = PipelineError::from_anyhow(&err) else {
        panic!("expected validation failure, got {err:#}");
    };
    assert!(errors.iter().any(|e| e.contains("200")));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM snapshot_meta"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM player_week"), 0);
    // Staged rows are left for inspection.
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM staging_player_week"), 180);
    assert_eq!(
        count(
            &conn,
            "SELECT COUNT(*) FROM pipeline_runs WHERE outcome = 'validation_failed'"
        ),
        1
    );
}

#[test]
fn null_player_identifier_blocks_publish() {
    let mut conn = db::open_in_memory().unwrap();
    let mut source = fake(1, 32, 200);
    if let Some(week) = source.week_mut(SEASON, 1) {
        week.stats[0].player_key = None;
    }

    let err = pipeline::run_week(
        &mut conn,
        &source,
        &config(),
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap_err();
    let Some(PipelineError::Validation { errors, .. }) = PipelineError::from_anyhow(&err) else {
        panic!("expected validation failure");
    };
    assert_eq!(*errors, vec!["1 rows are missing a player identifier".to_string()]);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM snapshot_meta"), 0);
}

#[test]
fn exactly_minimum_rows_passes() {
    let mut conn = db::open_in_memory().unwrap();
    let source = fake(1, 28, 200);
    let outcome = pipeline::run_week(
        &mut conn,
        &source,
        &config(),
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap();
    assert!(outcome.validation.passed());
    assert_eq!(outcome.validation.team_count, 28);
}

#[test]
fn snapshot_ids_increase_and_old_rows_stay_put() {
    let mut conn = db::open_in_memory().unwrap();
    let cfg = lenient_config();
    let mut source = MemorySource::new();
    source.insert_week(SEASON, 1, week_of(&[Line::new("p1", "Alpha One", "KC")]));

    let first = pipeline::run_week(
        &mut conn,
        &source,
        &cfg,
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap();
    let before = query::snapshot_rows(&conn, first.snapshot_id).unwrap();

    // Upstream corrects the week; a re-run stages new numbers.
    let mut corrected = Line::new("p1", "Alpha One", "KC");
    corrected.ppr = 30.0;
    source.insert_week(SEASON, 1, week_of(&[corrected]));
    let second = pipeline::run_week(
        &mut conn,
        &source,
        &cfg,
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap();

    assert!(second.snapshot_id > first.snapshot_id);
    assert_ne!(first.publish.content_hash, second.publish.content_hash);
    assert_eq!(query::snapshot_rows(&conn, first.snapshot_id).unwrap(), before);
    let latest = query::latest_official_snapshot(&conn, SEASON, 1)
        .unwrap()
        .unwrap();
    assert_eq!(latest.id, second.snapshot_id);
}

#[test]
fn published_tables_reject_update_and_delete() {
    let mut conn = db::open_in_memory().unwrap();
    let mut source = MemorySource::new();
    source.insert_week(SEASON, 1, week_of(&[Line::new("p1", "Alpha One", "KC")]));
    pipeline::run_week(
        &mut conn,
        &source,
        &lenient_config(),
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap();

    for sql in [
        "UPDATE snapshot_meta SET data_version = 'x'",
        "DELETE FROM snapshot_meta",
        "UPDATE player_week SET snaps = 0",
        "DELETE FROM player_week",
        "UPDATE player_season SET games_played = 0",
        "DELETE FROM player_season",
    ] {
        assert!(conn.execute(sql, []).is_err(), "{sql} should be rejected");
    }
}

#[test]
fn staging_reload_is_idempotent() {
    let mut conn = db::open_in_memory().unwrap();
    let source = fake(1, 30, 220);
    let first = staging::load_staging(&mut conn, &source, SEASON, 1, 50).unwrap();
    let rows_first = staging::load_staging_rows(&conn, SEASON, 1).unwrap();
    let second = staging::load_staging(&mut conn, &source, SEASON, 1, 50).unwrap();
    let rows_second = staging::load_staging_rows(&conn, SEASON, 1).unwrap();

    assert_eq!(first, second);
    assert_eq!(rows_first.len(), 220);
    assert_eq!(rows_first, rows_second);
}

#[test]
fn held_lock_rejects_second_run() {
    let mut conn = db::open_in_memory().unwrap();
    let source = fake(1, 30, 250);
    let cfg = config();
    let holder = lock::acquire(&conn, SEASON, 1, cfg.lock_ttl_secs).unwrap();

    let err = pipeline::run_week(
        &mut conn,
        &source,
        &cfg,
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap_err();
    assert!(matches!(
        PipelineError::from_anyhow(&err),
        Some(PipelineError::RunInProgress { .. })
    ));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM staging_player_week"), 0);

    lock::release(&conn, SEASON, 1, &holder).unwrap();
    assert!(
        pipeline::run_week(
            &mut conn,
            &source,
            &cfg,
            &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
        )
        .is_ok()
    );
}

#[test]
fn repeated_player_id_fails_validation() {
    let mut conn = db::open_in_memory().unwrap();
    let mut source = MemorySource::new();
    source.insert_week(
        SEASON,
        1,
        week_of(&[Line::new("p1", "Alpha One", "KC"), Line::new("p1", "Alpha One", "KC")]),
    );

    let err = pipeline::run_week(
        &mut conn,
        &source,
        &lenient_config(),
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap_err();
    let Some(PipelineError::Validation { errors, .. }) = PipelineError::from_anyhow(&err) else {
        panic!("expected validation failure, got {err:#}");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("repeat a player identifier"));
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM snapshot_meta"), 0);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM player_season"), 0);
}

#[test]
fn core_metric_nulls_warn_but_keep_the_snapshot() {
    let mut conn = db::open_in_memory().unwrap();
    let mut source = MemorySource::new();
    let mut week = week_of(&[
        Line::new("p1", "Alpha One", "KC"),
        Line::new("p2", "Beta Two", "BUF"),
    ]);
    week.stats[1].fantasy_points_ppr = None;
    week.participation.retain(|p| p.player_name != "Beta Two");
    source.insert_week(SEASON, 1, week);

    let outcome = pipeline::run_week(
        &mut conn,
        &source,
        &lenient_config(),
        &RunRequest::new(SEASON, 1, TriggeredBy::Admin),
    )
    .unwrap();

    let integrity = &outcome.publish.integrity;
    assert!(integrity.checked);
    assert_eq!(integrity.null_counts["fantasy_points_ppr"], 1);
    assert_eq!(integrity.null_counts["snaps"], 1);
    assert_eq!(integrity.null_counts["routes"], 1);
    assert_eq!(integrity.null_counts["targets"], 0);

    let meta = query::snapshot_meta_by_id(&conn, outcome.snapshot_id)
        .unwrap()
        .unwrap();
    assert!(meta.is_official);
    assert_eq!(query::snapshot_rows(&conn, outcome.snapshot_id).unwrap().len(), 2);
}
