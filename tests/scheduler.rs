mod common;

use common::{SEASON, config, fake};
use weekly_snapshots::db;
use weekly_snapshots::pipeline;
use weekly_snapshots::publish::{self, PublishRequest};
use weekly_snapshots::error::PipelineError;
use weekly_snapshots::model::TriggeredBy;
use weekly_snapshots::query;
use weekly_snapshots::scheduler::{self, SchedulerOutcome};
use weekly_snapshots::source::MemorySource;
use weekly_snapshots::staging;
use weekly_snapshots::validate::{self, Thresholds};

#[test]
fn publishes_latest_raw_week_then_goes_quiet() {
    let mut conn = db::open_in_memory().unwrap();
    let source = fake(3, 30, 240);
    let cfg = config();

    let first = scheduler::auto_snapshot(&mut conn, &source, &cfg, SEASON).unwrap();
    let SchedulerOutcome::Published { week, outcome, .. } = first else {
        panic!("expected a publish, got {first:?}");
    };
    assert_eq!(week, 3);
    let meta = query::snapshot_meta_by_id(&conn, outcome.snapshot_id)
        .unwrap()
        .unwrap();
    assert_eq!(meta.triggered_by, TriggeredBy::Auto);
    assert_eq!(scheduler::latest_official_week(&conn, SEASON).unwrap(), Some(3));

    let second = scheduler::auto_snapshot(&mut conn, &source, &cfg, SEASON).unwrap();
    let third = scheduler::auto_snapshot(&mut conn, &source, &cfg, SEASON).unwrap();
    assert_eq!(second, third);
    assert_eq!(
        second,
        SchedulerOutcome::UpToDate {
            season: SEASON,
            latest_official_week: Some(3),
            latest_raw_week: 3,
        }
    );

    let snapshots: i64 = conn
        .query_row("SELECT COUNT(*) FROM snapshot_meta", [], |r| r.get(0))
        .unwrap();
    assert_eq!(snapshots, 1);
}

#[test]
fn new_raw_week_triggers_one_more_snapshot() {
    let mut conn = db::open_in_memory().unwrap();
    let full = fake(2, 30, 240);
    let mut source = MemorySource::new();
    if let Some(week) = full.week(SEASON, 1) {
        source.insert_week(SEASON, 1, week.clone());
    }
    let cfg = config();

    scheduler::auto_snapshot(&mut conn, &source, &cfg, SEASON).unwrap();
    assert_eq!(scheduler::latest_official_week(&conn, SEASON).unwrap(), Some(1));

    if let Some(week) = full.week(SEASON, 2) {
        source.insert_week(SEASON, 2, week.clone());
    }
    let outcome = scheduler::auto_snapshot(&mut conn, &source, &cfg, SEASON).unwrap();
    assert!(matches!(outcome, SchedulerOutcome::Published { week: 2, .. }));
    assert_eq!(scheduler::latest_official_week(&conn, SEASON).unwrap(), Some(2));
}

#[test]
fn empty_season_is_a_configuration_error() {
    let mut conn = db::open_in_memory().unwrap();
    let source = MemorySource::new();
    let err = scheduler::auto_snapshot(&mut conn, &source, &config(), SEASON).unwrap_err();
    assert!(matches!(
        PipelineError::from_anyhow(&err),
        Some(PipelineError::NoRawData { season: SEASON })
    ));
}

#[test]
fn failing_candidate_week_surfaces_reasons() {
    let mut conn = db::open_in_memory().unwrap();
    let source = fake(1, 10, 120);
    let err = scheduler::auto_snapshot(&mut conn, &source, &config(), SEASON).unwrap_err();
    let Some(PipelineError::Validation { errors, .. }) = PipelineError::from_anyhow(&err) else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.len(), 2);
    assert_eq!(scheduler::latest_official_week(&conn, SEASON).unwrap(), None);
}

#[test]
fn snapshot_without_season_rows_is_rederived_once() {
    let mut conn = db::open_in_memory().unwrap();
    let source = fake(1, 30, 240);
    let cfg = config();

    // Publish without aggregating, as if the season fold failed after commit.
    staging::load_staging(&mut conn, &source, SEASON, 1, cfg.batch_size).unwrap();
    let validation = validate::validate_staging(
        &conn,
        SEASON,
        1,
        Thresholds {
            min_rows: cfg.min_rows,
            min_teams: cfg.min_teams,
        },
    )
    .unwrap();
    let published = publish::publish_snapshot(
        &mut conn,
        &PublishRequest {
            season: SEASON,
            week: 1,
            data_version: "feed-w01",
            triggered_by: TriggeredBy::Admin,
            official: true,
            validation: &validation,
        },
        cfg.batch_size,
    )
    .unwrap();
    assert!(query::season_rows(&conn, published.snapshot_id).unwrap().is_empty());

    let outcome = scheduler::auto_snapshot(&mut conn, &source, &cfg, SEASON).unwrap();
    let SchedulerOutcome::Reaggregated {
        week,
        snapshot_id,
        report,
        ..
    } = outcome
    else {
        panic!("expected season rows to be re-derived, got {outcome:?}");
    };
    assert_eq!(week, 1);
    assert_eq!(snapshot_id, published.snapshot_id);
    assert_eq!(report.players_written, 240);
    assert_eq!(query::season_rows(&conn, snapshot_id).unwrap().len(), 240);

    let again = scheduler::auto_snapshot(&mut conn, &source, &cfg, SEASON).unwrap();
    assert!(matches!(again, SchedulerOutcome::UpToDate { .. }));
    assert!(pipeline::reaggregate(&mut conn, &cfg, snapshot_id).is_err());
    assert!(pipeline::reaggregate(&mut conn, &cfg, 999).is_err());
}
