use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use weekly_snapshots::config::RateAveraging;
use weekly_snapshots::fake_source::{self, FakeSeason};
use weekly_snapshots::model::PlayerWeekRow;
use weekly_snapshots::source::{MemorySource, RawStatSource};
use weekly_snapshots::{aggregate, db, staging};

const SEASON: i32 = 2025;

fn sample_source(weeks: u32) -> MemorySource {
    fake_source::generate(&FakeSeason {
        season: SEASON,
        weeks,
        teams: 32,
        players: 640,
        seed: 11,
    })
}

fn staged_season(source: &MemorySource, weeks: u32) -> Vec<PlayerWeekRow> {
    let mut out = Vec::new();
    for week in 1..=weeks {
        let stats = source.weekly_stats(SEASON, week).unwrap_or_default();
        let keys = stats
            .iter()
            .filter_map(|s| s.player_key.clone())
            .collect::<Vec<_>>();
        let identities = source.identities(&keys).unwrap_or_default();
        let (rows, _) = staging::build_staging_rows(
            SEASON,
            week,
            &stats,
            &source.participation(SEASON, week).unwrap_or_default(),
            &source.advanced_metrics(SEASON, week).unwrap_or_default(),
            &identities,
        );
        out.extend(rows);
    }
    out
}

fn bench_build_staging_rows(c: &mut Criterion) {
    let source = sample_source(1);
    let stats = source.weekly_stats(SEASON, 1).unwrap_or_default();
    let participation = source.participation(SEASON, 1).unwrap_or_default();
    let advanced = source.advanced_metrics(SEASON, 1).unwrap_or_default();
    let keys = stats
        .iter()
        .filter_map(|s| s.player_key.clone())
        .collect::<Vec<_>>();
    let identities = source.identities(&keys).unwrap_or_default();

    c.bench_function("build_staging_rows_640", |b| {
        b.iter(|| {
            let (rows, report) = staging::build_staging_rows(
                SEASON,
                1,
                black_box(&stats),
                black_box(&participation),
                black_box(&advanced),
                black_box(&identities),
            );
            black_box((rows.len(), report.participation_matched));
        })
    });
}

fn bench_load_staging_sqlite(c: &mut Criterion) {
    let source = sample_source(1);
    let Ok(mut conn) = db::open_in_memory() else {
        return;
    };

    c.bench_function("load_staging_sqlite_640", |b| {
        b.iter(|| {
            let report = staging::load_staging(&mut conn, &source, SEASON, 1, 250);
            black_box(report.map(|r| r.staged_rows).unwrap_or_default());
        })
    });
}

fn bench_fold_season(c: &mut Criterion) {
    let weeks = 17;
    let source = sample_source(weeks);
    let rows = staged_season(&source, weeks);

    for (label, averaging) in [
        ("fold_season_17w_mean", RateAveraging::QualifyingWeekMean),
        ("fold_season_17w_weighted", RateAveraging::VolumeWeighted),
    ] {
        c.bench_function(label, |b| {
            b.iter(|| {
                let out = aggregate::fold_season_rows(1, SEASON, weeks, black_box(&rows), averaging);
                black_box(out.len());
            })
        });
    }
}

criterion_group!(
    benches,
    bench_build_staging_rows,
    bench_load_staging_sqlite,
    bench_fold_season
);
criterion_main!(benches);
