use anyhow::Result;

use weekly_snapshots::cli;
use weekly_snapshots::config;
use weekly_snapshots::error::PipelineError;
use weekly_snapshots::model::TriggeredBy;
use weekly_snapshots::pipeline::{self, RunRequest};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = cli::load_config(&args)?;

    if let Some(snapshot_id) = cli::parsed_arg::<i64>(&args, "reaggregate")? {
        let mut conn = cli::open_snapshot_db(&cfg)?;
        let report = pipeline::reaggregate(&mut conn, &cfg, snapshot_id)?;
        println!(
            "Snapshot {snapshot_id}: {} season rows through week {} ({} weekly rows read)",
            report.players_written, report.through_week, report.weekly_rows_read
        );
        return Ok(());
    }

    let season: i32 = cli::required_arg(&args, "season")?;
    let week: u32 = cli::required_arg(&args, "week")?;
    let triggered_by = cli::parsed_arg::<TriggeredBy>(&args, "triggered-by")?.unwrap_or(TriggeredBy::Admin);

    let mut req = RunRequest::new(season, week, triggered_by);
    req.data_version = cli::arg_value(&args, "data-version");
    req.official = !cli::has_flag(&args, "unofficial");

    let mut conn = cli::open_snapshot_db(&cfg)?;
    let source = cli::open_raw_source(&cfg)?;

    match pipeline::run_week(&mut conn, &source, &cfg, &req) {
        Ok(outcome) => {
            println!("Snapshot {} published", outcome.snapshot_id);
            println!("Season {season} week {week} ({})", outcome.data_version);
            println!(
                "Rows: staged={} published={} season_rows={}",
                outcome.staging.staged_rows,
                outcome.publish.rows_published,
                outcome.aggregate.players_written
            );
            println!("Teams: {}", outcome.validation.team_count);
            println!("Content hash: {}", outcome.publish.content_hash);
            if outcome.publish.integrity.total_nulls() > 0 {
                println!("Integrity warnings:");
                for (metric, nulls) in &outcome.publish.integrity.null_counts {
                    if *nulls > 0 {
                        println!("  {metric}: {nulls} null");
                    }
                }
            }
            Ok(())
        }
        Err(err) => {
            if let Some(PipelineError::Validation { errors, .. }) = PipelineError::from_anyhow(&err) {
                eprintln!("Validation failed for season {season} week {week}:");
                for reason in errors {
                    eprintln!("  - {reason}");
                }
            }
            Err(err)
        }
    }
}
