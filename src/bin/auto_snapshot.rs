use anyhow::Result;
use chrono::{Datelike, Utc};

use weekly_snapshots::cli;
use weekly_snapshots::config;
use weekly_snapshots::scheduler::{self, SchedulerOutcome};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = cli::load_config(&args)?;
    let season = cli::parsed_arg::<i32>(&args, "season")?
        .or_else(|| std::env::var("SNAPSHOT_SEASON").ok()?.trim().parse().ok())
        .unwrap_or_else(|| Utc::now().year());

    let mut conn = cli::open_snapshot_db(&cfg)?;
    let source = cli::open_raw_source(&cfg)?;

    match scheduler::auto_snapshot(&mut conn, &source, &cfg, season)? {
        SchedulerOutcome::UpToDate {
            latest_official_week,
            latest_raw_week,
            ..
        } => {
            println!(
                "Season {season} already up to date (official week {}, raw week {latest_raw_week})",
                latest_official_week.map(|w| w.to_string()).unwrap_or_else(|| "none".into())
            );
        }
        SchedulerOutcome::Published { week, outcome, .. } => {
            println!(
                "Season {season} week {week} published as snapshot {} ({} rows)",
                outcome.snapshot_id, outcome.publish.rows_published
            );
        }
        SchedulerOutcome::Reaggregated {
            week,
            snapshot_id,
            report,
            ..
        } => {
            println!(
                "Season {season} week {week}: derived {} season rows for snapshot {snapshot_id}",
                report.players_written
            );
        }
    }
    Ok(())
}
