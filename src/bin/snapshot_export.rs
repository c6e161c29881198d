use std::path::PathBuf;

use anyhow::{Context, Result};

use weekly_snapshots::cli;
use weekly_snapshots::config;
use weekly_snapshots::export;
use weekly_snapshots::query;

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = cli::load_config(&args)?;
    let conn = cli::open_snapshot_db(&cfg)?;

    let snapshot_id = match cli::parsed_arg::<i64>(&args, "snapshot")? {
        Some(id) => id,
        None => {
            query::current_snapshot_meta(&conn)?
                .context("no official snapshot published yet; pass --snapshot")?
                .id
        }
    };
    let out = cli::arg_value(&args, "out")
        .map(PathBuf::from)
        .or_else(|| config::app_cache_dir().map(|dir| dir.join(format!("snapshot-{snapshot_id}.xlsx"))))
        .context("unable to resolve output path; pass --out")?;

    let report = export::export_snapshot_xlsx(&conn, snapshot_id, &out)?;
    println!("Export complete: {}", out.display());
    println!("Snapshot: {}", report.snapshot_id);
    println!("Week rows: {}", report.week_rows);
    println!("Season rows: {}", report.season_rows);
    Ok(())
}
