use anyhow::{Context, Result};

use weekly_snapshots::cli;
use weekly_snapshots::config;
use weekly_snapshots::db;
use weekly_snapshots::fake_source::{self, FakeSeason};
use weekly_snapshots::source;

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = cli::load_config(&args)?;
    let defaults = FakeSeason::default();
    let params = FakeSeason {
        season: cli::parsed_arg(&args, "season")?.unwrap_or(defaults.season),
        weeks: cli::parsed_arg(&args, "weeks")?.unwrap_or(defaults.weeks),
        teams: cli::parsed_arg(&args, "teams")?.unwrap_or(defaults.teams),
        players: cli::parsed_arg(&args, "players")?.unwrap_or(defaults.players),
        seed: cli::parsed_arg(&args, "seed")?.unwrap_or(defaults.seed),
    };

    let raw_path = cfg
        .resolved_raw_db_path()
        .context("unable to resolve raw source path")?;
    let mut conn = db::open_db(&raw_path)?;
    let fake = fake_source::generate(&params);

    let identities = source::write_identities(&mut conn, fake.all_identities())?;
    let mut rows = 0usize;
    for ((season, week), data) in fake.weeks() {
        source::write_raw_week(&mut conn, *season, *week, data)?;
        rows += data.stats.len();
    }

    println!("Raw seed complete");
    println!("DB: {}", raw_path.display());
    println!("Season {} weeks 1..={}", params.season, params.weeks);
    println!("Identities: {identities}");
    println!("Weekly stat rows: {rows}");
    Ok(())
}
