use std::collections::HashMap;

use anyhow::{Result, anyhow};
use serde_json::json;

use weekly_snapshots::api;
use weekly_snapshots::cli;
use weekly_snapshots::config;

/// `snapshot_api GET /player-week season=2025 week=3 team=KC`
/// `snapshot_api POST /admin-run --body '{"season":2025,"week":3}'`
fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = cli::load_config(&args)?;
    let body = cli::arg_value(&args, "body");

    let mut positional = Vec::new();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if let Some(flag) = arg.strip_prefix("--") {
            skip_next = !flag.contains('=');
            continue;
        }
        positional.push(arg.as_str());
    }
    let [method, path, rest @ ..] = positional.as_slice() else {
        return Err(anyhow!("usage: snapshot_api <METHOD> <PATH> [key=value ...] [--body JSON]"));
    };
    let query = rest
        .iter()
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();

    let mut conn = cli::open_snapshot_db(&cfg)?;
    let source = cli::open_raw_source(&cfg)?;
    let resp = api::dispatch(&mut conn, &source, &cfg, method, path, &query, body.as_deref());

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "status": resp.status, "body": resp.body }))?
    );
    if resp.status >= 400 {
        std::process::exit(1);
    }
    Ok(())
}
