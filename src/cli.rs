//! Shared plumbing for the `src/bin` entry points.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;

use crate::config::PipelineConfig;
use crate::db;
use crate::source::SqliteRawSource;

/// Value of `--name value` or `--name=value`; blank values are ignored.
pub fn arg_value(args: &[String], name: &str) -> Option<String> {
    let flag = format!("--{name}");
    let inline = format!("--{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&inline) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if *arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() && !next.starts_with("--") {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    let flag = format!("--{name}");
    args.iter().any(|a| *a == flag)
}

pub fn parsed_arg<T: FromStr>(args: &[String], name: &str) -> Result<Option<T>> {
    match arg_value(args, name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("invalid value {raw:?} for --{name}")),
        None => Ok(None),
    }
}

pub fn required_arg<T: FromStr>(args: &[String], name: &str) -> Result<T> {
    parsed_arg(args, name)?.ok_or_else(|| anyhow!("missing required argument --{name}"))
}

/// Loads config from the environment, then applies `--db` / `--raw-db`.
pub fn load_config(args: &[String]) -> Result<PipelineConfig> {
    let mut cfg = PipelineConfig::from_env()?;
    if let Some(path) = arg_value(args, "db") {
        cfg.db_path = Some(PathBuf::from(path));
    }
    if let Some(path) = arg_value(args, "raw-db") {
        cfg.raw_db_path = Some(PathBuf::from(path));
    }
    Ok(cfg)
}

pub fn open_snapshot_db(cfg: &PipelineConfig) -> Result<Connection> {
    let path = cfg
        .db_path
        .as_deref()
        .context("unable to resolve sqlite path (set SNAPSHOT_DB_PATH or --db)")?;
    db::open_db(path)
}

pub fn open_raw_source(cfg: &PipelineConfig) -> Result<SqliteRawSource> {
    let path = cfg
        .resolved_raw_db_path()
        .context("unable to resolve raw source path (set SNAPSHOT_RAW_DB_PATH or --raw-db)")?;
    SqliteRawSource::open(&path)
}
