use std::env;
use std::path::PathBuf;

use anyhow::{Result, anyhow};

const CACHE_DIR: &str = "weekly_snapshots";
const DB_FILE: &str = "snapshots.sqlite";

pub const DEFAULT_MIN_ROWS: i64 = 200;
pub const DEFAULT_MIN_TEAMS: i64 = 28;
pub const DEFAULT_BATCH_SIZE: usize = 250;
pub const DEFAULT_LOCK_TTL_SECS: i64 = 30 * 60;

/// How season rate metrics are folded from weekly samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateAveraging {
    /// Unweighted mean of the weekly values, restricted to weeks where the
    /// rate's volume was non-zero.
    #[default]
    QualifyingWeekMean,
    /// Mean of the weekly values weighted by the rate's volume.
    VolumeWeighted,
}

impl RateAveraging {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "qualifying_mean" | "qualifying_week_mean" | "mean" => Some(Self::QualifyingWeekMean),
            "volume_weighted" | "weighted" => Some(Self::VolumeWeighted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::QualifyingWeekMean => "qualifying_mean",
            Self::VolumeWeighted => "volume_weighted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub db_path: Option<PathBuf>,
    pub raw_db_path: Option<PathBuf>,
    pub min_rows: i64,
    pub min_teams: i64,
    pub batch_size: usize,
    pub rate_averaging: RateAveraging,
    pub lock_ttl_secs: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            raw_db_path: None,
            min_rows: DEFAULT_MIN_ROWS,
            min_teams: DEFAULT_MIN_TEAMS,
            batch_size: DEFAULT_BATCH_SIZE,
            rate_averaging: RateAveraging::default(),
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            db_path: path_env("SNAPSHOT_DB_PATH").or_else(default_db_path),
            ..Self::default()
        };
        cfg.raw_db_path = path_env("SNAPSHOT_RAW_DB_PATH");
        if let Some(v) = parsed_env::<i64>("SNAPSHOT_MIN_ROWS") {
            cfg.min_rows = v.max(0);
        }
        if let Some(v) = parsed_env::<i64>("SNAPSHOT_MIN_TEAMS") {
            cfg.min_teams = v.max(0);
        }
        if let Some(v) = parsed_env::<usize>("SNAPSHOT_BATCH_SIZE") {
            // 29 columns per row; keep statements well under SQLite's variable limit.
            cfg.batch_size = v.clamp(1, 1000);
        }
        if let Some(v) = parsed_env::<i64>("SNAPSHOT_LOCK_TTL_SECS") {
            cfg.lock_ttl_secs = v.max(1);
        }
        if let Ok(raw) = env::var("SNAPSHOT_RATE_AVERAGING")
            && !raw.trim().is_empty()
        {
            cfg.rate_averaging = RateAveraging::parse(&raw)
                .ok_or_else(|| anyhow!("unknown SNAPSHOT_RATE_AVERAGING value {raw:?}"))?;
        }
        Ok(cfg)
    }

    /// Raw tables live next to the snapshot tables unless configured otherwise.
    pub fn resolved_raw_db_path(&self) -> Option<PathBuf> {
        self.raw_db_path.clone().or_else(|| self.db_path.clone())
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

/// Loads `.env.local` then `.env`; missing files are fine.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .try_init();
}

fn path_env(key: &str) -> Option<PathBuf> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_averaging_parses_aliases() {
        assert_eq!(
            RateAveraging::parse(" Volume_Weighted "),
            Some(RateAveraging::VolumeWeighted)
        );
        assert_eq!(
            RateAveraging::parse("mean"),
            Some(RateAveraging::QualifyingWeekMean)
        );
        assert_eq!(RateAveraging::parse("median"), None);
    }

    #[test]
    fn defaults_match_gate_thresholds() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.min_rows, 200);
        assert_eq!(cfg.min_teams, 28);
        assert_eq!(cfg.rate_averaging, RateAveraging::QualifyingWeekMean);
    }
}
