use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Admin,
    Auto,
}

impl TriggeredBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggeredBy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" | "manual" => Ok(Self::Admin),
            "auto" | "scheduler" | "automatic" => Ok(Self::Auto),
            other => Err(anyhow!("unknown trigger label {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub id: i64,
    pub season: i32,
    pub week: u32,
    pub data_version: String,
    pub is_official: bool,
    pub row_count: i64,
    pub team_count: i64,
    pub validation_passed: bool,
    pub validation_errors: Option<String>,
    pub published_at: String,
    pub triggered_by: TriggeredBy,
    pub content_hash: String,
}

/// One player's line for one week. Staged rows and published rows share this
/// shape; published rows are wrapped in [`SnapshotWeekRow`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWeekRow {
    pub season: i32,
    pub week: u32,
    pub player_id: Option<String>,
    pub player_name: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub snaps: Option<i64>,
    pub snap_share: Option<f64>,
    pub routes: Option<i64>,
    pub route_participation: Option<f64>,
    pub targets: Option<i64>,
    pub target_share: Option<f64>,
    pub receptions: Option<i64>,
    pub receiving_yards: Option<f64>,
    pub receiving_tds: Option<i64>,
    pub air_yards: Option<f64>,
    pub rush_attempts: Option<i64>,
    pub rushing_yards: Option<f64>,
    pub rushing_tds: Option<i64>,
    pub tprr: Option<f64>,
    pub yprr: Option<f64>,
    pub yards_per_carry: Option<f64>,
    pub epa_per_play: Option<f64>,
    pub success_rate: Option<f64>,
    pub adot: Option<f64>,
    pub yac_per_reception: Option<f64>,
    pub fantasy_points_std: Option<f64>,
    pub fantasy_points_half: Option<f64>,
    pub fantasy_points_ppr: Option<f64>,
}

impl PlayerWeekRow {
    /// Non-zero snaps or routes.
    pub fn participated(&self) -> bool {
        self.snaps.unwrap_or(0) > 0 || self.routes.unwrap_or(0) > 0
    }
}

pub type StagingRow = PlayerWeekRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotWeekRow {
    pub snapshot_id: i64,
    #[serde(flatten)]
    pub stats: PlayerWeekRow,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSeasonRow {
    pub snapshot_id: i64,
    pub season: i32,
    pub through_week: u32,
    pub player_id: String,
    pub player_name: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub games_played: i64,
    pub snaps: i64,
    pub routes: i64,
    pub targets: i64,
    pub receptions: i64,
    pub receiving_yards: f64,
    pub receiving_tds: i64,
    pub air_yards: f64,
    pub rush_attempts: i64,
    pub rushing_yards: f64,
    pub rushing_tds: i64,
    pub fantasy_points_std: f64,
    pub fantasy_points_half: f64,
    pub fantasy_points_ppr: f64,
    pub fantasy_points_ppr_per_game: Option<f64>,
    pub snap_share: Option<f64>,
    pub route_participation: Option<f64>,
    pub target_share: Option<f64>,
    pub tprr: Option<f64>,
    pub yprr: Option<f64>,
    pub yards_per_carry: Option<f64>,
    pub epa_per_play: Option<f64>,
    pub success_rate: Option<f64>,
    pub adot: Option<f64>,
    pub yac_per_reception: Option<f64>,
}

/// Counting stats for one player-week as delivered by the raw source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawWeeklyStat {
    pub player_key: Option<String>,
    pub player_name: String,
    pub position: Option<String>,
    pub team: Option<String>,
    pub targets: Option<i64>,
    pub target_share: Option<f64>,
    pub receptions: Option<i64>,
    pub receiving_yards: Option<f64>,
    pub receiving_tds: Option<i64>,
    pub air_yards: Option<f64>,
    pub carries: Option<i64>,
    pub rushing_yards: Option<f64>,
    pub rushing_tds: Option<i64>,
    pub fantasy_points: Option<f64>,
    pub fantasy_points_half: Option<f64>,
    pub fantasy_points_ppr: Option<f64>,
}

/// Snap and route participation, keyed by player name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParticipationRecord {
    pub player_name: String,
    pub team: Option<String>,
    pub snaps: Option<i64>,
    pub snap_share: Option<f64>,
    pub routes: Option<i64>,
    pub route_participation: Option<f64>,
}

/// Per-play efficiency, keyed by the source's internal player key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdvancedMetrics {
    pub player_key: String,
    pub epa_per_play: Option<f64>,
    pub success_rate: Option<f64>,
    pub adot: Option<f64>,
    pub yac_per_reception: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub player_key: String,
    pub full_name: String,
    pub position: Option<String>,
}
