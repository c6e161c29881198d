#![allow(dead_code)]

use weekly_snapshots::config::PipelineConfig;
use weekly_snapshots::fake_source::{self, FakeSeason};
use weekly_snapshots::model::{ParticipationRecord, PlayerIdentity, RawWeeklyStat};
use weekly_snapshots::source::{MemorySource, RawWeek};

pub const SEASON: i32 = 2025;

/// Production thresholds, small batches so chunking is exercised.
pub fn config() -> PipelineConfig {
    PipelineConfig {
        batch_size: 64,
        ..PipelineConfig::default()
    }
}

/// Gates relaxed so a handful of hand-built rows can publish.
pub fn lenient_config() -> PipelineConfig {
    PipelineConfig {
        min_rows: 1,
        min_teams: 1,
        batch_size: 2,
        ..PipelineConfig::default()
    }
}

pub fn fake(weeks: u32, teams: usize, players: usize) -> MemorySource {
    fake_source::generate(&FakeSeason {
        season: SEASON,
        weeks,
        teams,
        players,
        seed: 42,
    })
}

#[derive(Debug, Clone)]
pub struct Line {
    pub key: &'static str,
    pub name: &'static str,
    pub team: &'static str,
    pub snaps: i64,
    pub snap_share: f64,
    pub routes: i64,
    pub targets: i64,
    pub receptions: i64,
    pub receiving_yards: f64,
    pub ppr: f64,
}

impl Line {
    pub fn new(key: &'static str, name: &'static str, team: &'static str) -> Self {
        Self {
            key,
            name,
            team,
            snaps: 40,
            snap_share: 0.6,
            routes: 25,
            targets: 6,
            receptions: 4,
            receiving_yards: 50.0,
            ppr: 9.0,
        }
    }
}

pub fn week_of(lines: &[Line]) -> RawWeek {
    let mut week = RawWeek::default();
    for line in lines {
        week.stats.push(RawWeeklyStat {
            player_key: Some(line.key.to_string()),
            player_name: line.name.to_string(),
            position: Some("WR".to_string()),
            team: Some(line.team.to_string()),
            targets: Some(line.targets),
            target_share: Some(0.2),
            receptions: Some(line.receptions),
            receiving_yards: Some(line.receiving_yards),
            receiving_tds: Some(0),
            air_yards: Some(60.0),
            carries: Some(0),
            rushing_yards: Some(0.0),
            rushing_tds: Some(0),
            fantasy_points: Some(line.ppr - line.receptions as f64),
            fantasy_points_half: None,
            fantasy_points_ppr: Some(line.ppr),
        });
        week.participation.push(ParticipationRecord {
            player_name: line.name.to_string(),
            team: Some(line.team.to_string()),
            snaps: Some(line.snaps),
            snap_share: Some(line.snap_share),
            routes: Some(line.routes),
            route_participation: Some(0.8),
        });
    }
    week
}

pub fn identity(key: &str, name: &str) -> PlayerIdentity {
    PlayerIdentity {
        player_key: key.to_string(),
        full_name: name.to_string(),
        position: Some("WR".to_string()),
    }
}
