//! Seeded synthetic season for demos, tests and benches.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::model::{AdvancedMetrics, ParticipationRecord, PlayerIdentity, RawWeeklyStat};
use crate::source::{MemorySource, RawWeek};

const TEAMS: [&str; 32] = [
    "ARI", "ATL", "BAL", "BUF", "CAR", "CHI", "CIN", "CLE", "DAL", "DEN", "DET", "GB", "HOU",
    "IND", "JAX", "KC", "LAC", "LAR", "LV", "MIA", "MIN", "NE", "NO", "NYG", "NYJ", "PHI", "PIT",
    "SEA", "SF", "TB", "TEN", "WAS",
];

const FIRST: [&str; 12] = [
    "Aaron", "Bijan", "Cooper", "Davante", "Evan", "Garrett", "Jalen", "Ja'Marr", "Kyle", "Mike",
    "Puka", "Travis",
];

const LAST: [&str; 12] = [
    "Allen", "Brown", "Cook", "Evans", "Hill", "Johnson", "Kelce", "Moore", "Nacua", "Robinson",
    "Smith Jr.", "Williams",
];

const POSITIONS: [&str; 6] = ["WR", "RB", "WR", "TE", "QB", "WR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeSeason {
    pub season: i32,
    pub weeks: u32,
    pub teams: usize,
    pub players: usize,
    pub seed: u64,
}

impl Default for FakeSeason {
    fn default() -> Self {
        Self {
            season: 2025,
            weeks: 4,
            teams: 32,
            players: 320,
            seed: 7,
        }
    }
}

struct FakePlayer {
    key: String,
    name: String,
    team: String,
    position: &'static str,
}

/// Builds a full raw season. Players are dealt to teams round-robin, every row
/// carries a player key, and every player has participation and core metrics.
pub fn generate(params: &FakeSeason) -> MemorySource {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let roster = roster(params);
    let mut source = MemorySource::new();

    for player in &roster {
        source.insert_identity(PlayerIdentity {
            player_key: player.key.clone(),
            full_name: player.name.clone(),
            position: Some(player.position.to_string()),
        });
    }
    for week in 1..=params.weeks {
        let data = fake_week(&mut rng, &roster);
        source.insert_week(params.season, week, data);
    }
    source
}

fn roster(params: &FakeSeason) -> Vec<FakePlayer> {
    let teams = params.teams.max(1);
    (0..params.players)
        .map(|i| {
            let team = TEAMS
                .get(i % teams)
                .map(|t| t.to_string())
                .unwrap_or_else(|| format!("T{:02}", i % teams + 1));
            // Suffix the roster slot so generated names stay unique.
            let name = format!(
                "{} {} {}",
                FIRST[i % FIRST.len()],
                LAST[(i / FIRST.len()) % LAST.len()],
                i
            );
            FakePlayer {
                key: format!("00-{:07}", i + 1),
                name,
                team,
                position: POSITIONS[(i / teams) % POSITIONS.len()],
            }
        })
        .collect()
}

fn fake_week(rng: &mut StdRng, roster: &[FakePlayer]) -> RawWeek {
    let mut week = RawWeek::default();
    for player in roster {
        let snaps: i64 = rng.gen_range(12..72);
        let routes: i64 = match player.position {
            "WR" => rng.gen_range(18..42),
            "TE" => rng.gen_range(10..34),
            "RB" => rng.gen_range(4..22),
            _ => rng.gen_range(1..3),
        };
        let targets = rng.gen_range(1..=(routes / 3).max(1));
        let receptions = rng.gen_range(0..=targets);
        let receiving_yards = (receptions as f64 * rng.gen_range(4.0..16.0)).round();
        let receiving_tds = i64::from(rng.gen_bool(0.15));
        let carries: i64 = match player.position {
            "RB" => rng.gen_range(6..24),
            "QB" => rng.gen_range(1..8),
            _ => rng.gen_range(0..2),
        };
        let rushing_yards = (carries as f64 * rng.gen_range(1.5..6.5)).round();
        let rushing_tds = i64::from(carries > 0 && rng.gen_bool(0.12));
        let std_points = 0.1 * (receiving_yards + rushing_yards)
            + 6.0 * (receiving_tds + rushing_tds) as f64;

        week.stats.push(RawWeeklyStat {
            player_key: Some(player.key.clone()),
            player_name: player.name.clone(),
            position: Some(player.position.to_string()),
            team: Some(player.team.clone()),
            targets: Some(targets),
            target_share: Some((targets as f64 / 36.0).min(1.0)),
            receptions: Some(receptions),
            receiving_yards: Some(receiving_yards),
            receiving_tds: Some(receiving_tds),
            air_yards: Some((targets as f64 * rng.gen_range(3.0..14.0)).round()),
            carries: Some(carries),
            rushing_yards: Some(rushing_yards),
            rushing_tds: Some(rushing_tds),
            fantasy_points: Some(std_points),
            fantasy_points_half: None,
            fantasy_points_ppr: Some(std_points + receptions as f64),
        });
        week.participation.push(ParticipationRecord {
            player_name: player.name.clone(),
            team: Some(player.team.clone()),
            snaps: Some(snaps),
            snap_share: Some(snaps as f64 / 72.0),
            routes: Some(routes),
            route_participation: Some((routes as f64 / 42.0).min(1.0)),
        });
        week.advanced.push(AdvancedMetrics {
            player_key: player.key.clone(),
            epa_per_play: Some(rng.gen_range(-0.35..0.55)),
            success_rate: Some(rng.gen_range(0.30..0.62)),
            adot: Some(rng.gen_range(2.0..15.0)),
            yac_per_reception: (receptions > 0).then(|| rng.gen_range(1.0..9.0)),
        });
    }
    week
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawStatSource;

    #[test]
    fn same_seed_same_season() {
        let params = FakeSeason {
            weeks: 2,
            players: 40,
            ..Default::default()
        };
        let a = generate(&params);
        let b = generate(&params);
        assert_eq!(
            a.weekly_stats(2025, 2).unwrap(),
            b.weekly_stats(2025, 2).unwrap()
        );
        assert_eq!(a.latest_week(2025).unwrap(), Some(2));
    }

    #[test]
    fn players_spread_round_robin_over_teams() {
        let params = FakeSeason {
            weeks: 1,
            teams: 30,
            players: 250,
            ..Default::default()
        };
        let stats = generate(&params).weekly_stats(2025, 1).unwrap();
        assert_eq!(stats.len(), 250);
        let teams = stats
            .iter()
            .filter_map(|s| s.team.clone())
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(teams.len(), 30);
        assert!(stats.iter().all(|s| s.player_key.is_some()));
    }
}
