use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::db::{self, STAGING_TABLE, WEEK_COLUMNS};
use crate::model::{
    AdvancedMetrics, ParticipationRecord, PlayerIdentity, RawWeeklyStat, StagingRow,
};
use crate::source::RawStatSource;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingReport {
    pub season: i32,
    pub week: u32,
    pub input_rows: usize,
    pub staged_rows: usize,
    pub identity_matched: usize,
    pub identity_missed: usize,
    pub participation_matched: usize,
    pub advanced_matched: usize,
}

/// Clears staging for `season`/`week` and reloads it from `source`.
///
/// Running this twice against the same source leaves identical staging rows.
pub fn load_staging(
    conn: &mut Connection,
    source: &dyn RawStatSource,
    season: i32,
    week: u32,
    batch_size: usize,
) -> Result<StagingReport> {
    let stats = source
        .weekly_stats(season, week)
        .with_context(|| format!("read raw weekly stats {season} week {week}"))?;
    let participation = source
        .participation(season, week)
        .with_context(|| format!("read participation {season} week {week}"))?;
    let advanced = source
        .advanced_metrics(season, week)
        .with_context(|| format!("read advanced metrics {season} week {week}"))?;

    let mut keys = stats
        .iter()
        .filter_map(|s| s.player_key.clone())
        .collect::<Vec<_>>();
    keys.sort();
    keys.dedup();
    let identities = source.identities(&keys).context("resolve player identities")?;

    let (rows, mut report) =
        build_staging_rows(season, week, &stats, &participation, &advanced, &identities);

    let tx = conn.transaction().context("begin staging transaction")?;
    let cleared = clear_staging(&tx, season, week)?;
    report.staged_rows = insert_staging_rows(&tx, &rows, batch_size)?;
    tx.commit().context("commit staging transaction")?;

    log::info!(
        "staging {season} week {week}: input={} staged={} cleared={} identity matched={} missed={} participation matched={} advanced matched={}",
        report.input_rows,
        report.staged_rows,
        cleared,
        report.identity_matched,
        report.identity_missed,
        report.participation_matched,
        report.advanced_matched,
    );
    if report.identity_missed > 0 {
        log::warn!(
            "staging {season} week {week}: {} rows fell back to source name/position",
            report.identity_missed
        );
    }
    Ok(report)
}

/// Joins the raw feeds into staging rows. Pure; nothing is written.
pub fn build_staging_rows(
    season: i32,
    week: u32,
    stats: &[RawWeeklyStat],
    participation: &[ParticipationRecord],
    advanced: &[AdvancedMetrics],
    identities: &HashMap<String, PlayerIdentity>,
) -> (Vec<StagingRow>, StagingReport) {
    let participation_index = ParticipationIndex::new(participation);
    let advanced_by_key = advanced
        .iter()
        .map(|a| (a.player_key.as_str(), a))
        .collect::<HashMap<_, _>>();

    let mut report = StagingReport {
        season,
        week,
        input_rows: stats.len(),
        ..Default::default()
    };
    let mut rows = Vec::with_capacity(stats.len());

    for raw in stats {
        let identity = raw
            .player_key
            .as_deref()
            .and_then(|key| identities.get(key));
        if identity.is_some() {
            report.identity_matched += 1;
        } else {
            report.identity_missed += 1;
        }
        let player_name = identity
            .map(|id| id.full_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| raw.player_name.clone());
        let position = identity
            .and_then(|id| id.position.clone())
            .or_else(|| raw.position.clone());

        // Participation feeds are keyed by the source's display name.
        let part = participation_index.find(&raw.player_name, raw.team.as_deref());
        if part.is_some() {
            report.participation_matched += 1;
        }
        let adv = raw
            .player_key
            .as_deref()
            .and_then(|key| advanced_by_key.get(key).copied());
        if adv.is_some() {
            report.advanced_matched += 1;
        }

        let snaps = part.and_then(|p| p.snaps);
        let routes = part.and_then(|p| p.routes);
        let fantasy_points_half = raw.fantasy_points_half.or_else(|| {
            raw.fantasy_points
                .map(|pts| pts + 0.5 * raw.receptions.unwrap_or(0) as f64)
        });

        rows.push(StagingRow {
            season,
            week,
            player_id: raw.player_key.clone().filter(|k| !k.trim().is_empty()),
            player_name,
            team: raw.team.clone(),
            position,
            snaps,
            snap_share: part.and_then(|p| p.snap_share),
            routes,
            route_participation: part.and_then(|p| p.route_participation),
            targets: raw.targets,
            target_share: raw.target_share,
            receptions: raw.receptions,
            receiving_yards: raw.receiving_yards,
            receiving_tds: raw.receiving_tds,
            air_yards: raw.air_yards,
            rush_attempts: raw.carries,
            rushing_yards: raw.rushing_yards,
            rushing_tds: raw.rushing_tds,
            tprr: ratio(raw.targets.map(|t| t as f64), routes),
            yprr: ratio(raw.receiving_yards, routes),
            yards_per_carry: ratio(raw.rushing_yards, raw.carries),
            epa_per_play: adv.and_then(|a| a.epa_per_play),
            success_rate: adv.and_then(|a| a.success_rate),
            adot: adv.and_then(|a| a.adot),
            yac_per_reception: adv.and_then(|a| a.yac_per_reception),
            fantasy_points_std: raw.fantasy_points,
            fantasy_points_half,
            fantasy_points_ppr: raw.fantasy_points_ppr,
        });
    }

    (rows, report)
}

pub fn clear_staging(conn: &Connection, season: i32, week: u32) -> Result<usize> {
    conn.execute(
        &format!("DELETE FROM {STAGING_TABLE} WHERE season = ?1 AND week = ?2"),
        params![season, week],
    )
    .context("clear staging rows")
}

pub fn insert_staging_rows(
    conn: &Connection,
    rows: &[StagingRow],
    batch_size: usize,
) -> Result<usize> {
    let values = rows.iter().map(db::week_row_values).collect::<Vec<_>>();
    db::insert_batched(conn, STAGING_TABLE, &WEEK_COLUMNS, &values, batch_size)
}

pub fn load_staging_rows(conn: &Connection, season: i32, week: u32) -> Result<Vec<StagingRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM {STAGING_TABLE} WHERE season = ?1 AND week = ?2 ORDER BY rowid ASC",
            WEEK_COLUMNS.join(", ")
        ))
        .context("prepare staging rows query")?;
    let rows = stmt
        .query_map(params![season, week], |row| db::week_row_from_sql(row, 0))
        .context("query staging rows")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode staging row")?);
    }
    Ok(out)
}

/// `None` when the denominator is missing or zero.
pub fn ratio(numerator: Option<f64>, denominator: Option<i64>) -> Option<f64> {
    let den = denominator.filter(|d| *d > 0)? as f64;
    let value = numerator? / den;
    value.is_finite().then_some(value)
}

const NAME_SUFFIXES: [&str; 6] = ["jr", "sr", "ii", "iii", "iv", "v"];

/// Lower-case ASCII alphanumerics only, generational suffixes dropped.
pub fn normalize_name(input: &str) -> String {
    let tokens = input
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|ch| ch.is_ascii_alphanumeric())
                .map(|ch| ch.to_ascii_lowercase())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>();
    let keep = tokens.len() > 1;
    tokens
        .iter()
        .enumerate()
        .filter(|(idx, token)| !(keep && *idx > 0 && NAME_SUFFIXES.contains(&token.as_str())))
        .map(|(_, token)| token.as_str())
        .collect()
}

struct ParticipationIndex<'a> {
    by_name_team: HashMap<(String, String), &'a ParticipationRecord>,
    // None marks a name shared by several players.
    by_name: HashMap<String, Option<&'a ParticipationRecord>>,
}

impl<'a> ParticipationIndex<'a> {
    fn new(records: &'a [ParticipationRecord]) -> Self {
        let mut by_name_team = HashMap::new();
        let mut by_name: HashMap<String, Option<&ParticipationRecord>> = HashMap::new();
        for rec in records {
            let name = normalize_name(&rec.player_name);
            if name.is_empty() {
                continue;
            }
            if let Some(team) = rec.team.as_deref() {
                by_name_team
                    .entry((name.clone(), team.to_ascii_uppercase()))
                    .or_insert(rec);
            }
            by_name
                .entry(name)
                .and_modify(|slot| *slot = None)
                .or_insert(Some(rec));
        }
        Self {
            by_name_team,
            by_name,
        }
    }

    fn find(&self, player_name: &str, team: Option<&str>) -> Option<&'a ParticipationRecord> {
        let name = normalize_name(player_name);
        if let Some(team) = team
            && let Some(rec) = self.by_name_team.get(&(name.clone(), team.to_ascii_uppercase()))
        {
            return Some(*rec);
        }
        self.by_name.get(&name).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio(Some(10.0), Some(0)), None);
        assert_eq!(ratio(Some(10.0), None), None);
        assert_eq!(ratio(None, Some(4)), None);
        assert_eq!(ratio(Some(10.0), Some(4)), Some(2.5));
    }

    #[test]
    fn normalize_name_compacts() {
        assert_eq!(normalize_name(" Ja'Marr Chase "), "jamarrchase");
        assert_eq!(normalize_name("D.K. Metcalf"), "dkmetcalf");
        assert_eq!(normalize_name("J. Smith"), normalize_name("J.Smith"));
        assert_eq!(normalize_name("Marvin Harrison Jr."), "marvinharrison");
    }

    #[test]
    fn identity_mapping_overrides_source_name_and_position() {
        let stats = vec![
            RawWeeklyStat {
                player_key: Some("k1".into()),
                player_name: "J.Smith".into(),
                position: Some("RB".into()),
                team: Some("KC".into()),
                targets: Some(6),
                receiving_yards: Some(48.0),
                carries: Some(0),
                rushing_yards: Some(0.0),
                fantasy_points: Some(4.8),
                receptions: Some(4),
                ..Default::default()
            },
            RawWeeklyStat {
                player_key: Some("k2".into()),
                player_name: "B.Jones".into(),
                position: Some("TE".into()),
                team: Some("BUF".into()),
                ..Default::default()
            },
        ];
        let participation = vec![ParticipationRecord {
            player_name: "J. Smith".into(),
            team: Some("KC".into()),
            snaps: Some(40),
            snap_share: Some(0.62),
            routes: Some(24),
            route_participation: Some(0.8),
        }];
        let identities = HashMap::from([(
            "k1".to_string(),
            PlayerIdentity {
                player_key: "k1".into(),
                full_name: "John Smith".into(),
                position: Some("WR".into()),
            },
        )]);

        let (rows, report) =
            build_staging_rows(2025, 5, &stats, &participation, &[], &identities);
        assert_eq!(report.identity_matched, 1);
        assert_eq!(report.identity_missed, 1);
        assert_eq!(report.participation_matched, 1);

        let smith = &rows[0];
        assert_eq!(smith.player_name, "John Smith");
        assert_eq!(smith.position.as_deref(), Some("WR"));
        assert_eq!(smith.snaps, Some(40));
        assert_eq!(smith.tprr, Some(0.25));
        assert_eq!(smith.yprr, Some(2.0));
        assert_eq!(smith.yards_per_carry, None);
        assert_eq!(smith.fantasy_points_half, Some(6.8));

        let jones = &rows[1];
        assert_eq!(jones.player_name, "B.Jones");
        assert_eq!(jones.position.as_deref(), Some("TE"));
        assert_eq!(jones.tprr, None);
    }

    #[test]
    fn ambiguous_names_need_a_team_match() {
        let participation = vec![
            ParticipationRecord {
                player_name: "Mike Williams".into(),
                team: Some("LAC".into()),
                snaps: Some(50),
                ..Default::default()
            },
            ParticipationRecord {
                player_name: "Mike Williams".into(),
                team: Some("NYJ".into()),
                snaps: Some(20),
                ..Default::default()
            },
        ];
        let index = ParticipationIndex::new(&participation);
        assert_eq!(index.find("Mike Williams", Some("nyj")).and_then(|p| p.snaps), Some(20));
        assert!(index.find("Mike Williams", None).is_none());
        assert!(index.find("Mike Williams", Some("PIT")).is_none());
    }
}
