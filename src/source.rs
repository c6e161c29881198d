//! Raw stat sources the staging loader reads from.
//!
//! The pipeline never reaches for shared process state: every run is handed a
//! `RawStatSource` explicitly.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::model::{AdvancedMetrics, ParticipationRecord, PlayerIdentity, RawWeeklyStat};

pub trait RawStatSource {
    /// Highest week with counting stats for `season`, `None` when the season is empty.
    fn latest_week(&self, season: i32) -> Result<Option<u32>>;

    fn weekly_stats(&self, season: i32, week: u32) -> Result<Vec<RawWeeklyStat>>;

    fn participation(&self, season: i32, week: u32) -> Result<Vec<ParticipationRecord>>;

    fn advanced_metrics(&self, season: i32, week: u32) -> Result<Vec<AdvancedMetrics>>;

    /// Identity mappings for the given player keys. Keys without a mapping are
    /// simply absent from the result.
    fn identities(&self, keys: &[String]) -> Result<HashMap<String, PlayerIdentity>>;
}

#[derive(Debug, Clone, Default)]
pub struct RawWeek {
    pub stats: Vec<RawWeeklyStat>,
    pub participation: Vec<ParticipationRecord>,
    pub advanced: Vec<AdvancedMetrics>,
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    weeks: BTreeMap<(i32, u32), RawWeek>,
    identities: HashMap<String, PlayerIdentity>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever the source held for this season/week.
    pub fn insert_week(&mut self, season: i32, week: u32, data: RawWeek) {
        self.weeks.insert((season, week), data);
    }

    pub fn insert_identity(&mut self, identity: PlayerIdentity) {
        self.identities.insert(identity.player_key.clone(), identity);
    }

    pub fn week(&self, season: i32, week: u32) -> Option<&RawWeek> {
        self.weeks.get(&(season, week))
    }

    pub fn week_mut(&mut self, season: i32, week: u32) -> Option<&mut RawWeek> {
        self.weeks.get_mut(&(season, week))
    }

    pub fn weeks(&self) -> impl Iterator<Item = (&(i32, u32), &RawWeek)> {
        self.weeks.iter()
    }

    pub fn all_identities(&self) -> impl Iterator<Item = &PlayerIdentity> {
        self.identities.values()
    }
}

impl RawStatSource for MemorySource {
    fn latest_week(&self, season: i32) -> Result<Option<u32>> {
        Ok(self
            .weeks
            .iter()
            .filter(|((s, _), data)| *s == season && !data.stats.is_empty())
            .map(|((_, w), _)| *w)
            .max())
    }

    fn weekly_stats(&self, season: i32, week: u32) -> Result<Vec<RawWeeklyStat>> {
        Ok(self
            .week(season, week)
            .map(|w| w.stats.clone())
            .unwrap_or_default())
    }

    fn participation(&self, season: i32, week: u32) -> Result<Vec<ParticipationRecord>> {
        Ok(self
            .week(season, week)
            .map(|w| w.participation.clone())
            .unwrap_or_default())
    }

    fn advanced_metrics(&self, season: i32, week: u32) -> Result<Vec<AdvancedMetrics>> {
        Ok(self
            .week(season, week)
            .map(|w| w.advanced.clone())
            .unwrap_or_default())
    }

    fn identities(&self, keys: &[String]) -> Result<HashMap<String, PlayerIdentity>> {
        Ok(keys
            .iter()
            .filter_map(|k| self.identities.get(k).map(|id| (k.clone(), id.clone())))
            .collect())
    }
}

/// Reads the `raw_*` tables and `player_identity` from a SQLite file.
pub struct SqliteRawSource {
    conn: Connection,
}

impl SqliteRawSource {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open raw source db {}", path.display()))?;
        init_raw_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_raw_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RawStatSource for SqliteRawSource {
    fn latest_week(&self, season: i32) -> Result<Option<u32>> {
        self.conn
            .query_row(
                "SELECT MAX(week) FROM raw_weekly_stats WHERE season = ?1",
                params![season],
                |row| row.get::<_, Option<u32>>(0),
            )
            .context("query latest raw week")
    }

    fn weekly_stats(&self, season: i32, week: u32) -> Result<Vec<RawWeeklyStat>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT player_key, player_name, position, team,
                       targets, target_share, receptions, receiving_yards, receiving_tds,
                       air_yards, carries, rushing_yards, rushing_tds,
                       fantasy_points, fantasy_points_half, fantasy_points_ppr
                FROM raw_weekly_stats
                WHERE season = ?1 AND week = ?2
                ORDER BY rowid ASC
                "#,
            )
            .context("prepare raw weekly stats query")?;
        let rows = stmt
            .query_map(params![season, week], |row| {
                Ok(RawWeeklyStat {
                    player_key: row.get(0)?,
                    player_name: row.get(1)?,
                    position: row.get(2)?,
                    team: row.get(3)?,
                    targets: row.get(4)?,
                    target_share: row.get(5)?,
                    receptions: row.get(6)?,
                    receiving_yards: row.get(7)?,
                    receiving_tds: row.get(8)?,
                    air_yards: row.get(9)?,
                    carries: row.get(10)?,
                    rushing_yards: row.get(11)?,
                    rushing_tds: row.get(12)?,
                    fantasy_points: row.get(13)?,
                    fantasy_points_half: row.get(14)?,
                    fantasy_points_ppr: row.get(15)?,
                })
            })
            .context("query raw weekly stats")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode raw weekly stat")?);
        }
        Ok(out)
    }

    fn participation(&self, season: i32, week: u32) -> Result<Vec<ParticipationRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT player_name, team, snaps, snap_share, routes, route_participation
                 FROM raw_participation WHERE season = ?1 AND week = ?2",
            )
            .context("prepare raw participation query")?;
        let rows = stmt
            .query_map(params![season, week], |row| {
                Ok(ParticipationRecord {
                    player_name: row.get(0)?,
                    team: row.get(1)?,
                    snaps: row.get(2)?,
                    snap_share: row.get(3)?,
                    routes: row.get(4)?,
                    route_participation: row.get(5)?,
                })
            })
            .context("query raw participation")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode participation row")?);
        }
        Ok(out)
    }

    fn advanced_metrics(&self, season: i32, week: u32) -> Result<Vec<AdvancedMetrics>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT player_key, epa_per_play, success_rate, adot, yac_per_reception
                 FROM raw_advanced_metrics WHERE season = ?1 AND week = ?2",
            )
            .context("prepare raw advanced metrics query")?;
        let rows = stmt
            .query_map(params![season, week], |row| {
                Ok(AdvancedMetrics {
                    player_key: row.get(0)?,
                    epa_per_play: row.get(1)?,
                    success_rate: row.get(2)?,
                    adot: row.get(3)?,
                    yac_per_reception: row.get(4)?,
                })
            })
            .context("query raw advanced metrics")?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode advanced metrics row")?);
        }
        Ok(out)
    }

    fn identities(&self, keys: &[String]) -> Result<HashMap<String, PlayerIdentity>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT player_key, full_name, position FROM player_identity WHERE player_key = ?1",
            )
            .context("prepare identity lookup")?;
        let mut out = HashMap::new();
        for key in keys {
            let mut rows = stmt
                .query(params![key])
                .context("query identity mapping")?;
            if let Some(row) = rows.next().context("read identity mapping")? {
                out.insert(
                    key.clone(),
                    PlayerIdentity {
                        player_key: row.get(0)?,
                        full_name: row.get(1)?,
                        position: row.get(2)?,
                    },
                );
            }
        }
        Ok(out)
    }
}

pub fn init_raw_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS raw_weekly_stats (
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            player_key TEXT NULL,
            player_name TEXT NOT NULL,
            position TEXT NULL,
            team TEXT NULL,
            targets INTEGER NULL,
            target_share REAL NULL,
            receptions INTEGER NULL,
            receiving_yards REAL NULL,
            receiving_tds INTEGER NULL,
            air_yards REAL NULL,
            carries INTEGER NULL,
            rushing_yards REAL NULL,
            rushing_tds INTEGER NULL,
            fantasy_points REAL NULL,
            fantasy_points_half REAL NULL,
            fantasy_points_ppr REAL NULL
        );
        CREATE INDEX IF NOT EXISTS idx_raw_weekly_season_week ON raw_weekly_stats(season, week);

        CREATE TABLE IF NOT EXISTS raw_participation (
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            team TEXT NULL,
            snaps INTEGER NULL,
            snap_share REAL NULL,
            routes INTEGER NULL,
            route_participation REAL NULL
        );
        CREATE INDEX IF NOT EXISTS idx_raw_participation_season_week ON raw_participation(season, week);

        CREATE TABLE IF NOT EXISTS raw_advanced_metrics (
            season INTEGER NOT NULL,
            week INTEGER NOT NULL,
            player_key TEXT NOT NULL,
            epa_per_play REAL NULL,
            success_rate REAL NULL,
            adot REAL NULL,
            yac_per_reception REAL NULL
        );
        CREATE INDEX IF NOT EXISTS idx_raw_advanced_season_week ON raw_advanced_metrics(season, week);

        CREATE TABLE IF NOT EXISTS player_identity (
            player_key TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            position TEXT NULL
        );
        "#,
    )
    .context("create raw source schema")?;
    Ok(())
}

/// Replaces the raw rows for one season/week.
pub fn write_raw_week(conn: &mut Connection, season: i32, week: u32, data: &RawWeek) -> Result<()> {
    let tx = conn.transaction().context("begin raw week transaction")?;
    for table in ["raw_weekly_stats", "raw_participation", "raw_advanced_metrics"] {
        tx.execute(
            &format!("DELETE FROM {table} WHERE season = ?1 AND week = ?2"),
            params![season, week],
        )
        .with_context(|| format!("clear {table}"))?;
    }
    for s in &data.stats {
        tx.execute(
            r#"
            INSERT INTO raw_weekly_stats (
                season, week, player_key, player_name, position, team,
                targets, target_share, receptions, receiving_yards, receiving_tds,
                air_yards, carries, rushing_yards, rushing_tds,
                fantasy_points, fantasy_points_half, fantasy_points_ppr
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                season,
                week,
                s.player_key,
                s.player_name,
                s.position,
                s.team,
                s.targets,
                s.target_share,
                s.receptions,
                s.receiving_yards,
                s.receiving_tds,
                s.air_yards,
                s.carries,
                s.rushing_yards,
                s.rushing_tds,
                s.fantasy_points,
                s.fantasy_points_half,
                s.fantasy_points_ppr,
            ],
        )
        .context("insert raw weekly stat")?;
    }
    for p in &data.participation {
        tx.execute(
            "INSERT INTO raw_participation (season, week, player_name, team, snaps, snap_share, routes, route_participation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                season,
                week,
                p.player_name,
                p.team,
                p.snaps,
                p.snap_share,
                p.routes,
                p.route_participation
            ],
        )
        .context("insert raw participation")?;
    }
    for a in &data.advanced {
        tx.execute(
            "INSERT INTO raw_advanced_metrics (season, week, player_key, epa_per_play, success_rate, adot, yac_per_reception)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                season,
                week,
                a.player_key,
                a.epa_per_play,
                a.success_rate,
                a.adot,
                a.yac_per_reception
            ],
        )
        .context("insert raw advanced metrics")?;
    }
    tx.commit().context("commit raw week transaction")?;
    Ok(())
}

pub fn write_identities<'a>(
    conn: &mut Connection,
    identities: impl IntoIterator<Item = &'a PlayerIdentity>,
) -> Result<usize> {
    let tx = conn.transaction().context("begin identity transaction")?;
    let mut written = 0usize;
    for id in identities {
        tx.execute(
            "INSERT INTO player_identity (player_key, full_name, position) VALUES (?1, ?2, ?3)
             ON CONFLICT(player_key) DO UPDATE SET
                full_name = excluded.full_name,
                position = excluded.position",
            params![id.player_key, id.full_name, id.position],
        )
        .context("upsert player identity")?;
        written += 1;
    }
    tx.commit().context("commit identity transaction")?;
    Ok(written)
}
