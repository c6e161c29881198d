use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::model::{PlayerSeasonRow, SnapshotMeta, SnapshotWeekRow};
use crate::query;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub snapshot_id: i64,
    pub week_rows: usize,
    pub season_rows: usize,
}

enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<Option<&str>> for Cell {
    fn from(v: Option<&str>) -> Self {
        v.map_or(Cell::Empty, Cell::from)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Number(v as f64)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Empty, Cell::Number)
    }
}

impl From<Option<i64>> for Cell {
    fn from(v: Option<i64>) -> Self {
        v.map_or(Cell::Empty, Cell::from)
    }
}

/// Writes one snapshot (meta, weekly rows, derived season rows) to an xlsx file.
pub fn export_snapshot_xlsx(conn: &Connection, snapshot_id: i64, path: &Path) -> Result<ExportReport> {
    let meta = query::snapshot_meta_by_id(conn, snapshot_id)?
        .ok_or_else(|| anyhow!("snapshot {snapshot_id} does not exist"))?;
    let weeks = query::snapshot_rows(conn, snapshot_id)?;
    let seasons = query::season_rows(conn, snapshot_id)?;

    let header = Format::new().set_bold();
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Meta")?;
        write_rows(sheet, &header, &meta_rows(&meta))?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Player Weeks")?;
        write_rows(sheet, &header, &week_rows(&weeks))?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Player Seasons")?;
        write_rows(sheet, &header, &season_rows(&seasons))?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export dir {}", parent.display()))?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    log::info!(
        "exported snapshot {snapshot_id} ({} week rows, {} season rows) to {}",
        weeks.len(),
        seasons.len(),
        path.display()
    );

    Ok(ExportReport {
        snapshot_id,
        week_rows: weeks.len(),
        season_rows: seasons.len(),
    })
}

fn meta_rows(meta: &SnapshotMeta) -> Vec<Vec<Cell>> {
    let pairs: Vec<(&str, Cell)> = vec![
        ("Snapshot ID", meta.id.into()),
        ("Season", i64::from(meta.season).into()),
        ("Week", i64::from(meta.week).into()),
        ("Data Version", meta.data_version.as_str().into()),
        ("Official", yes_no(meta.is_official)),
        ("Rows", meta.row_count.into()),
        ("Teams", meta.team_count.into()),
        ("Validation Passed", yes_no(meta.validation_passed)),
        ("Published At", meta.published_at.as_str().into()),
        ("Triggered By", meta.triggered_by.as_str().into()),
        ("Content Hash", meta.content_hash.as_str().into()),
    ];
    let mut rows = vec![vec![Cell::from("Field"), Cell::from("Value")]];
    rows.extend(pairs.into_iter().map(|(k, v)| vec![Cell::from(k), v]));
    rows
}

fn week_rows(rows: &[SnapshotWeekRow]) -> Vec<Vec<Cell>> {
    let mut out = vec![headers(&[
        "Player ID", "Player", "Team", "Pos", "Snaps", "Snap %", "Routes", "Route %", "Targets",
        "Tgt %", "Rec", "Rec Yds", "Rec TD", "Air Yds", "Rush Att", "Rush Yds", "Rush TD", "TPRR",
        "YPRR", "YPC", "EPA/Play", "Success %", "aDOT", "YAC/Rec", "Pts Std", "Pts Half",
        "Pts PPR",
    ])];
    for row in rows {
        let s = &row.stats;
        out.push(vec![
            s.player_id.as_deref().into(),
            s.player_name.as_str().into(),
            s.team.as_deref().into(),
            s.position.as_deref().into(),
            s.snaps.into(),
            s.snap_share.into(),
            s.routes.into(),
            s.route_participation.into(),
            s.targets.into(),
            s.target_share.into(),
            s.receptions.into(),
            s.receiving_yards.into(),
            s.receiving_tds.into(),
            s.air_yards.into(),
            s.rush_attempts.into(),
            s.rushing_yards.into(),
            s.rushing_tds.into(),
            s.tprr.into(),
            s.yprr.into(),
            s.yards_per_carry.into(),
            s.epa_per_play.into(),
            s.success_rate.into(),
            s.adot.into(),
            s.yac_per_reception.into(),
            s.fantasy_points_std.into(),
            s.fantasy_points_half.into(),
            s.fantasy_points_ppr.into(),
        ]);
    }
    out
}

fn season_rows(rows: &[PlayerSeasonRow]) -> Vec<Vec<Cell>> {
    let mut out = vec![headers(&[
        "Player ID", "Player", "Team", "Pos", "Through Wk", "Games", "Snaps", "Routes", "Targets",
        "Rec", "Rec Yds", "Rec TD", "Rush Att", "Rush Yds", "Rush TD", "Pts PPR", "PPR/G",
        "Snap %", "Route %", "Tgt %", "TPRR", "YPRR", "YPC", "EPA/Play", "Success %", "aDOT",
        "YAC/Rec",
    ])];
    for r in rows {
        out.push(vec![
            r.player_id.as_str().into(),
            r.player_name.as_str().into(),
            r.team.as_deref().into(),
            r.position.as_deref().into(),
            i64::from(r.through_week).into(),
            r.games_played.into(),
            r.snaps.into(),
            r.routes.into(),
            r.targets.into(),
            r.receptions.into(),
            r.receiving_yards.into(),
            r.receiving_tds.into(),
            r.rush_attempts.into(),
            r.rushing_yards.into(),
            r.rushing_tds.into(),
            r.fantasy_points_ppr.into(),
            r.fantasy_points_ppr_per_game.into(),
            r.snap_share.into(),
            r.route_participation.into(),
            r.target_share.into(),
            r.tprr.into(),
            r.yprr.into(),
            r.yards_per_carry.into(),
            r.epa_per_play.into(),
            r.success_rate.into(),
            r.adot.into(),
            r.yac_per_reception.into(),
        ]);
    }
    out
}

fn yes_no(v: bool) -> Cell {
    Cell::from(if v { "yes" } else { "no" })
}

fn headers(names: &[&str]) -> Vec<Cell> {
    names.iter().map(|n| Cell::from(*n)).collect()
}

fn write_rows(worksheet: &mut Worksheet, header: &Format, rows: &[Vec<Cell>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            let (r, c) = (row_idx as u32, col_idx as u16);
            let written = match value {
                Cell::Text(text) if row_idx == 0 => {
                    worksheet.write_string_with_format(r, c, text, header)
                }
                Cell::Text(text) => worksheet.write_string(r, c, text),
                Cell::Number(n) => worksheet.write_number(r, c, *n),
                Cell::Empty => continue,
            };
            written.with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
