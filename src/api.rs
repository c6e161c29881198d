//! Transport-neutral request handling for the snapshot endpoints.
//!
//! `ApiRequest::parse` turns a method, path, query map and optional body into
//! a typed request; `handle` runs it and shapes a JSON response with a status
//! code. Any HTTP front end only has to forward these.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::TriggeredBy;
use crate::pipeline::{self, RunRequest};
use crate::query::{self, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_OFFSET, PlayerWeekFilter, SearchParams};
use crate::source::RawStatSource;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    CurrentSnapshotMeta,
    PlayerWeek {
        season: i32,
        week: u32,
        filter: PlayerWeekFilter,
    },
    PlayerSeason {
        player_id: String,
        season: i32,
    },
    TeamWeek {
        team: String,
        season: i32,
        week: u32,
        position: Option<String>,
    },
    Search(SearchParams),
    Health,
    AdminRun(RunRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": code, "message": message.into() }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminRunBody {
    season: i32,
    week: u32,
    data_version: Option<String>,
    triggered_by: Option<String>,
    official: Option<bool>,
}

impl ApiRequest {
    pub fn parse(
        method: &str,
        path: &str,
        query: &HashMap<String, String>,
        body: Option<&str>,
    ) -> Result<Self> {
        let method = method.trim().to_ascii_uppercase();
        let route = path.trim().trim_start_matches('/').trim_end_matches('/');
        match (method.as_str(), route) {
            ("GET", "current-snapshot-meta") => Ok(Self::CurrentSnapshotMeta),
            ("GET", "player-week") => Ok(Self::PlayerWeek {
                season: required(query, "season")?,
                week: required(query, "week")?,
                filter: PlayerWeekFilter {
                    player_id: text(query, "playerId"),
                    name: text(query, "name"),
                    team: text(query, "team"),
                    position: text(query, "position"),
                    min_routes: optional(query, "minRoutes")?,
                    min_snaps: optional(query, "minSnaps")?,
                },
            }),
            ("GET", "player-season") => Ok(Self::PlayerSeason {
                player_id: text(query, "playerId")
                    .ok_or_else(|| anyhow!("missing query parameter playerId"))?,
                season: required(query, "season")?,
            }),
            ("GET", "team-week") => Ok(Self::TeamWeek {
                team: text(query, "teamId")
                    .ok_or_else(|| anyhow!("missing query parameter teamId"))?,
                season: required(query, "season")?,
                week: required(query, "week")?,
                position: text(query, "position"),
            }),
            ("GET", "search") => {
                let offset = optional::<usize>(query, "offset")?.unwrap_or(0);
                if offset > MAX_SEARCH_OFFSET {
                    return Err(anyhow!("offset {offset} is out of range"));
                }
                Ok(Self::Search(SearchParams {
                    q: text(query, "q"),
                    season: required(query, "season")?,
                    week: required(query, "week")?,
                    position: text(query, "position"),
                    min_routes: optional(query, "minRoutes")?,
                    min_snaps: optional(query, "minSnaps")?,
                    limit: optional(query, "limit")?.unwrap_or(DEFAULT_SEARCH_LIMIT),
                    offset,
                }))
            }
            ("GET", "health") => Ok(Self::Health),
            ("POST", "admin-run") => {
                let raw = body.ok_or_else(|| anyhow!("admin-run requires a JSON body"))?;
                let parsed: AdminRunBody = serde_json::from_str(raw)
                    .map_err(|err| anyhow!("invalid admin-run body: {err}"))?;
                if parsed.week == 0 {
                    return Err(anyhow!("week must be at least 1"));
                }
                let triggered_by = match parsed.triggered_by.as_deref() {
                    Some(label) => TriggeredBy::from_str(label)?,
                    None => TriggeredBy::Admin,
                };
                Ok(Self::AdminRun(RunRequest {
                    season: parsed.season,
                    week: parsed.week,
                    data_version: parsed.data_version,
                    triggered_by,
                    official: parsed.official.unwrap_or(true),
                }))
            }
            (_, route) => Err(anyhow!("no route for {method} /{route}")),
        }
    }
}

/// Parses and runs one request; parse failures become a 400.
pub fn dispatch(
    conn: &mut Connection,
    source: &dyn RawStatSource,
    cfg: &PipelineConfig,
    method: &str,
    path: &str,
    query: &HashMap<String, String>,
    body: Option<&str>,
) -> ApiResponse {
    match ApiRequest::parse(method, path, query, body) {
        Ok(req) => handle(conn, source, cfg, &req),
        Err(err) => ApiResponse::error(400, "bad_request", format!("{err:#}")),
    }
}

pub fn handle(
    conn: &mut Connection,
    source: &dyn RawStatSource,
    cfg: &PipelineConfig,
    req: &ApiRequest,
) -> ApiResponse {
    match respond(conn, source, cfg, req) {
        Ok(resp) => resp,
        Err(err) => error_response(&err),
    }
}

fn respond(
    conn: &mut Connection,
    source: &dyn RawStatSource,
    cfg: &PipelineConfig,
    req: &ApiRequest,
) -> Result<ApiResponse> {
    let resp = match req {
        ApiRequest::CurrentSnapshotMeta => match query::current_snapshot_meta(conn)? {
            Some(meta) => ApiResponse::ok(serde_json::to_value(meta)?),
            None => ApiResponse::error(404, "not_found", "no official snapshot has been published"),
        },
        ApiRequest::PlayerWeek {
            season,
            week,
            filter,
        } => {
            let rows = query::player_week(conn, *season, *week, filter)?;
            ApiResponse::ok(json!({ "rows": rows }))
        }
        ApiRequest::PlayerSeason { player_id, season } => {
            let row = query::player_season(conn, player_id, *season)?;
            ApiResponse::ok(json!({ "row": row }))
        }
        ApiRequest::TeamWeek {
            team,
            season,
            week,
            position,
        } => {
            let rows = query::team_week(conn, team, *season, *week, position.as_deref())?;
            ApiResponse::ok(json!({ "rows": rows }))
        }
        ApiRequest::Search(params) => ApiResponse::ok(serde_json::to_value(query::search(conn, params)?)?),
        ApiRequest::Health => ApiResponse::ok(serde_json::to_value(query::health(conn)?)?),
        ApiRequest::AdminRun(run) => {
            log::info!(
                "admin run requested for season {} week {} by {}",
                run.season,
                run.week,
                run.triggered_by
            );
            let outcome = pipeline::run_week(conn, source, cfg, run)?;
            ApiResponse::ok(json!({
                "snapshotId": outcome.snapshot_id,
                "outcome": outcome,
            }))
        }
    };
    Ok(resp)
}

fn error_response(err: &anyhow::Error) -> ApiResponse {
    match PipelineError::from_anyhow(err) {
        Some(PipelineError::Validation {
            season,
            week,
            errors,
        }) => ApiResponse {
            status: 422,
            body: json!({
                "error": "validation_failed",
                "season": season,
                "week": week,
                "reasons": errors,
            }),
        },
        Some(PipelineError::ValidationNotPassed { .. }) => {
            ApiResponse::error(422, "validation_failed", err.to_string())
        }
        Some(PipelineError::RunInProgress { .. }) => {
            ApiResponse::error(409, "run_in_progress", err.to_string())
        }
        Some(PipelineError::NoRawData { .. }) => ApiResponse::error(500, "no_raw_data", err.to_string()),
        None => {
            log::error!("request failed: {err:#}");
            ApiResponse::error(500, "internal", format!("{err:#}"))
        }
    }
}

fn text(query: &HashMap<String, String>, key: &str) -> Option<String> {
    query
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn optional<T: FromStr>(query: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    match text(query, key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("invalid value {raw:?} for {key}")),
        None => Ok(None),
    }
}

fn required<T: FromStr>(query: &HashMap<String, String>, key: &str) -> Result<T> {
    optional(query, key)?.ok_or_else(|| anyhow!("missing query parameter {key}"))
}
