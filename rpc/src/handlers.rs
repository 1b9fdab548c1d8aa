//! RPC request handlers and their wire types.

use crate::error::RpcError;
use crate::server::USER_ID_HEADER;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use civic_types::{
    Category, Coordinates, Issue, IssueId, IssueStatus, Severity, VoteRecord, VoterId,
};
use civic_verification::{IssueEngine, IssueQuery, NewIssue, TallyAudit, Transition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type AppState = Arc<IssueEngine>;

/// The caller's identity from the identity header. A missing header yields a
/// blank id, which the engine rejects as unauthenticated.
fn caller(headers: &HeaderMap) -> VoterId {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    VoterId::new(raw.trim())
}

fn parse_id(raw: &str) -> Result<IssueId, RpcError> {
    raw.parse()
        .map_err(|_| RpcError::InvalidRequest(format!("malformed issue id: {raw}")))
}

// ── Issue ────────────────────────────────────────────────────────────────

/// An issue plus derived display fields.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssueResponse {
    #[serde(flatten)]
    pub issue: Issue,
    pub progress_percent: u8,
}

impl From<Issue> for IssueResponse {
    fn from(issue: Issue) -> Self {
        Self {
            progress_percent: issue.progress_percent(),
            issue,
        }
    }
}

pub async fn create_issue(
    State(engine): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<NewIssue>,
) -> Result<(StatusCode, Json<IssueResponse>), RpcError> {
    let issue = engine.create_issue(&caller(&headers), report)?;
    Ok((StatusCode::CREATED, Json(issue.into())))
}

pub async fn get_issue(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IssueResponse>, RpcError> {
    let issue = engine.get_issue(&parse_id(&id)?)?;
    Ok(Json(issue.into()))
}

// ── Listing ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListIssuesParams {
    pub status: Option<IssueStatus>,
    pub category: Option<Category>,
    pub severity: Option<Severity>,
    /// With `lon`, only issues whose geofence covers this point.
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl ListIssuesParams {
    fn into_query(self) -> Result<IssueQuery, RpcError> {
        let near = match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            (None, None) => None,
            _ => {
                return Err(RpcError::InvalidRequest(
                    "lat and lon must be given together".into(),
                ))
            }
        };
        Ok(IssueQuery {
            status: self.status,
            category: self.category,
            severity: self.severity,
            near,
            offset: self.offset,
            limit: self.limit,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListIssuesResponse {
    pub issues: Vec<IssueResponse>,
    /// Offset of the next page, or `None` on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

pub async fn list_issues(
    State(engine): State<AppState>,
    Query(params): Query<ListIssuesParams>,
) -> Result<Json<ListIssuesResponse>, RpcError> {
    let query = params.into_query()?;
    let issues = engine.list_issues(&query)?;
    let next_offset = (issues.len() == query.effective_limit())
        .then(|| query.offset.unwrap_or(0) + issues.len());
    Ok(Json(ListIssuesResponse {
        issues: issues.into_iter().map(IssueResponse::from).collect(),
        next_offset,
    }))
}

// ── Voting ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct CastVoteRequest {
    pub in_favor: bool,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CastVoteResponse {
    pub issue: IssueResponse,
    pub vote: VoteRecord,
    /// New status, when this vote changed it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<IssueStatus>,
}

pub async fn cast_vote(
    State(engine): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<CastVoteRequest>,
) -> Result<(StatusCode, Json<CastVoteResponse>), RpcError> {
    let id = parse_id(&id)?;
    let location = Coordinates::new(req.latitude, req.longitude);
    let accepted = engine.cast_vote(&caller(&headers), &id, req.in_favor, location)?;
    Ok((
        StatusCode::CREATED,
        Json(CastVoteResponse {
            new_status: accepted.transition.map(|t: Transition| t.to),
            issue: accepted.issue.into(),
            vote: accepted.vote,
        }),
    ))
}

pub async fn list_votes(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<VoteRecord>>, RpcError> {
    Ok(Json(engine.votes_for(&parse_id(&id)?)?))
}

pub async fn audit_tally(
    State(engine): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TallyAudit>, RpcError> {
    Ok(Json(engine.audit_tally(&parse_id(&id)?)?))
}

// ── Authority ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct AdvanceStatusRequest {
    pub status: IssueStatus,
}

pub async fn advance_status(
    State(engine): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<AdvanceStatusRequest>,
) -> Result<Json<IssueResponse>, RpcError> {
    let issue = engine.advance_status(&caller(&headers), &parse_id(&id)?, req.status)?;
    Ok(Json(issue.into()))
}

// ── Telemetry ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub counters: BTreeMap<String, u64>,
}

pub async fn stats(State(engine): State<AppState>) -> Json<StatsResponse> {
    let counters = engine
        .stats()
        .snapshot()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    Json(StatsResponse { counters })
}

pub async fn health() -> &'static str {
    "ok"
}
