//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiContext>`.
//! Domain errors are mapped to status codes in [`ApiError`].

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::engine::{AdvanceOutcome, FinishOutcome, RaceLifecycle, ScheduleOutcome, WagerGateway, WagerReceipt, WagerRequest};
use crate::storage::{races, users, wagers};
use crate::types::{Competitor, CompetitorId, Race, RaceId, RaceSnapshot, ScrambleError, User, UserId, Wager};

use super::ADMIN_TOKEN_HEADER;

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiContext {
    pub lifecycle: Arc<RaceLifecycle>,
    pub gateway: WagerGateway,
    admin_token: Option<SecretString>,
}

impl ApiContext {
    pub fn new(lifecycle: Arc<RaceLifecycle>, gateway: WagerGateway, admin_token: Option<SecretString>) -> Self {
        Self {
            lifecycle,
            gateway,
            admin_token,
        }
    }

    fn admin_allowed(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.admin_token else {
            return false;
        };
        headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|given| given == expected.expose_secret().as_str())
    }
}

pub type AppState = Arc<ApiContext>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<Decimal>,
}

#[derive(Debug)]
pub enum ApiError {
    Domain(ScrambleError),
    BadRequest(String),
    Unauthorized,
}

impl From<ScrambleError> for ApiError {
    fn from(e: ScrambleError) -> Self {
        ApiError::Domain(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorBody { error: msg, balance: None }),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody { error: "admin token missing or invalid".into(), balance: None },
            ),
            ApiError::Domain(e) => {
                let status = match &e {
                    ScrambleError::InvalidStake(_) | ScrambleError::UnknownCompetitor(_) => StatusCode::BAD_REQUEST,
                    ScrambleError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    ScrambleError::UserNotFound(_) | ScrambleError::RaceNotFound(_) => StatusCode::NOT_FOUND,
                    ScrambleError::NoOpenRace
                    | ScrambleError::BettingClosed(_)
                    | ScrambleError::RaceNotSchedulable(_)
                    | ScrambleError::InvalidTransition { .. }
                    | ScrambleError::Conflict(_) => StatusCode::CONFLICT,
                    ScrambleError::Config(_)
                    | ScrambleError::BalanceOverflow(_)
                    | ScrambleError::CorruptRow(_)
                    | ScrambleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if e.is_validation() {
                    debug!(error = %e, "Request rejected");
                } else if status == StatusCode::INTERNAL_SERVER_ERROR {
                    error!(error = %e, "Request failed");
                } else {
                    info!(error = %e, "Request conflicted");
                }
                (status, ErrorBody { error: e.to_string(), balance: e.balance() })
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub snapshot: RaceSnapshot,
    pub countdown: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

impl ListQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub competitor_id: CompetitorId,
    /// Kept as text so malformed amounts get a clean 400.
    pub stake: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub competitor_id: CompetitorId,
    pub stake: Decimal,
    pub potential_payout: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvanceResponse {
    pub action: &'static str,
    pub race_id: Option<RaceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
}

impl From<&AdvanceOutcome> for AdvanceResponse {
    fn from(outcome: &AdvanceOutcome) -> Self {
        match outcome {
            AdvanceOutcome::Finished(FinishOutcome::Finished { race, winner, .. }) => AdvanceResponse {
                action: "finished",
                race_id: Some(race.id),
                winner: Some(winner.name.clone()),
            },
            AdvanceOutcome::Finished(FinishOutcome::AlreadyFinished(id)) => AdvanceResponse {
                action: "already_finished",
                race_id: Some(*id),
                winner: None,
            },
            AdvanceOutcome::Started(race) => AdvanceResponse {
                action: "started",
                race_id: Some(race.id),
                winner: None,
            },
            AdvanceOutcome::Scheduled(
                ScheduleOutcome::Created(race) | ScheduleOutcome::AlreadyScheduled(race) | ScheduleOutcome::AlreadyRunning(race),
            ) => AdvanceResponse {
                action: "scheduled",
                race_id: Some(race.id),
                winner: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/race/status
pub async fn get_race_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.lifecycle.snapshot();
    let countdown = snapshot.countdown();
    Json(StatusResponse { snapshot, countdown })
}

/// GET /api/race/active
pub async fn get_active_race(State(state): State<AppState>) -> ApiResult<Json<Race>> {
    Ok(Json(state.gateway.active_race_for_betting().await?))
}

/// GET /api/races
pub async fn get_races(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Json<Vec<Race>>> {
    let list = races::recent_races(state.lifecycle.pool(), query.limit()).await?;
    Ok(Json(list))
}

/// GET /api/competitors
pub async fn get_competitors(State(state): State<AppState>) -> Json<Vec<Competitor>> {
    Json(state.lifecycle.roster().competitors().to_vec())
}

/// GET /api/payout-preview
pub async fn get_payout_preview(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> ApiResult<Json<PreviewResponse>> {
    let stake = Decimal::from_str(query.stake.trim())
        .map_err(|_| ApiError::BadRequest(format!("stake '{}' is not a number", query.stake)))?;
    let potential_payout = state.gateway.preview_payout(query.competitor_id, stake)?;
    Ok(Json(PreviewResponse {
        competitor_id: query.competitor_id,
        stake,
        potential_payout,
    }))
}

/// POST /api/wagers
pub async fn place_wager(
    State(state): State<AppState>,
    Json(request): Json<WagerRequest>,
) -> ApiResult<(StatusCode, Json<WagerReceipt>)> {
    let receipt = state.gateway.place_wager(&request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /api/users/:id
pub async fn get_user(State(state): State<AppState>, Path(id): Path<UserId>) -> ApiResult<Json<User>> {
    let user = users::get_user(state.lifecycle.pool(), id)
        .await?
        .ok_or(ScrambleError::UserNotFound(id))?;
    Ok(Json(user))
}

/// GET /api/users/:id/wagers
pub async fn get_user_wagers(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Wager>>> {
    let pool = state.lifecycle.pool();
    if users::get_user(pool, id).await?.is_none() {
        return Err(ScrambleError::UserNotFound(id).into());
    }
    Ok(Json(wagers::wagers_for_user(pool, id, query.limit()).await?))
}

/// POST /admin/advance
pub async fn force_advance(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<AdvanceResponse>> {
    if !state.admin_allowed(&headers) {
        warn!("Rejected admin request without a valid token");
        return Err(ApiError::Unauthorized);
    }
    let outcome = state.lifecycle.force_advance().await?;
    let response = AdvanceResponse::from(&outcome);
    info!(action = response.action, race_id = ?response.race_id, "ADMIN: force-advance complete");
    Ok(Json(response))
}
