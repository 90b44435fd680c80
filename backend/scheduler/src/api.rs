//! Axum REST API handlers.
//!
//! Read endpoints serve the scheduler's published view and the rotation
//! journal; command endpoints forward to the scheduler's command channel.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use rotation_engine::{membership, ChainParams, EngineError};

use crate::db;
use crate::directory::ChainDirectory;
use crate::errors::SchedulerError;
use crate::events::EventRecord;
use crate::scheduler::{JoinMember, SchedulerHandle};

pub struct ApiState {
    pub handle: SchedulerHandle,
    pub pool: SqlitePool,
    pub directory: Arc<dyn ChainDirectory>,
    pub chain_id: String,
    pub invite_origin: String,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub chain_id: String,
    pub count: usize,
    pub events: Vec<EventRecord>,
}

#[derive(Serialize)]
pub struct InviteResponse {
    pub invite_url: String,
}

#[derive(Deserialize)]
pub struct ContributeRequest {
    pub member_id: String,
    pub amount: i128,
}

#[derive(Deserialize)]
pub struct JoinRequest {
    /// Invite token the candidate followed; must resolve to this chain.
    pub token: String,
    pub member_id: String,
    pub name: String,
    pub wallet_address: String,
    pub contribution_amount: i128,
    #[serde(default)]
    pub is_lender: bool,
    #[serde(default)]
    pub vetted: bool,
}

#[derive(Deserialize)]
pub struct LoanRequest {
    pub borrower_id: String,
    pub lender_id: Option<String>,
    pub amount: i128,
    pub due_date: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct LoanCreatedResponse {
    pub loan_id: u64,
}

#[derive(Deserialize)]
pub struct ApproveRequest {
    pub lender_id: String,
}

#[derive(Deserialize)]
pub struct RepayRequest {
    pub borrower_id: String,
}

#[derive(Serialize)]
pub struct ChainCreatedResponse {
    pub chain_id: String,
}

fn error_response(err: SchedulerError) -> Response {
    let status = match &err {
        SchedulerError::Engine(_) => StatusCode::BAD_REQUEST,
        SchedulerError::ExternalCall(_) => StatusCode::BAD_GATEWAY,
        SchedulerError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Read handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /chain` — the merged view published on the last tick.
pub async fn get_view(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.handle.view())
}

/// `GET /chain/events` — the rotation journal, oldest first.
pub async fn get_events(State(state): State<Arc<ApiState>>) -> Response {
    match db::get_events_for_chain(&state.pool, &state.chain_id).await {
        Ok(events) => {
            let count = events.len();
            Json(EventsResponse {
                chain_id: state.chain_id.clone(),
                count,
                events,
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `GET /chain/invite` — shareable invite link for this chain.
pub async fn get_invite(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(InviteResponse {
        invite_url: membership::invite_link(&state.invite_origin, &state.chain_id),
    })
}

/// `GET /chain/members/:id/loans` — a member's loans from the directory.
pub async fn get_member_loans(
    State(state): State<Arc<ApiState>>,
    Path(member_id): Path<String>,
) -> Response {
    match state
        .directory
        .get_member_loans(&member_id, &state.chain_id)
        .await
    {
        Ok(loans) => Json(loans).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /chains` — all chains known to the directory.
pub async fn get_all_chains(State(state): State<Arc<ApiState>>) -> Response {
    match state.directory.get_all_chains().await {
        Ok(chains) => Json(chains).into_response(),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────

/// `POST /chains` — create a chain in the directory.
pub async fn create_chain(
    State(state): State<Arc<ApiState>>,
    Json(params): Json<ChainParams>,
) -> Response {
    // Validate the seed parameters locally before the directory sees them.
    if let Err(e) = rotation_engine::Chain::new(params.clone()) {
        return error_response(SchedulerError::Engine(e));
    }
    match state.directory.create_chain(&params).await {
        Ok(chain_id) => (
            StatusCode::CREATED,
            Json(ChainCreatedResponse { chain_id }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /chain/contributions`
pub async fn contribute(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ContributeRequest>,
) -> Response {
    match state.handle.contribute(req.member_id, req.amount).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /chain/join` — resolve the invite token and admit the member.
pub async fn join(State(state): State<Arc<ApiState>>, Json(req): Json<JoinRequest>) -> Response {
    let chain_id = match membership::parse_invite_token(&req.token) {
        Ok(id) => id,
        Err(e) => return error_response(SchedulerError::Engine(e)),
    };
    if chain_id != state.chain_id {
        return error_response(SchedulerError::Engine(EngineError::InvalidInviteToken(
            format!("invite is for chain {chain_id}, not {}", state.chain_id),
        )));
    }

    let member = JoinMember {
        member_id: req.member_id,
        name: req.name,
        wallet: req.wallet_address,
        contribution_amount: req.contribution_amount,
        is_lender: req.is_lender,
        vetted: req.vetted,
    };
    match state.handle.join(member).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /chain/members/:id/leave`
pub async fn leave(
    State(state): State<Arc<ApiState>>,
    Path(member_id): Path<String>,
) -> Response {
    match state.handle.leave(member_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /chain/loans`
pub async fn request_loan(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<LoanRequest>,
) -> Response {
    match state
        .handle
        .request_loan(req.borrower_id, req.lender_id, req.amount, req.due_date)
        .await
    {
        Ok(loan_id) => (
            StatusCode::CREATED,
            Json(LoanCreatedResponse { loan_id }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /chain/loans/:id/approve`
pub async fn approve_loan(
    State(state): State<Arc<ApiState>>,
    Path(loan_id): Path<u64>,
    Json(req): Json<ApproveRequest>,
) -> Response {
    match state.handle.approve_loan(loan_id, req.lender_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /chain/loans/:id/repay`
pub async fn repay_loan(
    State(state): State<Arc<ApiState>>,
    Path(loan_id): Path<u64>,
    Json(req): Json<RepayRequest>,
) -> Response {
    match state.handle.repay_loan(loan_id, req.borrower_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /chain/refresh` — re-fetch the snapshot from the directory.
pub async fn refresh(State(state): State<Arc<ApiState>>) -> Response {
    match state.handle.refresh().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}
