//! # REST API
//!
//! Builds the axum router that exposes the chain over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path               | Description                             |
//! |--------|--------------------|-----------------------------------------|
//! | GET    | `/health`          | Liveness probe                          |
//! | GET    | `/height`          | Tip height (`null` when empty), records |
//! | GET    | `/block/latest`    | Block at the tip                        |
//! | GET    | `/block/:height`   | Stored block by height                  |
//! | POST   | `/block`           | Append a block with `{"body": ...}`     |
//! | GET    | `/validate`        | Full chain validation report            |
//! | GET    | `/validate/:height`| Self-hash check of one block            |
//!
//! Engine errors map to status codes in [`error_response`].

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use hashchain::storage::{BlockFault, ChainEngine, ChainError, SledStore};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything sits behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The chain engine. Appends serialize inside the engine.
    pub chain: Arc<ChainEngine<SledStore>>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Creates the axum router with all API routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/height", get(height_handler))
        .route("/block", post(append_handler))
        .route("/block/latest", get(latest_block_handler))
        .route("/block/:height", get(block_by_height_handler))
        .route("/validate", get(validate_chain_handler))
        .route("/validate/:height", get(validate_block_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeightResponse {
    pub height: Option<u64>,
    /// Number of stored records. Differs from `height + 1` only when the
    /// store has been written to out of band.
    pub blocks: u64,
}

/// Body of `POST /block`.
#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    #[serde(default)]
    pub body: Value,
}

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub checked: u64,
    pub invalid_heights: Vec<u64>,
    pub faults: Vec<BlockFault>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockValidationResponse {
    pub height: u64,
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps an engine error onto an HTTP status and JSON error body.
pub fn error_response(err: ChainError) -> Response {
    let status = match &err {
        ChainError::NotFound(_) => StatusCode::NOT_FOUND,
        ChainError::Corrupt { .. } | ChainError::HeightOverflow(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ChainError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChainError::Uninitialized => StatusCode::CONFLICT,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` - liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        version: state.version.clone(),
    })
}

async fn height_handler(State(state): State<AppState>) -> Response {
    let result = state
        .chain
        .height()
        .and_then(|height| Ok((height, state.chain.block_count()?)));
    match result {
        Ok((height, blocks)) => Json(HeightResponse { height, blocks }).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /block/latest` - the block at the tip; 404 for an empty store.
async fn latest_block_handler(State(state): State<AppState>) -> Response {
    match state.chain.latest_block() {
        Ok(Some(block)) => Json(block).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "chain is empty".into(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /block/:height` - returns the stored block exactly as decoded.
async fn block_by_height_handler(
    State(state): State<AppState>,
    Path(height): Path<u64>,
) -> Response {
    match state.chain.get_block(height) {
        Ok(block) => Json(block).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /block` - appends a block. `body` must be present and not null.
async fn append_handler(
    State(state): State<AppState>,
    Json(req): Json<AppendRequest>,
) -> Response {
    if req.body.is_null() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "missing block body".into(),
            }),
        )
            .into_response();
    }

    let timer = state.metrics.append_latency_seconds.start_timer();
    let result = state.chain.append(req.body);
    timer.observe_duration();

    match result {
        Ok(block) => {
            state.metrics.blocks_appended_total.inc();
            state.metrics.observe_height(block.height);
            tracing::info!(height = block.height, hash = %block.hash, "block appended via api");
            (StatusCode::CREATED, Json(block)).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `GET /validate` - walks the whole chain.
async fn validate_chain_handler(State(state): State<AppState>) -> Response {
    state.metrics.validations_total.inc();
    match state.chain.validate_chain() {
        Ok(report) => {
            state
                .metrics
                .validation_faults_total
                .inc_by(report.faults.len() as u64);
            Json(ValidationResponse {
                valid: report.is_valid(),
                checked: report.checked,
                invalid_heights: report.invalid_heights(),
                faults: report.faults,
            })
            .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `GET /validate/:height` - checks one block's self-hash only.
async fn validate_block_handler(
    State(state): State<AppState>,
    Path(height): Path<u64>,
) -> Response {
    state.metrics.validations_total.inc();
    match state.chain.validate_block(height) {
        Ok(valid) => {
            if !valid {
                state.metrics.validation_faults_total.inc();
            }
            Json(BlockValidationResponse { height, valid }).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
