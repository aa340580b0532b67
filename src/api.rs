//! REST API for the portfolio assistant
//!
//! Thin HTTP surface over the orchestrator. Authentication happens upstream;
//! `userId` is taken as given.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::Orchestrator;
use crate::error::AssistantError;
use crate::models::{QueryContext, UserPreferences};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub guest_session_id: Option<String>,
    #[serde(default)]
    pub is_guest_mode: bool,
    #[serde(default)]
    pub portfolio_data: Option<serde_json::Value>,
    #[serde(default)]
    pub user_preferences: Option<UserPreferences>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl QueryRequest {
    pub fn context(&self) -> QueryContext {
        QueryContext {
            user_id: self.user_id.clone(),
            guest_session_id: self.guest_session_id.clone(),
            is_guest_mode: self.is_guest_mode,
            portfolio_data: self.portfolio_data.clone(),
            user_preferences: self.user_preferences.clone(),
            provider: self.provider.clone(),
            cancellation: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub message: String,
}

/// Closing prices per symbol, oldest first, for the selected portfolio.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub guest_session_id: Option<String>,
    #[serde(default)]
    pub is_guest_mode: bool,
    pub closes: HashMap<String, Vec<f64>>,
}

impl RiskRequest {
    pub fn context(&self) -> QueryContext {
        QueryContext {
            user_id: self.user_id.clone(),
            guest_session_id: self.guest_session_id.clone(),
            is_guest_mode: self.is_guest_mode,
            ..Default::default()
        }
    }
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "providers": state.orchestrator.providers(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoint
/// =============================

async fn process_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("message must not be empty".into())),
        );
    }

    info!(
        guest = req.is_guest_mode,
        provider = ?req.provider,
        "Received query request"
    );

    // A query is a unit of work: the result envelope is 200 even when the
    // command itself did not succeed.
    let result = state
        .orchestrator
        .process_query(&req.message, &req.context())
        .await;

    (StatusCode::OK, Json(ApiResponse::success(result)))
}

/// =============================
/// Classify Endpoint
/// =============================

async fn classify(
    State(state): State<ApiState>,
    Json(req): Json<ClassifyRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let decision = state.orchestrator.classify(&req.message);
    (StatusCode::OK, Json(ApiResponse::success(decision)))
}

/// =============================
/// Metrics Endpoint
/// =============================

async fn metrics(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.orchestrator.metrics()))
}

async fn prometheus_metrics(State(state): State<ApiState>) -> (StatusCode, String) {
    match state.orchestrator.metrics_text() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

/// =============================
/// Risk Endpoint
/// =============================

async fn portfolio_risk(
    State(state): State<ApiState>,
    Json(req): Json<RiskRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.risk_report(&req.context(), &req.closes).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))),
        Err(e) => {
            let status = match &e {
                AssistantError::NotFound(_) => StatusCode::NOT_FOUND,
                AssistantError::Context(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(error = %e, "Risk report failed");
            (status, Json(ApiResponse::error(e.user_message())))
        }
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(process_query))
        .route("/api/classify", post(classify))
        .route("/api/metrics", get(metrics))
        .route("/api/portfolio/risk", post(portfolio_risk))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
