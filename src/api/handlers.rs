use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AlertToggles;
use crate::state::{BalanceRecord, DelinquencyRecord, Target};

/// Application state shared across handlers
pub struct AppState {
    pub targets: Vec<Arc<Target>>,
}

impl AppState {
    fn find(&self, id: &str) -> Option<&Arc<Target>> {
        self.targets.iter().find(|t| t.id() == id)
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Status
// ============================================================================

#[derive(Serialize)]
pub struct TargetSummary {
    pub id: String,
    pub name: String,
    pub identity: String,
    pub min_balance: f64,
    pub delinquent: usize,
    pub low_balance: usize,
    pub alerts: AlertToggles,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub targets: Vec<TargetSummary>,
}

#[derive(Serialize)]
pub struct TargetDetail {
    #[serde(flatten)]
    pub summary: TargetSummary,
    pub delinquency: HashMap<String, DelinquencyRecord>,
    pub balances: HashMap<String, BalanceRecord>,
}

fn summarize(target: &Target) -> (TargetSummary, crate::state::TargetState) {
    let state = target.snapshot();
    let config = &target.config;
    let summary = TargetSummary {
        id: config.id.clone(),
        name: config.name.clone(),
        identity: config.identity.clone(),
        min_balance: config.min_balance,
        delinquent: state.delinquent_count(),
        low_balance: state.low_balance_count(),
        alerts: config.alerts,
    };
    (summary, state)
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let targets = state
        .targets
        .iter()
        .map(|t| summarize(t).0)
        .collect();

    Json(StatusResponse { targets })
}

pub async fn target_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TargetDetail>, ApiError> {
    let target = state
        .find(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Target '{}' not found", id)))?;

    let (summary, snapshot) = summarize(target);
    Ok(Json(TargetDetail {
        summary,
        delinquency: snapshot.delinquency,
        balances: snapshot.balances,
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
