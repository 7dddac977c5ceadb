use axum::{
    middleware::{self as axum_middleware},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::client::TokenManagedClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::middleware;
use crate::store::Repository;

mod dialer;
mod smartflo;

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repository: Arc<dyn Repository>,
    /// Absent when no Smartflo service identity is configured
    pub dialer: Option<Arc<TokenManagedClient>>,
}

impl AppState {
    pub fn dialer(&self) -> Result<&Arc<TokenManagedClient>, ApiError> {
        self.dialer.as_ref().ok_or_else(|| {
            ApiError::ConfigMissing("SMARTFLO_EMAIL / SMARTFLO_PASSWORD".to_string())
        })
    }
}

/// Build the application with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let cors = middleware::cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(health_routes())
        .merge(dialer_routes(state.clone()))
        .merge(smartflo_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Health check routes (no authentication required)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// CRM dialer routes (require authentication)
pub fn dialer_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/dialer/click-to-call", post(dialer::click_to_call_handler))
        .route(
            "/api/dialer/schedule-callback",
            post(dialer::schedule_callback_handler),
        )
        .route("/api/dialer/call-logs", get(dialer::call_logs_handler))
        .route(
            "/api/dialer/call-logs/:lead_id",
            get(dialer::lead_call_history_handler),
        )
        .route("/api/dialer/manual-log", post(dialer::manual_log_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// Smartflo administration routes (require authentication)
pub fn smartflo_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/smartflo/test-connection",
            get(smartflo::test_connection_handler),
        )
        .route("/api/smartflo/agents", get(smartflo::agents_handler))
        .route(
            "/api/smartflo/dispositions",
            get(smartflo::dispositions_handler),
        )
        .route("/api/smartflo/cdr", get(smartflo::cdr_handler))
        .route(
            "/api/smartflo/lead-lists",
            post(smartflo::create_lead_list_handler),
        )
        .route(
            "/api/smartflo/lead-lists/:id/leads",
            post(smartflo::add_lead_handler),
        )
        .route(
            "/api/smartflo/campaigns",
            post(smartflo::create_campaign_handler),
        )
        .route(
            "/api/smartflo/campaigns/:id",
            get(smartflo::get_campaign_handler),
        )
        .route(
            "/api/smartflo/campaigns/:id/status",
            put(smartflo::update_campaign_status_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
///
/// This endpoint does not require authentication (for load balancers).
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Smartflo Dialer is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}
