//! API routes

pub mod alerts;
pub mod auth;
pub mod campaigns;
pub mod checklist;
pub mod dashboard;
pub mod drills;
pub mod extract;
pub mod notices;
pub mod occurrences;
pub mod reports;
pub mod users;
pub mod visitors;

use crate::app::AppState;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the full HTTP surface over shared state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/session", post(auth::issue_session))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route("/api/users/:id", get(users::get_user).patch(users::update_user))
        .route("/api/reports", get(reports::list_reports).post(reports::create_report))
        .route("/api/reports/:id", get(reports::get_report))
        .route("/api/reports/:id/status", patch(reports::update_status))
        .route("/api/notices", get(notices::list_notices).post(notices::create_notice))
        .route("/api/notices/:id", patch(notices::update_notice))
        .route("/api/notices/:id/read", post(notices::mark_read))
        .route("/api/visitors", get(visitors::list_visitors).post(visitors::create_visitor))
        .route("/api/visitors/active", get(visitors::list_active))
        .route("/api/visitors/:id/checkout", patch(visitors::check_out))
        .route(
            "/api/occurrences",
            get(occurrences::list_occurrences).post(occurrences::create_occurrence),
        )
        .route("/api/checklist", get(checklist::list_items).post(checklist::create_item))
        .route("/api/checklist/:id", patch(checklist::update_item))
        .route("/api/drills", get(drills::list_drills).post(drills::create_drill))
        .route("/api/drills/upcoming", get(drills::list_upcoming))
        .route(
            "/api/campaigns",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route("/api/campaigns/:id", patch(campaigns::update_campaign))
        .route("/api/campaigns/:id/read", post(campaigns::record_read))
        .route(
            "/api/emergency-alerts",
            get(alerts::list_alerts).post(alerts::trigger_alert),
        )
        .route("/api/emergency-alerts/active", get(alerts::list_active))
        .route("/api/emergency-alerts/active/changes", get(alerts::await_active))
        .route("/api/emergency-alerts/:id/resolve", patch(alerts::resolve_alert))
        .route("/api/dashboard/stats", get(dashboard::stats))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
