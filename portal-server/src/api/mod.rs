//! HTTP API
//!
//! Thin handlers over the progression engine. Auth lives outside this
//! service; admin routes take the acting `admin_id` from the payload, as
//! supplied by the gateway.

pub mod admin;
pub mod health;
pub mod members;
pub mod milestones;
pub mod points;
pub mod progression;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // Members
        .route("/api/members", post(members::create))
        .route("/api/members/{id}", get(members::get_by_id))
        .route("/api/members/{id}/activate", post(members::activate))
        // Points ledger
        .route("/api/members/{id}/points/award", post(points::award))
        .route("/api/members/{id}/points/spend", post(points::spend))
        .route("/api/members/{id}/points/balance", get(points::balance))
        .route("/api/members/{id}/points/history", get(points::history))
        // Progression
        .route("/api/members/{id}/progression", get(progression::snapshot))
        .route("/api/members/{id}/progression/check", post(progression::check))
        .route("/api/members/{id}/activity", post(progression::record_activity))
        // Milestones
        .route("/api/members/{id}/milestones", get(milestones::list))
        .route("/api/milestones/{id}/celebrate", post(milestones::celebrate))
        // Admin back-office
        .route("/api/admin/advancement-requests", get(admin::pending_requests))
        .route(
            "/api/admin/advancement-requests/{id}/review",
            post(admin::review_request),
        )
        .route("/api/admin/members/{id}/advance", post(admin::manual_advance))
        .route("/api/admin/advancements/recent", get(admin::recent_advancements))
        .route(
            "/api/admin/settings/advancement-mode",
            get(admin::get_advancement_mode).put(admin::set_advancement_mode),
        )
        .route("/api/admin/audit", get(admin::audit_log))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
