pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// All HTTP routes, without transport layers (tracing/CORS are added in main).
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/api/salons/:salon_id/barbers",
            get(handlers::barbers::list_barbers).post(handlers::barbers::register_barber),
        )
        .route("/api/barbers/:barber_id/break", post(handlers::barbers::set_break))
        .route(
            "/api/barbers/:barber_id/reconcile",
            post(handlers::barbers::reconcile_barber),
        )
        .route("/api/walkins", post(handlers::walkins::create_walkin))
        .route("/api/walkins/verify", post(handlers::walkins::verify_arrival))
        .route(
            "/api/walkins/:booking_id/start",
            post(handlers::walkins::start_service),
        )
        .route("/api/walkins/:booking_id/end", post(handlers::walkins::end_service))
        .route(
            "/api/walkins/:booking_id/extend",
            post(handlers::walkins::extend_service),
        )
        .route(
            "/api/walkins/:booking_id/feedback",
            post(handlers::walkins::submit_feedback),
        )
        .route("/api/walkins/:booking_id", get(handlers::walkins::get_walkin))
        .route("/api/salons/:salon_id/queue", get(handlers::queue::salon_queue))
        .route(
            "/api/salons/:salon_id/barbers/:barber_id/queue",
            get(handlers::queue::barber_queue),
        )
        .route(
            "/api/salons/:salon_id/reconcile",
            post(handlers::queue::reconcile_salon),
        )
        .route("/api/salons/:salon_id/events", get(handlers::queue::events_stream))
        .with_state(state)
}
