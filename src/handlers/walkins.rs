use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::{check_staff, now};
use crate::errors::AppError;
use crate::models::{Booking, CustomerView};
use crate::services::queue::{self, CreatedBooking, FeedbackInput, NewBooking, ServiceEnded};
use crate::services::{booking_code, events, projection};
use crate::state::AppState;

// POST /api/walkins
pub async fn create_walkin(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewBooking>,
) -> Result<(StatusCode, Json<CreatedBooking>), AppError> {
    let outcome = {
        let mut db = state.conn()?;
        queue::create_booking(&mut db, &state.config.policy, now(), &body)?
    };
    events::publish(&state, outcome.events).await;

    Ok((StatusCode::CREATED, Json(outcome.value)))
}

// POST /api/walkins/verify
#[derive(Deserialize)]
pub struct VerifyRequest {
    pub booking_code: Option<String>,
    pub qr_payload: Option<String>,
    #[serde(default)]
    pub salon_id: String,
}

pub async fn verify_arrival(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<Booking>, AppError> {
    let (code, salon_id) = match (body.booking_code, body.qr_payload) {
        (Some(code), _) => (code, body.salon_id),
        (None, Some(payload)) => {
            let qr = booking_code::decode_qr(&payload)
                .ok_or_else(|| AppError::Validation("unreadable QR payload".into()))?;
            if !body.salon_id.is_empty() && body.salon_id != qr.salon_id {
                return Err(AppError::NotFound(format!("booking {}", qr.code)));
            }
            (qr.code, qr.salon_id)
        }
        (None, None) => {
            return Err(AppError::Validation("booking_code or qr_payload is required".into()));
        }
    };

    let outcome = {
        let mut db = state.conn()?;
        queue::verify_arrival(&mut db, &state.config.policy, now(), &code, &salon_id)?
    };
    // A late scan has already committed its EXPIRED write; publish it either way.
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value.into_booking()?))
}

// POST /api/walkins/:booking_id/start
#[derive(Deserialize)]
pub struct StartRequest {
    pub barber_id: String,
    pub duration: i32,
}

pub async fn start_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    Json(body): Json<StartRequest>,
) -> Result<Json<Booking>, AppError> {
    check_staff(&headers, &state.config.staff_token)?;

    let outcome = {
        let mut db = state.conn()?;
        queue::start_service(
            &mut db,
            &state.config.policy,
            now(),
            &booking_id,
            &body.barber_id,
            body.duration,
        )?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}

// POST /api/walkins/:booking_id/end
#[derive(Deserialize)]
pub struct EndRequest {
    pub barber_id: String,
}

pub async fn end_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    Json(body): Json<EndRequest>,
) -> Result<Json<ServiceEnded>, AppError> {
    check_staff(&headers, &state.config.staff_token)?;

    let outcome = {
        let mut db = state.conn()?;
        queue::end_service(&mut db, now(), &booking_id, &body.barber_id)?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}

// POST /api/walkins/:booking_id/extend
#[derive(Deserialize)]
pub struct ExtendRequest {
    pub barber_id: String,
    pub minutes: i32,
}

pub async fn extend_service(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<String>,
    Json(body): Json<ExtendRequest>,
) -> Result<Json<Booking>, AppError> {
    check_staff(&headers, &state.config.staff_token)?;

    let outcome = {
        let mut db = state.conn()?;
        queue::extend_service(
            &mut db,
            &state.config.policy,
            now(),
            &booking_id,
            &body.barber_id,
            body.minutes,
        )?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}

// POST /api/walkins/:booking_id/feedback
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
    Json(body): Json<FeedbackInput>,
) -> Result<Json<Booking>, AppError> {
    let outcome = {
        let mut db = state.conn()?;
        queue::submit_feedback(&mut db, now(), &booking_id, &body)?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}

// GET /api/walkins/:key
pub async fn get_walkin(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<CustomerView>, AppError> {
    let outcome = {
        let mut db = state.conn()?;
        projection::customer_view(&mut db, &state.config.policy, now(), &key)?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}
