use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use super::{check_staff, now};
use crate::errors::AppError;
use crate::models::Barber;
use crate::services::chairs::{self, NewBarber};
use crate::services::events;
use crate::state::AppState;

// POST /api/salons/:salon_id/barbers
pub async fn register_barber(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(salon_id): Path<String>,
    Json(body): Json<NewBarber>,
) -> Result<(StatusCode, Json<Barber>), AppError> {
    check_staff(&headers, &state.config.staff_token)?;

    let mut db = state.conn()?;
    let barber = chairs::register_barber(&mut db, now(), &salon_id, &body)?;

    Ok((StatusCode::CREATED, Json(barber)))
}

// GET /api/salons/:salon_id/barbers
pub async fn list_barbers(
    State(state): State<Arc<AppState>>,
    Path(salon_id): Path<String>,
) -> Result<Json<Vec<Barber>>, AppError> {
    let db = state.conn()?;
    Ok(Json(chairs::list_barbers(&db, &salon_id)?))
}

// POST /api/barbers/:barber_id/break
#[derive(Deserialize)]
pub struct BreakRequest {
    pub on_break: bool,
}

pub async fn set_break(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(barber_id): Path<String>,
    Json(body): Json<BreakRequest>,
) -> Result<Json<Barber>, AppError> {
    check_staff(&headers, &state.config.staff_token)?;

    let outcome = {
        let mut db = state.conn()?;
        chairs::set_break(&mut db, now(), &barber_id, body.on_break)?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}

// POST /api/barbers/:barber_id/reconcile
pub async fn reconcile_barber(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(barber_id): Path<String>,
) -> Result<Json<Barber>, AppError> {
    check_staff(&headers, &state.config.staff_token)?;

    let outcome = {
        let mut db = state.conn()?;
        chairs::reconcile_barber(&mut db, &state.config.policy, now(), &barber_id)?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}
