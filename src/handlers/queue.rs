use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use super::{check_staff, now};
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BarberQueueView, QueueEvent, SalonView};
use crate::services::chairs::{self, ReconcileReport};
use crate::services::{events, projection};
use crate::state::AppState;

// GET /api/salons/:salon_id/queue
pub async fn salon_queue(
    State(state): State<Arc<AppState>>,
    Path(salon_id): Path<String>,
) -> Result<Json<SalonView>, AppError> {
    let outcome = {
        let mut db = state.conn()?;
        projection::salon_view(&mut db, &state.config.policy, now(), &salon_id)?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}

// GET /api/salons/:salon_id/barbers/:barber_id/queue
pub async fn barber_queue(
    State(state): State<Arc<AppState>>,
    Path((salon_id, barber_id)): Path<(String, String)>,
) -> Result<Json<BarberQueueView>, AppError> {
    let outcome = {
        let mut db = state.conn()?;
        projection::barber_queue_view(&mut db, &state.config.policy, now(), &salon_id, &barber_id)?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}

// POST /api/salons/:salon_id/reconcile
pub async fn reconcile_salon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(salon_id): Path<String>,
) -> Result<Json<ReconcileReport>, AppError> {
    check_staff(&headers, &state.config.staff_token)?;

    let outcome = {
        let mut db = state.conn()?;
        chairs::reconcile_salon(&mut db, &state.config.policy, now(), &salon_id)?
    };
    events::publish(&state, outcome.events).await;

    Ok(Json(outcome.value))
}

// GET /api/salons/:salon_id/events (SSE)
#[derive(Deserialize)]
pub struct SseQuery {
    pub last_id: Option<i64>,
}

fn to_sse(event: &QueueEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default()
        .id(event.id.to_string())
        .event(event.kind.as_str())
        .data(data)
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Path(salon_id): Path<String>,
    Query(query): Query<SseQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    let last_id = query.last_id.unwrap_or(0);

    // Subscribe before the catch-up read so nothing falls between the two.
    let rx = state.events_tx.subscribe();
    let catchup = {
        let db = state.conn()?;
        queries::get_all_queue_events_since(&db, &salon_id, last_id)?
    };
    let high_water = catchup.last().map(|e| e.id).unwrap_or(last_id);

    let catchup_stream =
        tokio_stream::iter(catchup.into_iter().map(|e| Ok::<_, Infallible>(to_sse(&e))));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(event) if event.salon_id == salon_id && event.id > high_water => {
            Some(Ok(to_sse(&event)))
        }
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "sse subscriber lagged");
            None
        }
    });

    let keepalive_stream =
        IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
            .map(|_| Ok(Event::default().comment("keepalive")));

    let merged = catchup_stream.chain(live_stream).merge(keepalive_stream);

    Ok(Sse::new(merged))
}
