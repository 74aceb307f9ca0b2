use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::QueuePolicy;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Barber, BarberStatus, QueueEvent, QueueEventKind, QueueStatus};
use crate::services::queue::{self, Outcome};

#[derive(Debug, Clone, Deserialize)]
pub struct NewBarber {
    pub name: String,
    pub chair_number: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub expired: usize,
    pub auto_completed: usize,
    pub promoted: usize,
}

pub fn register_barber(
    conn: &mut Connection,
    now: NaiveDateTime,
    salon_id: &str,
    req: &NewBarber,
) -> Result<Barber, AppError> {
    let salon_id = salon_id.trim();
    let name = req.name.trim();
    if salon_id.is_empty() || name.is_empty() {
        return Err(AppError::Validation("salon_id and name are required".into()));
    }
    if req.chair_number < 1 {
        return Err(AppError::Validation("chair_number must be positive".into()));
    }

    let tx = queue::begin(conn)?;
    if queries::chair_taken(&tx, salon_id, req.chair_number)? {
        return Err(AppError::Validation(format!(
            "chair {} is already assigned in salon {salon_id}",
            req.chair_number
        )));
    }

    let barber = Barber {
        id: uuid::Uuid::new_v4().to_string(),
        salon_id: salon_id.to_string(),
        name: name.to_string(),
        chair_number: req.chair_number,
        current_status: BarberStatus::Available,
        current_booking_id: None,
        current_service_start: None,
        current_service_end: None,
        queue_length: 0,
        created_at: now,
        updated_at: now,
    };
    queries::insert_barber(&tx, &barber)?;
    tx.commit()?;

    tracing::info!(barber_id = %barber.id, salon_id, chair = barber.chair_number, "barber registered");
    Ok(barber)
}

pub fn list_barbers(conn: &Connection, salon_id: &str) -> Result<Vec<Barber>, AppError> {
    Ok(queries::list_barbers(conn, salon_id)?)
}

pub fn get_barber(conn: &Connection, barber_id: &str) -> Result<Barber, AppError> {
    queue::load_barber(conn, barber_id)
}

/// AVAILABLE <-> BREAK. Toggling to the state the chair is already in is a no-op.
pub fn set_break(
    conn: &mut Connection,
    now: NaiveDateTime,
    barber_id: &str,
    on_break: bool,
) -> Result<Outcome<Barber>, AppError> {
    let tx = queue::begin(conn)?;
    let barber = queue::load_barber(&tx, barber_id)?;

    let (from, to) = match (barber.current_status, on_break) {
        (BarberStatus::Occupied, _) => {
            return Err(AppError::BarberBusy(format!(
                "barber {} is serving a customer",
                barber.name
            )));
        }
        (BarberStatus::Available, false) | (BarberStatus::Break, true) => {
            return Ok(Outcome {
                value: barber,
                events: vec![],
            });
        }
        (BarberStatus::Available, true) => (BarberStatus::Available, BarberStatus::Break),
        (BarberStatus::Break, false) => (BarberStatus::Break, BarberStatus::Available),
    };

    if !queries::set_barber_status(&tx, barber_id, from, to, &now)? {
        return Err(AppError::BarberBusy(format!("barber {} changed state", barber.name)));
    }
    let event = queries::insert_queue_event(
        &tx,
        &barber.salon_id,
        barber_id,
        None,
        QueueEventKind::BarberStatusChanged,
        None,
        to.as_str(),
        &now,
    )?;
    let updated = queue::load_barber(&tx, barber_id)?;
    tx.commit()?;

    tracing::info!(barber_id, status = to.as_str(), "barber status changed");

    Ok(Outcome {
        value: updated,
        events: vec![event],
    })
}

/// Auto-completion safety net for one chair. Idempotent: a chair that is idle
/// or still inside its service window is left alone.
pub fn reconcile_barber(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    barber_id: &str,
) -> Result<Outcome<Barber>, AppError> {
    let tx = queue::begin(conn)?;
    let barber = queue::load_barber(&tx, barber_id)?;
    let mut events = vec![];
    reconcile_chair(&tx, policy, &now, &barber, &mut events)?;
    let barber = queue::load_barber(&tx, barber_id)?;
    tx.commit()?;

    Ok(Outcome {
        value: barber,
        events,
    })
}

/// Expiry sweep plus chair reconciliation for a whole salon.
pub fn reconcile_salon(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    salon_id: &str,
) -> Result<Outcome<ReconcileReport>, AppError> {
    let tx = queue::begin(conn)?;
    if queries::list_barbers(&tx, salon_id)?.is_empty() {
        return Err(AppError::NotFound(format!("salon {salon_id}")));
    }
    let mut events = vec![];
    refresh_salon(&tx, policy, &now, salon_id, &mut events)?;
    tx.commit()?;

    let count = |kind: QueueEventKind| events.iter().filter(|e| e.kind == kind).count();
    let report = ReconcileReport {
        expired: count(QueueEventKind::Expired),
        auto_completed: count(QueueEventKind::AutoCompleted),
        promoted: events
            .iter()
            .filter(|e| e.kind == QueueEventKind::ServiceStarted && e.detail.ends_with("promoted"))
            .count(),
    };

    Ok(Outcome {
        value: report,
        events,
    })
}

/// Brings a salon's stored state up to `now`: stale RED bookings expire and
/// chairs overdue past the overtime grace are auto-completed.
pub(crate) fn refresh_salon(
    conn: &Connection,
    policy: &QueuePolicy,
    now: &NaiveDateTime,
    salon_id: &str,
    events: &mut Vec<QueueEvent>,
) -> Result<(), AppError> {
    queue::expire_stale(conn, policy, now, Some(salon_id), events)?;
    for barber in queries::list_barbers(conn, salon_id)? {
        reconcile_chair(conn, policy, now, &barber, events)?;
    }
    Ok(())
}

fn reconcile_chair(
    conn: &Connection,
    policy: &QueuePolicy,
    now: &NaiveDateTime,
    barber: &Barber,
    events: &mut Vec<QueueEvent>,
) -> Result<(), AppError> {
    if barber.current_status != BarberStatus::Occupied {
        return Ok(());
    }

    let held = match barber.current_booking_id.as_deref() {
        Some(id) => queries::get_booking_by_id(conn, id)?,
        None => None,
    };

    match held {
        Some(booking) if booking.queue_status == QueueStatus::Green => {
            let Some(end) = barber.current_service_end else {
                return Ok(());
            };
            if *now > end + Duration::minutes(policy.overtime_grace_minutes) {
                tracing::info!(
                    barber_id = %barber.id,
                    booking_id = %booking.id,
                    service_end = %end,
                    "auto-completing overdue service"
                );
                queue::complete_service(conn, &booking, now, QueueEventKind::AutoCompleted, events)?;
            }
        }
        _ => {
            tracing::warn!(
                barber_id = %barber.id,
                booking_id = ?barber.current_booking_id,
                "chair held a booking that is not in service, releasing"
            );
            queries::force_release_barber(conn, &barber.id, now)?;
        }
    }
    Ok(())
}
