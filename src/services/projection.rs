//! Read-side views. Each one first brings the salon up to `now` (expiry sweep
//! and chair reconciliation) so a stale RED booking is never shown as live.

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::config::QueuePolicy;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    Barber, BarberQueueView, BarberStatus, BarberSummary, BookedEntry, Booking, CustomerView,
    QueueStats, QueueStatus, SalonView, ServingEntry, WaitingEntry,
};
use crate::services::chairs::refresh_salon;
use crate::services::queue::{self, Outcome};
use crate::services::{booking_code, timing};

pub fn salon_view(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    salon_id: &str,
) -> Result<Outcome<SalonView>, AppError> {
    let tx = queue::begin(conn)?;
    if queries::list_barbers(&tx, salon_id)?.is_empty() {
        return Err(AppError::NotFound(format!("salon {salon_id}")));
    }

    let mut events = vec![];
    refresh_salon(&tx, policy, &now, salon_id, &mut events)?;

    let barbers = queries::list_barbers(&tx, salon_id)?;
    let mut summaries = Vec::with_capacity(barbers.len());
    for barber in &barbers {
        summaries.push(summarize(&tx, policy, &now, barber)?);
    }
    let total_booked = queries::count_salon_bookings(&tx, salon_id, QueueStatus::Red)?;
    tx.commit()?;

    let total_serving = summaries
        .iter()
        .filter(|s| s.status == BarberStatus::Occupied)
        .count() as i64;
    let total_waiting = summaries.iter().map(|s| s.queue_length).sum();

    let working: Vec<i64> = summaries
        .iter()
        .filter(|s| s.status != BarberStatus::Break)
        .map(|s| s.estimated_wait_minutes)
        .collect();
    let average_wait_minutes = if working.is_empty() {
        0
    } else {
        working.iter().sum::<i64>() / working.len() as i64
    };

    Ok(Outcome {
        value: SalonView {
            salon_id: salon_id.to_string(),
            barbers: summaries,
            total_serving,
            total_waiting,
            total_booked,
            average_wait_minutes,
            generated_at: now,
        },
        events,
    })
}

fn summarize(
    conn: &Connection,
    policy: &QueuePolicy,
    now: &NaiveDateTime,
    barber: &Barber,
) -> Result<BarberSummary, AppError> {
    let occupied = barber.current_status == BarberStatus::Occupied;
    let current_customer = match (occupied, barber.current_booking_id.as_deref()) {
        (true, Some(id)) => queries::get_booking_by_id(conn, id)?.map(|b| b.customer_name),
        _ => None,
    };
    let remaining = timing::remaining_service_minutes(barber, now);

    Ok(BarberSummary {
        barber_id: barber.id.clone(),
        name: barber.name.clone(),
        chair_number: barber.chair_number,
        status: barber.current_status,
        current_customer,
        time_left_minutes: occupied.then_some(remaining),
        is_overtime: timing::is_overtime(barber, now),
        queue_length: barber.queue_length,
        estimated_wait_minutes: timing::estimate_wait(
            remaining,
            barber.queue_length,
            policy.average_service_minutes,
        ),
    })
}

pub fn barber_queue_view(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    salon_id: &str,
    barber_id: &str,
) -> Result<Outcome<BarberQueueView>, AppError> {
    let tx = queue::begin(conn)?;
    let barber = queries::get_barber(&tx, barber_id)?
        .filter(|b| b.salon_id == salon_id)
        .ok_or_else(|| AppError::NotFound(format!("barber {barber_id} in salon {salon_id}")))?;

    let mut events = vec![];
    refresh_salon(&tx, policy, &now, salon_id, &mut events)?;
    let barber = queue::load_barber(&tx, &barber.id)?;

    let current = match barber.current_booking_id.as_deref() {
        Some(id) if barber.current_status == BarberStatus::Occupied => queries::get_booking_by_id(&tx, id)?
            .filter(|b| b.queue_status == QueueStatus::Green)
            .map(|b| serving_entry(b, &barber, &now)),
        _ => None,
    };
    let remaining = timing::remaining_service_minutes(&barber, &now);

    let waiting: Vec<WaitingEntry> = queries::list_waiting(&tx, barber_id)?
        .into_iter()
        .enumerate()
        .map(|(ahead, booking)| WaitingEntry {
            booking,
            position: ahead as i64 + 1,
            estimated_wait_minutes: timing::estimate_wait(
                remaining,
                ahead as i64,
                policy.average_service_minutes,
            ),
        })
        .collect();

    let booked: Vec<BookedEntry> = queries::list_booked(&tx, barber_id)?
        .into_iter()
        .map(|booking| BookedEntry {
            expires_in_minutes: timing::minutes_until(&booking.expires_at, &now),
            booking,
        })
        .collect();
    tx.commit()?;

    let stats = QueueStats {
        waiting_count: waiting.len() as i64,
        booked_count: booked.len() as i64,
        estimated_wait_minutes: timing::estimate_wait(
            remaining,
            waiting.len() as i64,
            policy.average_service_minutes,
        ),
        average_service_minutes: policy.average_service_minutes,
    };

    Ok(Outcome {
        value: BarberQueueView {
            salon_id: salon_id.to_string(),
            barber_id: barber.id,
            barber_name: barber.name,
            chair_number: barber.chair_number,
            status: barber.current_status,
            current,
            waiting,
            booked,
            stats,
            generated_at: now,
        },
        events,
    })
}

fn serving_entry(booking: Booking, barber: &Barber, now: &NaiveDateTime) -> ServingEntry {
    let end = service_end(&booking, Some(barber)).unwrap_or(*now);
    let elapsed = booking
        .service_started_at
        .map(|start| timing::minutes_since(&start, now))
        .unwrap_or(0);

    ServingEntry {
        booking,
        elapsed_minutes: elapsed,
        remaining_minutes: timing::minutes_until(&end, now),
        overtime_minutes: timing::minutes_since(&end, now),
        is_overtime: *now > end,
    }
}

/// End of a GREEN booking's service window: the chair's window while the
/// barber holds it, otherwise start plus selected duration.
fn service_end(booking: &Booking, barber: Option<&Barber>) -> Option<NaiveDateTime> {
    let held = barber
        .filter(|b| b.current_booking_id.as_deref() == Some(booking.id.as_str()))
        .and_then(|b| b.current_service_end);
    held.or_else(|| {
        let start = booking.service_started_at?;
        let minutes = booking.selected_duration.unwrap_or(booking.estimated_duration);
        Some(start + Duration::minutes(minutes as i64))
    })
}

/// Status, position and timing for one customer, looked up by booking id or code.
pub fn customer_view(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    key: &str,
) -> Result<Outcome<CustomerView>, AppError> {
    let tx = queue::begin(conn)?;
    let found = match queries::get_booking_by_id(&tx, key)? {
        Some(booking) => Some(booking),
        None => match booking_code::normalize(key) {
            Some(code) => queries::get_booking_by_code(&tx, &code)?,
            None => None,
        },
    };
    let booking = found.ok_or_else(|| AppError::NotFound(format!("booking {key}")))?;

    let mut events = vec![];
    refresh_salon(&tx, policy, &now, &booking.salon_id, &mut events)?;
    let booking = queue::load_booking(&tx, &booking.id)?;
    let barber = queries::get_barber(&tx, &booking.barber_id)?;
    let remaining_current = barber
        .as_ref()
        .map(|b| timing::remaining_service_minutes(b, &now))
        .unwrap_or(0);
    let queue_length = barber.as_ref().map(|b| b.queue_length).unwrap_or(0);

    let mut view = CustomerView {
        booking_id: booking.id.clone(),
        booking_code: booking.booking_code.clone(),
        status: booking.queue_status,
        barber_id: booking.barber_id.clone(),
        position: None,
        estimated_wait_minutes: None,
        expires_in_minutes: None,
        elapsed_minutes: None,
        remaining_minutes: None,
        is_overtime: false,
        is_expired: timing::is_expired(&booking, &now, policy),
        generated_at: now,
    };

    match booking.queue_status {
        QueueStatus::Red => {
            view.expires_in_minutes = Some(timing::minutes_until(&booking.expires_at, &now));
            view.estimated_wait_minutes = Some(timing::estimate_wait(
                remaining_current,
                queue_length,
                policy.average_service_minutes,
            ));
        }
        QueueStatus::Orange => {
            let ahead = queries::list_waiting(&tx, &booking.barber_id)?
                .iter()
                .position(|b| b.id == booking.id)
                .unwrap_or(0) as i64;
            view.position = Some(ahead + 1);
            view.estimated_wait_minutes = Some(timing::estimate_wait(
                remaining_current,
                ahead,
                policy.average_service_minutes,
            ));
        }
        QueueStatus::Green => {
            if let Some(end) = service_end(&booking, barber.as_ref()) {
                view.remaining_minutes = Some(timing::minutes_until(&end, &now));
                view.is_overtime = now > end;
            }
            view.elapsed_minutes = booking
                .service_started_at
                .map(|start| timing::minutes_since(&start, &now));
        }
        QueueStatus::Completed => {
            view.elapsed_minutes = booking.actual_duration.map(i64::from);
        }
        QueueStatus::Expired => {}
    }
    tx.commit()?;

    Ok(Outcome {
        value: view,
        events,
    })
}
