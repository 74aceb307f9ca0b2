//! Walk-in queue state machine.
//!
//! Every operation runs in one IMMEDIATE transaction and checks the stored
//! status before writing, so duplicate client calls fail with
//! `InvalidTransition` instead of corrupting state. Chair assignment goes
//! through a conditional update on the barber row; the loser of a race gets
//! `BarberBusy`.

use anyhow::anyhow;
use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::config::QueuePolicy;
use crate::db::queries::{self, StatusUpdate};
use crate::errors::AppError;
use crate::models::{
    Barber, BarberStatus, Booking, BookingKind, Feedback, QueueEvent, QueueEventKind, QueueStatus,
    Ratings,
};
use crate::services::{booking_code, timing};

const CODE_ATTEMPTS: usize = 8;
/// How far ahead a pre-booking may be scheduled.
const MAX_SCHEDULE_AHEAD_DAYS: i64 = 90;

/// Result of an engine call plus the transitions it persisted, ready to publish.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<QueueEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub salon_id: String,
    pub barber_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub service: String,
    pub duration: i32,
    #[serde(default)]
    pub scheduled_for: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedBooking {
    pub booking: Booking,
    pub booking_code: String,
    pub qr_payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceEnded {
    pub booking: Booking,
    pub next_customer: Option<Booking>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackInput {
    pub ratings: Ratings,
    #[serde(default)]
    pub comment: Option<String>,
}

/// What a check-in scan resolved to. A late scan still commits the
/// RED -> EXPIRED write, so its event has to reach the caller.
#[derive(Debug, Clone)]
pub enum Arrival {
    Arrived(Booking),
    Expired(Booking),
}

impl Arrival {
    pub fn into_booking(self) -> Result<Booking, AppError> {
        match self {
            Arrival::Arrived(booking) => Ok(booking),
            Arrival::Expired(booking) => Err(AppError::Expired(booking.booking_code)),
        }
    }
}

pub(crate) fn begin(conn: &mut Connection) -> Result<Transaction<'_>, AppError> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

// ── Create ──

pub fn create_booking(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    req: &NewBooking,
) -> Result<Outcome<CreatedBooking>, AppError> {
    let salon_id = req.salon_id.trim();
    let barber_id = req.barber_id.trim();
    if salon_id.is_empty() || barber_id.is_empty() {
        return Err(AppError::Validation("salon_id and barber_id are required".into()));
    }
    let customer_name = required(&req.customer_name, "customer_name")?;
    let customer_phone = required(&req.customer_phone, "customer_phone")?;
    let service = required(&req.service, "service")?;
    validate_duration(req.duration, policy)?;

    let kind = match req.scheduled_for {
        Some(at) if at < now => {
            return Err(AppError::Validation("scheduled_for is in the past".into()));
        }
        Some(at) if at - now > Duration::days(MAX_SCHEDULE_AHEAD_DAYS) => {
            return Err(AppError::Validation(format!(
                "scheduled_for is more than {MAX_SCHEDULE_AHEAD_DAYS} days ahead"
            )));
        }
        Some(_) => BookingKind::PreBook,
        None => BookingKind::WalkIn,
    };

    let expires_at = req
        .scheduled_for
        .unwrap_or(now)
        .checked_add_signed(Duration::minutes(policy.expiry_minutes))
        .ok_or_else(|| AppError::Validation("scheduled_for is out of range".into()))?;

    let tx = begin(conn)?;

    queries::get_barber(&tx, barber_id)?
        .filter(|b| b.salon_id == salon_id)
        .ok_or_else(|| {
            AppError::Validation(format!("barber {barber_id} not found in salon {salon_id}"))
        })?;

    let booking_code = allocate_code(&tx, kind, &now)?;

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        booking_code: booking_code.clone(),
        kind,
        salon_id: salon_id.to_string(),
        barber_id: barber_id.to_string(),
        customer_name,
        customer_phone,
        service,
        queue_status: QueueStatus::Red,
        scheduled_for: req.scheduled_for,
        created_at: now,
        expires_at,
        arrived_at: None,
        service_started_at: None,
        service_ended_at: None,
        estimated_duration: req.duration,
        selected_duration: None,
        actual_duration: None,
        is_expired: false,
        feedback: None,
        queue_seq: None,
        updated_at: now,
    };
    queries::insert_booking(&tx, &booking)?;

    let event = record(
        &tx,
        &booking,
        QueueEventKind::BookingCreated,
        Some(QueueStatus::Red),
        kind.as_str(),
        &now,
    )?;
    let qr_payload = booking_code::encode_qr(&booking_code, salon_id)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        barber_id,
        salon_id,
        code = %booking_code,
        "booking created"
    );

    Ok(Outcome {
        value: CreatedBooking {
            booking,
            booking_code,
            qr_payload,
        },
        events: vec![event],
    })
}

fn allocate_code(
    conn: &Connection,
    kind: BookingKind,
    now: &NaiveDateTime,
) -> Result<String, AppError> {
    let millis = now.and_utc().timestamp_millis();
    for _ in 0..CODE_ATTEMPTS {
        let code = booking_code::generate(kind.code_prefix(), millis);
        if !queries::booking_code_exists(conn, &code)? {
            return Ok(code);
        }
        tracing::warn!(code = %code, "booking code collision, retrying");
    }
    Err(AppError::Internal(anyhow!("could not allocate a unique booking code")))
}

// ── Arrival ──

/// RED -> ORANGE when the customer's code is scanned at the salon.
pub fn verify_arrival(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    code: &str,
    salon_id: &str,
) -> Result<Outcome<Arrival>, AppError> {
    let code = booking_code::normalize(code)
        .ok_or_else(|| AppError::Validation("malformed booking code".into()))?;
    let salon_id = salon_id.trim();
    if salon_id.is_empty() {
        return Err(AppError::Validation("salon_id is required".into()));
    }

    let tx = begin(conn)?;
    let booking = queries::get_booking_by_code(&tx, &code)?
        .filter(|b| b.salon_id == salon_id)
        .ok_or_else(|| AppError::NotFound(format!("booking {code}")))?;

    match booking.queue_status {
        QueueStatus::Red => {}
        QueueStatus::Expired => return Err(AppError::Expired(code)),
        status @ (QueueStatus::Orange | QueueStatus::Green | QueueStatus::Completed) => {
            return Err(AppError::AlreadyProcessed(status));
        }
    }

    if timing::is_expired(&booking, &now, policy) {
        let mut events = vec![];
        expire_booking(&tx, &booking, &now, &mut events)?;
        let expired = load_booking(&tx, &booking.id)?;
        tx.commit()?;
        return Ok(Outcome {
            value: Arrival::Expired(expired),
            events,
        });
    }

    let seq = queries::next_queue_seq(&tx, &booking.barber_id)?;
    let update = StatusUpdate {
        arrived_at: Some(now),
        queue_seq: Some(seq),
        ..Default::default()
    };
    transition(&tx, &booking, QueueStatus::Orange, &update, &now)?;
    let queue_length = queries::refresh_queue_length(&tx, &booking.barber_id)?;

    let event = record(&tx, &booking, QueueEventKind::Arrived, Some(QueueStatus::Orange), "", &now)?;
    let arrived = load_booking(&tx, &booking.id)?;
    tx.commit()?;

    tracing::info!(
        booking_id = %arrived.id,
        barber_id = %arrived.barber_id,
        queue_length,
        "customer arrived"
    );

    Ok(Outcome {
        value: Arrival::Arrived(arrived),
        events: vec![event],
    })
}

// ── Service ──

/// ORANGE -> GREEN. The barber must be AVAILABLE at the moment of the write.
pub fn start_service(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    booking_id: &str,
    barber_id: &str,
    duration: i32,
) -> Result<Outcome<Booking>, AppError> {
    validate_duration(duration, policy)?;

    let tx = begin(conn)?;
    let booking = load_booking(&tx, booking_id)?;
    ensure_barber(&booking, barber_id)?;
    let barber = load_barber(&tx, barber_id)?;

    if booking.queue_status != QueueStatus::Orange {
        return Err(AppError::InvalidTransition {
            from: booking.queue_status,
            to: QueueStatus::Green,
        });
    }
    match barber.current_status {
        BarberStatus::Available => {}
        BarberStatus::Occupied => {
            return Err(AppError::BarberBusy(format!(
                "barber {} is serving another customer",
                barber.name
            )));
        }
        BarberStatus::Break => {
            return Err(AppError::BarberBusy(format!("barber {} is on break", barber.name)));
        }
    }

    let mut events = vec![];
    begin_service(&tx, &booking, duration, &now, "", &mut events)?;
    let started = load_booking(&tx, booking_id)?;
    tx.commit()?;

    Ok(Outcome {
        value: started,
        events,
    })
}

/// GREEN -> COMPLETED, then hands the chair to the earliest-arrived ORANGE customer.
pub fn end_service(
    conn: &mut Connection,
    now: NaiveDateTime,
    booking_id: &str,
    barber_id: &str,
) -> Result<Outcome<ServiceEnded>, AppError> {
    let tx = begin(conn)?;
    let booking = load_booking(&tx, booking_id)?;
    ensure_barber(&booking, barber_id)?;

    if booking.queue_status != QueueStatus::Green {
        return Err(AppError::InvalidTransition {
            from: booking.queue_status,
            to: QueueStatus::Completed,
        });
    }

    let mut events = vec![];
    let next_customer =
        complete_service(&tx, &booking, &now, QueueEventKind::ServiceCompleted, &mut events)?;
    let completed = load_booking(&tx, booking_id)?;
    tx.commit()?;

    Ok(Outcome {
        value: ServiceEnded {
            booking: completed,
            next_customer,
        },
        events,
    })
}

/// Pushes the end of a running service. Overtime is never enforced; this is
/// how a barber acknowledges it.
pub fn extend_service(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    booking_id: &str,
    barber_id: &str,
    minutes: i32,
) -> Result<Outcome<Booking>, AppError> {
    validate_duration(minutes, policy)?;

    let tx = begin(conn)?;
    let booking = load_booking(&tx, booking_id)?;
    ensure_barber(&booking, barber_id)?;
    if booking.queue_status != QueueStatus::Green {
        return Err(AppError::InvalidTransition {
            from: booking.queue_status,
            to: QueueStatus::Green,
        });
    }

    let barber = load_barber(&tx, barber_id)?;
    let base = barber.current_service_end.unwrap_or(now).max(now);
    let new_end = base + Duration::minutes(minutes as i64);
    let started = booking.service_started_at.unwrap_or(now);
    let selected = timing::actual_duration_minutes(&started, &new_end);

    if !queries::set_service_end(&tx, barber_id, &booking.id, &new_end, &now)?
        || !queries::set_selected_duration(&tx, &booking.id, selected, &now)?
    {
        return Err(AppError::InvalidTransition {
            from: booking.queue_status,
            to: QueueStatus::Green,
        });
    }

    let event = record(
        &tx,
        &booking,
        QueueEventKind::ServiceExtended,
        Some(QueueStatus::Green),
        &format!("minutes={minutes}"),
        &now,
    )?;
    let extended = load_booking(&tx, booking_id)?;
    tx.commit()?;

    tracing::info!(booking_id, barber_id, minutes, "service extended");

    Ok(Outcome {
        value: extended,
        events: vec![event],
    })
}

// ── Feedback ──

pub fn submit_feedback(
    conn: &mut Connection,
    now: NaiveDateTime,
    booking_id: &str,
    input: &FeedbackInput,
) -> Result<Outcome<Booking>, AppError> {
    let ratings = &input.ratings;
    let in_range = |r: u8| (1..=5).contains(&r);
    if !in_range(ratings.service) || !in_range(ratings.barber) || !ratings.ambience.map_or(true, in_range) {
        return Err(AppError::Validation("ratings must be between 1 and 5".into()));
    }
    let comment = input
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    if comment.as_ref().is_some_and(|c| c.chars().count() > 1000) {
        return Err(AppError::Validation("comment is too long".into()));
    }

    let tx = begin(conn)?;
    let booking = load_booking(&tx, booking_id)?;
    match booking.queue_status {
        QueueStatus::Completed if booking.feedback.is_some() => {
            return Err(AppError::AlreadyProcessed(QueueStatus::Completed));
        }
        QueueStatus::Completed => {}
        status @ (QueueStatus::Red | QueueStatus::Orange | QueueStatus::Green | QueueStatus::Expired) => {
            return Err(AppError::InvalidTransition {
                from: status,
                to: QueueStatus::Completed,
            });
        }
    }

    let feedback = Feedback {
        ratings: ratings.clone(),
        comment,
        submitted_at: now,
    };
    if !queries::set_booking_feedback(&tx, booking_id, &feedback, &now)? {
        return Err(AppError::AlreadyProcessed(QueueStatus::Completed));
    }
    let event = record(&tx, &booking, QueueEventKind::FeedbackSubmitted, None, "", &now)?;
    let updated = load_booking(&tx, booking_id)?;
    tx.commit()?;

    Ok(Outcome {
        value: updated,
        events: vec![event],
    })
}

// ── Expiry ──

/// RED -> EXPIRED for every booking past its grace-adjusted deadline.
/// `salon_id = None` sweeps all salons.
pub fn sweep_expired(
    conn: &mut Connection,
    policy: &QueuePolicy,
    now: NaiveDateTime,
    salon_id: Option<&str>,
) -> Result<Outcome<Vec<Booking>>, AppError> {
    let tx = begin(conn)?;
    let mut events = vec![];
    let expired = expire_stale(&tx, policy, &now, salon_id, &mut events)?;
    tx.commit()?;

    Ok(Outcome {
        value: expired,
        events,
    })
}

pub(crate) fn expire_stale(
    conn: &Connection,
    policy: &QueuePolicy,
    now: &NaiveDateTime,
    salon_id: Option<&str>,
    events: &mut Vec<QueueEvent>,
) -> Result<Vec<Booking>, AppError> {
    let cutoff = *now - Duration::minutes(policy.grace_minutes);
    let stale = queries::list_red_expiring_before(conn, salon_id, &cutoff)?;

    let mut expired = Vec::with_capacity(stale.len());
    for booking in stale {
        if !timing::is_expired(&booking, now, policy) {
            continue;
        }
        expire_booking(conn, &booking, now, events)?;
        expired.push(load_booking(conn, &booking.id)?);
    }
    Ok(expired)
}

fn expire_booking(
    conn: &Connection,
    booking: &Booking,
    now: &NaiveDateTime,
    events: &mut Vec<QueueEvent>,
) -> Result<(), AppError> {
    let update = StatusUpdate {
        is_expired: Some(true),
        ..Default::default()
    };
    transition(conn, booking, QueueStatus::Expired, &update, now)?;
    events.push(record(conn, booking, QueueEventKind::Expired, Some(QueueStatus::Expired), "", now)?);

    tracing::info!(
        booking_id = %booking.id,
        barber_id = %booking.barber_id,
        expires_at = %booking.expires_at,
        "booking expired"
    );
    Ok(())
}

// ── Shared steps ──

/// Claims the barber's chair for `booking` and moves it to GREEN.
fn begin_service(
    conn: &Connection,
    booking: &Booking,
    duration: i32,
    now: &NaiveDateTime,
    detail: &str,
    events: &mut Vec<QueueEvent>,
) -> Result<(), AppError> {
    let service_end = *now + Duration::minutes(duration as i64);
    if !queries::assign_current_booking(conn, &booking.barber_id, &booking.id, now, &service_end, now)? {
        return Err(AppError::BarberBusy(format!(
            "chair of barber {} is no longer available",
            booking.barber_id
        )));
    }

    let update = StatusUpdate {
        service_started_at: Some(*now),
        selected_duration: Some(duration),
        ..Default::default()
    };
    transition(conn, booking, QueueStatus::Green, &update, now)?;
    let queue_length = queries::refresh_queue_length(conn, &booking.barber_id)?;

    let detail = if detail.is_empty() {
        format!("duration={duration}")
    } else {
        format!("duration={duration};{detail}")
    };
    events.push(record(conn, booking, QueueEventKind::ServiceStarted, Some(QueueStatus::Green), &detail, now)?);

    tracing::info!(
        booking_id = %booking.id,
        barber_id = %booking.barber_id,
        duration,
        queue_length,
        "service started"
    );
    Ok(())
}

/// Closes a GREEN booking, frees the chair and promotes the next arrival.
/// Returns the promoted booking, if any.
pub(crate) fn complete_service(
    conn: &Connection,
    booking: &Booking,
    now: &NaiveDateTime,
    kind: QueueEventKind,
    events: &mut Vec<QueueEvent>,
) -> Result<Option<Booking>, AppError> {
    let started = booking.service_started_at.unwrap_or(*now);
    let actual = timing::actual_duration_minutes(&started, now);
    let update = StatusUpdate {
        service_ended_at: Some(*now),
        actual_duration: Some(actual),
        ..Default::default()
    };
    transition(conn, booking, QueueStatus::Completed, &update, now)?;

    if !queries::release_barber(conn, &booking.barber_id, &booking.id, now)? {
        tracing::warn!(
            booking_id = %booking.id,
            barber_id = %booking.barber_id,
            "completed booking was not held by its barber"
        );
    }
    events.push(record(
        conn,
        booking,
        kind,
        Some(QueueStatus::Completed),
        &format!("actual={actual}"),
        now,
    )?);

    tracing::info!(
        booking_id = %booking.id,
        barber_id = %booking.barber_id,
        actual_duration = actual,
        kind = kind.as_str(),
        "service completed"
    );

    promote_next(conn, &booking.barber_id, now, events)
}

fn promote_next(
    conn: &Connection,
    barber_id: &str,
    now: &NaiveDateTime,
    events: &mut Vec<QueueEvent>,
) -> Result<Option<Booking>, AppError> {
    match queries::get_barber(conn, barber_id)? {
        Some(barber) if barber.current_status == BarberStatus::Available => {}
        _ => return Ok(None),
    }
    let Some(next) = queries::next_waiting(conn, barber_id)? else {
        return Ok(None);
    };

    let duration = next.selected_duration.unwrap_or(next.estimated_duration);
    begin_service(conn, &next, duration, now, "promoted", events)?;
    Ok(Some(load_booking(conn, &next.id)?))
}

fn transition(
    conn: &Connection,
    booking: &Booking,
    to: QueueStatus,
    update: &StatusUpdate,
    now: &NaiveDateTime,
) -> Result<(), AppError> {
    let from = booking.queue_status;
    if from.is_terminal() {
        return Err(AppError::AlreadyProcessed(from));
    }
    if !from.can_transition_to(to)
        || !queries::update_booking_status(conn, &booking.id, from, to, update, now)?
    {
        return Err(AppError::InvalidTransition { from, to });
    }
    Ok(())
}

pub(crate) fn record(
    conn: &Connection,
    booking: &Booking,
    kind: QueueEventKind,
    status: Option<QueueStatus>,
    detail: &str,
    now: &NaiveDateTime,
) -> Result<QueueEvent, AppError> {
    Ok(queries::insert_queue_event(
        conn,
        &booking.salon_id,
        &booking.barber_id,
        Some(&booking.id),
        kind,
        status,
        detail,
        now,
    )?)
}

pub(crate) fn load_booking(conn: &Connection, id: &str) -> Result<Booking, AppError> {
    queries::get_booking_by_id(conn, id)?.ok_or_else(|| AppError::NotFound(format!("booking {id}")))
}

pub(crate) fn load_barber(conn: &Connection, id: &str) -> Result<Barber, AppError> {
    queries::get_barber(conn, id)?.ok_or_else(|| AppError::NotFound(format!("barber {id}")))
}

fn ensure_barber(booking: &Booking, barber_id: &str) -> Result<(), AppError> {
    if booking.barber_id != barber_id {
        return Err(AppError::Validation(format!(
            "booking {} is not assigned to barber {barber_id}",
            booking.id
        )));
    }
    Ok(())
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn validate_duration(minutes: i32, policy: &QueuePolicy) -> Result<(), AppError> {
    if minutes < 1 || minutes > policy.max_service_minutes {
        return Err(AppError::Validation(format!(
            "duration must be between 1 and {} minutes",
            policy.max_service_minutes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn at(base: NaiveDateTime, minutes: i64) -> NaiveDateTime {
        base + Duration::minutes(minutes)
    }

    fn t0() -> NaiveDateTime {
        dt("2025-06-16 10:00:00")
    }

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        for (id, chair) in [("b1", 1), ("b2", 2)] {
            queries::insert_barber(
                &conn,
                &Barber {
                    id: id.to_string(),
                    salon_id: "s1".to_string(),
                    name: format!("Barber {chair}"),
                    chair_number: chair,
                    current_status: BarberStatus::Available,
                    current_booking_id: None,
                    current_service_start: None,
                    current_service_end: None,
                    queue_length: 0,
                    created_at: t0(),
                    updated_at: t0(),
                },
            )
            .unwrap();
        }
        conn
    }

    fn new_booking(barber_id: &str, name: &str) -> NewBooking {
        NewBooking {
            salon_id: "s1".to_string(),
            barber_id: barber_id.to_string(),
            customer_name: name.to_string(),
            customer_phone: "+15551110000".to_string(),
            service: "Fade".to_string(),
            duration: 30,
            scheduled_for: None,
        }
    }

    fn create(conn: &mut Connection, barber_id: &str, name: &str, now: NaiveDateTime) -> Booking {
        create_booking(conn, &QueuePolicy::default(), now, &new_booking(barber_id, name))
            .unwrap()
            .value
            .booking
    }

    fn arrive(conn: &mut Connection, booking: &Booking, now: NaiveDateTime) -> Booking {
        verify_arrival(conn, &QueuePolicy::default(), now, &booking.booking_code, "s1")
            .unwrap()
            .value
            .into_booking()
            .unwrap()
    }

    fn barber(conn: &Connection, id: &str) -> Barber {
        queries::get_barber(conn, id).unwrap().unwrap()
    }

    #[test]
    fn test_full_lifecycle() {
        let mut conn = setup();
        let policy = QueuePolicy::default();

        let created = create_booking(&mut conn, &policy, t0(), &new_booking("b1", "Alice")).unwrap();
        let booking = created.value.booking;
        assert_eq!(booking.queue_status, QueueStatus::Red);
        assert_eq!(booking.expires_at, at(t0(), 45));
        assert_eq!(booking.kind, BookingKind::WalkIn);
        assert!(booking.booking_code.starts_with("WLK-"));
        assert_eq!(created.events.len(), 1);

        let arrived = arrive(&mut conn, &booking, at(t0(), 5));
        assert_eq!(arrived.queue_status, QueueStatus::Orange);
        assert_eq!(arrived.arrived_at, Some(at(t0(), 5)));
        assert_eq!(barber(&conn, "b1").queue_length, 1);

        let started = start_service(&mut conn, &policy, at(t0(), 10), &booking.id, "b1", 20)
            .unwrap()
            .value;
        assert_eq!(started.queue_status, QueueStatus::Green);
        assert_eq!(started.selected_duration, Some(20));
        assert_eq!(started.service_started_at, Some(at(t0(), 10)));
        let b = barber(&conn, "b1");
        assert_eq!(b.current_status, BarberStatus::Occupied);
        assert_eq!(b.current_booking_id.as_deref(), Some(booking.id.as_str()));
        assert_eq!(b.current_service_end, Some(at(t0(), 30)));
        assert_eq!(b.queue_length, 0);

        let ended = end_service(&mut conn, at(t0(), 28), &booking.id, "b1").unwrap().value;
        assert_eq!(ended.booking.queue_status, QueueStatus::Completed);
        assert_eq!(ended.booking.actual_duration, Some(18));
        assert_eq!(ended.booking.service_ended_at, Some(at(t0(), 28)));
        assert!(ended.next_customer.is_none());
        let b = barber(&conn, "b1");
        assert_eq!(b.current_status, BarberStatus::Available);
        assert!(b.current_booking_id.is_none());
    }

    #[test]
    fn test_create_rejects_missing_ids_and_unknown_barber() {
        let mut conn = setup();
        let policy = QueuePolicy::default();

        let mut req = new_booking("b1", "Alice");
        req.salon_id = " ".to_string();
        assert!(matches!(
            create_booking(&mut conn, &policy, t0(), &req),
            Err(AppError::Validation(_))
        ));

        let req = new_booking("nope", "Alice");
        assert!(matches!(
            create_booking(&mut conn, &policy, t0(), &req),
            Err(AppError::Validation(_))
        ));

        let mut req = new_booking("b1", "Alice");
        req.salon_id = "other-salon".to_string();
        assert!(matches!(
            create_booking(&mut conn, &policy, t0(), &req),
            Err(AppError::Validation(_))
        ));

        let mut req = new_booking("b1", "Alice");
        req.duration = 0;
        assert!(matches!(
            create_booking(&mut conn, &policy, t0(), &req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_prebook_expires_relative_to_slot() {
        let mut conn = setup();
        let mut req = new_booking("b1", "Alice");
        req.scheduled_for = Some(at(t0(), 120));

        let booking = create_booking(&mut conn, &QueuePolicy::default(), t0(), &req)
            .unwrap()
            .value
            .booking;
        assert_eq!(booking.kind, BookingKind::PreBook);
        assert!(booking.booking_code.starts_with("PRE-"));
        assert_eq!(booking.expires_at, at(t0(), 165));

        req.scheduled_for = Some(at(t0(), -1));
        assert!(matches!(
            create_booking(&mut conn, &QueuePolicy::default(), t0(), &req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_prebook_too_far_ahead_is_rejected() {
        let mut conn = setup();
        let policy = QueuePolicy::default();
        let mut req = new_booking("b1", "Alice");

        req.scheduled_for = Some(NaiveDateTime::MAX);
        assert!(matches!(
            create_booking(&mut conn, &policy, t0(), &req),
            Err(AppError::Validation(_))
        ));

        req.scheduled_for = Some(t0() + Duration::days(MAX_SCHEDULE_AHEAD_DAYS) + Duration::minutes(1));
        assert!(matches!(
            create_booking(&mut conn, &policy, t0(), &req),
            Err(AppError::Validation(_))
        ));

        req.scheduled_for = Some(t0() + Duration::days(MAX_SCHEDULE_AHEAD_DAYS));
        assert!(create_booking(&mut conn, &policy, t0(), &req).is_ok());

        // Rejections write nothing.
        assert_eq!(queries::count_salon_bookings(&conn, "s1", QueueStatus::Red).unwrap(), 1);
    }

    #[test]
    fn test_transition_out_of_terminal_is_already_processed() {
        let mut conn = setup();
        let booking = create(&mut conn, "b1", "Alice", t0());
        let late = at(t0(), 51);
        sweep_expired(&mut conn, &QueuePolicy::default(), late, Some("s1")).unwrap();

        let expired = load_booking(&conn, &booking.id).unwrap();
        let result = transition(&conn, &expired, QueueStatus::Orange, &StatusUpdate::default(), &late);
        assert!(matches!(result, Err(AppError::AlreadyProcessed(QueueStatus::Expired))));
    }

    #[test]
    fn test_verify_rejects_malformed_code_before_lookup() {
        let mut conn = setup();
        let result = verify_arrival(&mut conn, &QueuePolicy::default(), t0(), "garbage", "s1");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_verify_wrong_salon_is_not_found() {
        let mut conn = setup();
        let booking = create(&mut conn, "b1", "Alice", t0());
        let result =
            verify_arrival(&mut conn, &QueuePolicy::default(), t0(), &booking.booking_code, "s2");
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result =
            verify_arrival(&mut conn, &QueuePolicy::default(), t0(), "WLK-ZZZZZZ-0000", "s1");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_verify_twice_is_already_processed() {
        let mut conn = setup();
        let booking = create(&mut conn, "b1", "Alice", t0());
        arrive(&mut conn, &booking, at(t0(), 1));

        let again =
            verify_arrival(&mut conn, &QueuePolicy::default(), at(t0(), 2), &booking.booking_code, "s1");
        assert!(matches!(again, Err(AppError::AlreadyProcessed(QueueStatus::Orange))));
        assert_eq!(barber(&conn, "b1").queue_length, 1);
    }

    #[test]
    fn test_verify_inside_grace_succeeds() {
        let mut conn = setup();
        let booking = create(&mut conn, "b1", "Alice", t0());
        let arrived = arrive(&mut conn, &booking, at(t0(), 49));
        assert_eq!(arrived.queue_status, QueueStatus::Orange);
    }

    #[test]
    fn test_verify_after_grace_is_expired_and_persisted() {
        let mut conn = setup();
        let booking = create(&mut conn, "b1", "Alice", t0());
        let late = at(t0(), 50) + Duration::seconds(1);

        let outcome =
            verify_arrival(&mut conn, &QueuePolicy::default(), late, &booking.booking_code, "s1")
                .unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].kind, QueueEventKind::Expired);
        assert_eq!(outcome.events[0].status, Some(QueueStatus::Expired));
        assert!(matches!(outcome.value.into_booking(), Err(AppError::Expired(_))));

        let stored = queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(stored.queue_status, QueueStatus::Expired);
        assert!(stored.is_expired);

        let again =
            verify_arrival(&mut conn, &QueuePolicy::default(), late, &booking.booking_code, "s1");
        assert!(matches!(again, Err(AppError::Expired(_))));
    }

    #[test]
    fn test_start_requires_orange() {
        let mut conn = setup();
        let policy = QueuePolicy::default();
        let booking = create(&mut conn, "b1", "Alice", t0());

        let result = start_service(&mut conn, &policy, t0(), &booking.id, "b1", 20);
        assert!(matches!(
            result,
            Err(AppError::InvalidTransition {
                from: QueueStatus::Red,
                to: QueueStatus::Green
            })
        ));
        let stored = queries::get_booking_by_id(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(stored.queue_status, QueueStatus::Red);
        assert_eq!(barber(&conn, "b1").current_status, BarberStatus::Available);
    }

    #[test]
    fn test_double_start_is_invalid_transition() {
        let mut conn = setup();
        let policy = QueuePolicy::default();
        let booking = create(&mut conn, "b1", "Alice", t0());
        arrive(&mut conn, &booking, at(t0(), 1));

        start_service(&mut conn, &policy, at(t0(), 2), &booking.id, "b1", 20).unwrap();
        let again = start_service(&mut conn, &policy, at(t0(), 2), &booking.id, "b1", 20);
        assert!(matches!(again, Err(AppError::InvalidTransition { .. })));
    }

    #[test]
    fn test_start_while_occupied_is_barber_busy() {
        let mut conn = setup();
        let policy = QueuePolicy::default();
        let first = create(&mut conn, "b1", "Alice", t0());
        let second = create(&mut conn, "b1", "Bob", t0());
        arrive(&mut conn, &first, at(t0(), 1));
        arrive(&mut conn, &second, at(t0(), 2));

        start_service(&mut conn, &policy, at(t0(), 3), &first.id, "b1", 20).unwrap();
        let result = start_service(&mut conn, &policy, at(t0(), 3), &second.id, "b1", 20);
        assert!(matches!(result, Err(AppError::BarberBusy(_))));

        let stored = queries::get_booking_by_id(&conn, &second.id).unwrap().unwrap();
        assert_eq!(stored.queue_status, QueueStatus::Orange);
        assert_eq!(barber(&conn, "b1").current_booking_id.as_deref(), Some(first.id.as_str()));
    }

    #[test]
    fn test_start_with_wrong_barber_rejected() {
        let mut conn = setup();
        let booking = create(&mut conn, "b1", "Alice", t0());
        arrive(&mut conn, &booking, at(t0(), 1));

        let result = start_service(&mut conn, &QueuePolicy::default(), t0(), &booking.id, "b2", 20);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_end_promotes_earliest_arrival_not_earliest_booking() {
        let mut conn = setup();
        let policy = QueuePolicy::default();
        let serving = create(&mut conn, "b1", "Alice", t0());
        let booked_first = create(&mut conn, "b1", "Bob", at(t0(), 1));
        let booked_second = create(&mut conn, "b1", "Carol", at(t0(), 2));

        arrive(&mut conn, &serving, at(t0(), 3));
        start_service(&mut conn, &policy, at(t0(), 4), &serving.id, "b1", 30).unwrap();
        // Carol booked later but arrives first.
        arrive(&mut conn, &booked_second, at(t0(), 5));
        arrive(&mut conn, &booked_first, at(t0(), 6));
        assert_eq!(barber(&conn, "b1").queue_length, 2);

        let ended = end_service(&mut conn, at(t0(), 30), &serving.id, "b1").unwrap();
        let next = ended.value.next_customer.unwrap();
        assert_eq!(next.id, booked_second.id);
        assert_eq!(next.queue_status, QueueStatus::Green);
        assert_eq!(next.service_started_at, Some(at(t0(), 30)));

        let b = barber(&conn, "b1");
        assert_eq!(b.current_booking_id.as_deref(), Some(booked_second.id.as_str()));
        assert_eq!(b.queue_length, 1);
        assert_eq!(b.current_service_end, Some(at(t0(), 60)));

        let kinds: Vec<QueueEventKind> = ended.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![QueueEventKind::ServiceCompleted, QueueEventKind::ServiceStarted]);
    }

    #[test]
    fn test_end_requires_green() {
        let mut conn = setup();
        let booking = create(&mut conn, "b1", "Alice", t0());
        arrive(&mut conn, &booking, at(t0(), 1));

        let result = end_service(&mut conn, at(t0(), 2), &booking.id, "b1");
        assert!(matches!(
            result,
            Err(AppError::InvalidTransition {
                from: QueueStatus::Orange,
                to: QueueStatus::Completed
            })
        ));
    }

    #[test]
    fn test_sweep_expires_only_past_grace() {
        let mut conn = setup();
        let policy = QueuePolicy::default();
        let old = create(&mut conn, "b1", "Alice", t0());
        let fresh = create(&mut conn, "b1", "Bob", at(t0(), 10));

        let now = at(t0(), 50) + Duration::seconds(1);
        let swept = sweep_expired(&mut conn, &policy, now, Some("s1")).unwrap();
        assert_eq!(swept.value.len(), 1);
        assert_eq!(swept.value[0].id, old.id);
        assert_eq!(swept.value[0].queue_status, QueueStatus::Expired);
        assert_eq!(swept.events.len(), 1);

        let stored = queries::get_booking_by_id(&conn, &fresh.id).unwrap().unwrap();
        assert_eq!(stored.queue_status, QueueStatus::Red);

        // Nothing left to do.
        assert!(sweep_expired(&mut conn, &policy, now, None).unwrap().value.is_empty());
    }

    #[test]
    fn test_sweep_ignores_arrived_bookings() {
        let mut conn = setup();
        let booking = create(&mut conn, "b1", "Alice", t0());
        arrive(&mut conn, &booking, at(t0(), 40));

        let swept = sweep_expired(&mut conn, &QueuePolicy::default(), at(t0(), 180), None).unwrap();
        assert!(swept.value.is_empty());
    }

    #[test]
    fn test_extend_pushes_service_end() {
        let mut conn = setup();
        let policy = QueuePolicy::default();
        let booking = create(&mut conn, "b1", "Alice", t0());
        arrive(&mut conn, &booking, t0());
        start_service(&mut conn, &policy, t0(), &booking.id, "b1", 20).unwrap();

        let extended = extend_service(&mut conn, &policy, at(t0(), 15), &booking.id, "b1", 10)
            .unwrap()
            .value;
        assert_eq!(extended.selected_duration, Some(30));
        assert_eq!(barber(&conn, "b1").current_service_end, Some(at(t0(), 30)));

        // Already overtime: extension counts from now.
        let extended = extend_service(&mut conn, &policy, at(t0(), 40), &booking.id, "b1", 5)
            .unwrap()
            .value;
        assert_eq!(extended.selected_duration, Some(45));
        assert_eq!(barber(&conn, "b1").current_service_end, Some(at(t0(), 45)));
    }

    #[test]
    fn test_feedback_once_after_completion() {
        let mut conn = setup();
        let policy = QueuePolicy::default();
        let booking = create(&mut conn, "b1", "Alice", t0());
        let input = FeedbackInput {
            ratings: Ratings {
                service: 5,
                barber: 4,
                ambience: None,
            },
            comment: Some("  great fade ".to_string()),
        };

        assert!(matches!(
            submit_feedback(&mut conn, t0(), &booking.id, &input),
            Err(AppError::InvalidTransition { .. })
        ));

        arrive(&mut conn, &booking, t0());
        start_service(&mut conn, &policy, t0(), &booking.id, "b1", 20).unwrap();
        end_service(&mut conn, at(t0(), 20), &booking.id, "b1").unwrap();

        let updated = submit_feedback(&mut conn, at(t0(), 21), &booking.id, &input)
            .unwrap()
            .value;
        let feedback = updated.feedback.unwrap();
        assert_eq!(feedback.ratings.service, 5);
        assert_eq!(feedback.comment.as_deref(), Some("great fade"));

        assert!(matches!(
            submit_feedback(&mut conn, at(t0(), 22), &booking.id, &input),
            Err(AppError::AlreadyProcessed(QueueStatus::Completed))
        ));
    }

    #[test]
    fn test_feedback_rating_range() {
        let mut conn = setup();
        let input = FeedbackInput {
            ratings: Ratings {
                service: 6,
                barber: 4,
                ambience: Some(3),
            },
            comment: None,
        };
        assert!(matches!(
            submit_feedback(&mut conn, t0(), "any", &input),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_codes_unique_across_created_bookings() {
        let mut conn = setup();
        let mut codes = std::collections::HashSet::new();
        for i in 0..200 {
            let booking = create(&mut conn, "b1", &format!("Customer {i}"), t0());
            assert!(codes.insert(booking.booking_code));
        }
    }
}
