use anyhow::Context;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Barber, BarberStatus, Booking, BookingKind, Feedback, QueueEvent, QueueEventKind, QueueStatus,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn format_opt_ts(ts: &Option<NaiveDateTime>) -> Option<String> {
    ts.as_ref().map(format_ts)
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).with_context(|| format!("bad timestamp: {s}"))
}

fn parse_opt_ts(s: Option<String>) -> anyhow::Result<Option<NaiveDateTime>> {
    s.as_deref().map(parse_ts).transpose()
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, booking_code, kind, salon_id, barber_id, customer_name, customer_phone, service, \
     queue_status, scheduled_for, created_at, expires_at, arrived_at, service_started_at, service_ended_at, \
     estimated_duration, selected_duration, actual_duration, is_expired, feedback, queue_seq, updated_at";

/// Fields written alongside a status change. `None` leaves the stored value untouched.
#[derive(Debug, Default, Clone)]
pub struct StatusUpdate {
    pub arrived_at: Option<NaiveDateTime>,
    pub service_started_at: Option<NaiveDateTime>,
    pub service_ended_at: Option<NaiveDateTime>,
    pub selected_duration: Option<i32>,
    pub actual_duration: Option<i32>,
    pub is_expired: Option<bool>,
    pub queue_seq: Option<i64>,
}

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let feedback = booking
        .feedback
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)"
        ),
        params![
            booking.id,
            booking.booking_code,
            booking.kind.as_str(),
            booking.salon_id,
            booking.barber_id,
            booking.customer_name,
            booking.customer_phone,
            booking.service,
            booking.queue_status.as_str(),
            format_opt_ts(&booking.scheduled_for),
            format_ts(&booking.created_at),
            format_ts(&booking.expires_at),
            format_opt_ts(&booking.arrived_at),
            format_opt_ts(&booking.service_started_at),
            format_opt_ts(&booking.service_ended_at),
            booking.estimated_duration,
            booking.selected_duration,
            booking.actual_duration,
            booking.is_expired as i32,
            feedback,
            booking.queue_seq,
            format_ts(&booking.updated_at),
        ],
    )
    .context("failed to insert booking")?;
    Ok(())
}

pub fn booking_code_exists(conn: &Connection, code: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE booking_code = ?1",
        params![code],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    query_one_booking(conn, "id = ?1", id)
}

pub fn get_booking_by_code(conn: &Connection, code: &str) -> anyhow::Result<Option<Booking>> {
    query_one_booking(conn, "booking_code = ?1", code)
}

fn query_one_booking(conn: &Connection, filter: &str, key: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE {filter}"),
            params![key],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    result.transpose()
}

/// Persists a status change only if the booking still has status `from`.
/// Returns false when the precondition no longer holds.
pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    from: QueueStatus,
    to: QueueStatus,
    update: &StatusUpdate,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           queue_status = ?1,
           arrived_at = COALESCE(?2, arrived_at),
           service_started_at = COALESCE(?3, service_started_at),
           service_ended_at = COALESCE(?4, service_ended_at),
           selected_duration = COALESCE(?5, selected_duration),
           actual_duration = COALESCE(?6, actual_duration),
           is_expired = COALESCE(?7, is_expired),
           queue_seq = COALESCE(?8, queue_seq),
           updated_at = ?9
         WHERE id = ?10 AND queue_status = ?11",
        params![
            to.as_str(),
            format_opt_ts(&update.arrived_at),
            format_opt_ts(&update.service_started_at),
            format_opt_ts(&update.service_ended_at),
            update.selected_duration,
            update.actual_duration,
            update.is_expired.map(|e| e as i32),
            update.queue_seq,
            format_ts(now),
            id,
            from.as_str(),
        ],
    )?;
    Ok(count > 0)
}

pub fn set_selected_duration(
    conn: &Connection,
    id: &str,
    minutes: i32,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET selected_duration = ?1, updated_at = ?2
         WHERE id = ?3 AND queue_status = 'GREEN'",
        params![minutes, format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn set_booking_feedback(
    conn: &Connection,
    id: &str,
    feedback: &Feedback,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let json = serde_json::to_string(feedback)?;
    let count = conn.execute(
        "UPDATE bookings SET feedback = ?1, updated_at = ?2
         WHERE id = ?3 AND queue_status = 'COMPLETED' AND feedback IS NULL",
        params![json, format_ts(now), id],
    )?;
    Ok(count > 0)
}

/// ORANGE bookings for a barber in serving order.
pub fn list_waiting(conn: &Connection, barber_id: &str) -> anyhow::Result<Vec<Booking>> {
    query_bookings(
        conn,
        "barber_id = ?1 AND queue_status = 'ORANGE' ORDER BY arrived_at ASC, queue_seq ASC",
        &[&barber_id],
    )
}

/// RED bookings for a barber, soonest-expiring first.
pub fn list_booked(conn: &Connection, barber_id: &str) -> anyhow::Result<Vec<Booking>> {
    query_bookings(
        conn,
        "barber_id = ?1 AND queue_status = 'RED' ORDER BY expires_at ASC, created_at ASC",
        &[&barber_id],
    )
}

pub fn next_waiting(conn: &Connection, barber_id: &str) -> anyhow::Result<Option<Booking>> {
    Ok(list_waiting(conn, barber_id)?.into_iter().next())
}

/// RED bookings whose `expires_at` falls strictly before `cutoff`.
pub fn list_red_expiring_before(
    conn: &Connection,
    salon_id: Option<&str>,
    cutoff: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let cutoff = format_ts(cutoff);
    match salon_id {
        Some(salon_id) => query_bookings(
            conn,
            "queue_status = 'RED' AND expires_at < ?1 AND salon_id = ?2 ORDER BY expires_at ASC",
            &[&cutoff, &salon_id],
        ),
        None => query_bookings(
            conn,
            "queue_status = 'RED' AND expires_at < ?1 ORDER BY expires_at ASC",
            &[&cutoff],
        ),
    }
}

pub fn count_salon_bookings(
    conn: &Connection,
    salon_id: &str,
    status: QueueStatus,
) -> anyhow::Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE salon_id = ?1 AND queue_status = ?2",
        params![salon_id, status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn next_queue_seq(conn: &Connection, barber_id: &str) -> anyhow::Result<i64> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(queue_seq), 0) + 1 FROM bookings WHERE barber_id = ?1",
        params![barber_id],
        |row| row.get(0),
    )?;
    Ok(seq)
}

fn query_bookings(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::types::ToSql],
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE {filter}"))?;
    let rows = stmt.query_map(args, |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(8)?;
    let feedback_json: Option<String> = row.get(19)?;

    let queue_status = QueueStatus::parse(&status_str)
        .with_context(|| format!("unknown queue status: {status_str}"))?;
    let feedback = feedback_json
        .as_deref()
        .map(serde_json::from_str::<Feedback>)
        .transpose()
        .context("malformed feedback column")?;

    Ok(Booking {
        id: row.get(0)?,
        booking_code: row.get(1)?,
        kind: BookingKind::parse(&kind_str),
        salon_id: row.get(3)?,
        barber_id: row.get(4)?,
        customer_name: row.get(5)?,
        customer_phone: row.get(6)?,
        service: row.get(7)?,
        queue_status,
        scheduled_for: parse_opt_ts(row.get(9)?)?,
        created_at: parse_ts(&row.get::<_, String>(10)?)?,
        expires_at: parse_ts(&row.get::<_, String>(11)?)?,
        arrived_at: parse_opt_ts(row.get(12)?)?,
        service_started_at: parse_opt_ts(row.get(13)?)?,
        service_ended_at: parse_opt_ts(row.get(14)?)?,
        estimated_duration: row.get(15)?,
        selected_duration: row.get(16)?,
        actual_duration: row.get(17)?,
        is_expired: row.get::<_, i32>(18)? != 0,
        feedback,
        queue_seq: row.get(20)?,
        updated_at: parse_ts(&row.get::<_, String>(21)?)?,
    })
}

// ── Barbers ──

const BARBER_COLUMNS: &str = "id, salon_id, name, chair_number, current_status, current_booking_id, \
     current_service_start, current_service_end, queue_length, created_at, updated_at";

pub fn insert_barber(conn: &Connection, barber: &Barber) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO barbers ({BARBER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            barber.id,
            barber.salon_id,
            barber.name,
            barber.chair_number,
            barber.current_status.as_str(),
            barber.current_booking_id,
            format_opt_ts(&barber.current_service_start),
            format_opt_ts(&barber.current_service_end),
            barber.queue_length,
            format_ts(&barber.created_at),
            format_ts(&barber.updated_at),
        ],
    )
    .context("failed to insert barber")?;
    Ok(())
}

pub fn chair_taken(conn: &Connection, salon_id: &str, chair_number: i32) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM barbers WHERE salon_id = ?1 AND chair_number = ?2",
        params![salon_id, chair_number],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_barber(conn: &Connection, id: &str) -> anyhow::Result<Option<Barber>> {
    let result = conn
        .query_row(
            &format!("SELECT {BARBER_COLUMNS} FROM barbers WHERE id = ?1"),
            params![id],
            |row| Ok(parse_barber_row(row)),
        )
        .optional()?;

    result.transpose()
}

pub fn list_barbers(conn: &Connection, salon_id: &str) -> anyhow::Result<Vec<Barber>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BARBER_COLUMNS} FROM barbers WHERE salon_id = ?1 ORDER BY chair_number ASC"
    ))?;
    let rows = stmt.query_map(params![salon_id], |row| Ok(parse_barber_row(row)))?;

    let mut barbers = vec![];
    for row in rows {
        barbers.push(row??);
    }
    Ok(barbers)
}

/// Flips an AVAILABLE chair to OCCUPIED. The status precondition lives in the
/// UPDATE itself, so of two racing callers exactly one sees an affected row.
pub fn assign_current_booking(
    conn: &Connection,
    barber_id: &str,
    booking_id: &str,
    service_start: &NaiveDateTime,
    service_end: &NaiveDateTime,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE barbers SET
           current_status = 'OCCUPIED',
           current_booking_id = ?1,
           current_service_start = ?2,
           current_service_end = ?3,
           updated_at = ?4
         WHERE id = ?5 AND current_status = 'AVAILABLE' AND current_booking_id IS NULL",
        params![
            booking_id,
            format_ts(service_start),
            format_ts(service_end),
            format_ts(now),
            barber_id,
        ],
    )?;
    Ok(count > 0)
}

/// Frees the chair, but only if it is still held by `booking_id`.
pub fn release_barber(
    conn: &Connection,
    barber_id: &str,
    booking_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE barbers SET
           current_status = 'AVAILABLE',
           current_booking_id = NULL,
           current_service_start = NULL,
           current_service_end = NULL,
           updated_at = ?1
         WHERE id = ?2 AND current_booking_id = ?3",
        params![format_ts(now), barber_id, booking_id],
    )?;
    Ok(count > 0)
}

/// Clears a chair regardless of what it holds. Used to repair records whose
/// held booking is no longer GREEN.
pub fn force_release_barber(
    conn: &Connection,
    barber_id: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE barbers SET
           current_status = 'AVAILABLE',
           current_booking_id = NULL,
           current_service_start = NULL,
           current_service_end = NULL,
           updated_at = ?1
         WHERE id = ?2 AND current_status = 'OCCUPIED'",
        params![format_ts(now), barber_id],
    )?;
    Ok(count > 0)
}

/// Moves an idle chair between AVAILABLE and BREAK.
pub fn set_barber_status(
    conn: &Connection,
    barber_id: &str,
    from: BarberStatus,
    to: BarberStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE barbers SET current_status = ?1, updated_at = ?2
         WHERE id = ?3 AND current_status = ?4 AND current_booking_id IS NULL",
        params![to.as_str(), format_ts(now), barber_id, from.as_str()],
    )?;
    Ok(count > 0)
}

pub fn set_service_end(
    conn: &Connection,
    barber_id: &str,
    booking_id: &str,
    service_end: &NaiveDateTime,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE barbers SET current_service_end = ?1, updated_at = ?2
         WHERE id = ?3 AND current_booking_id = ?4",
        params![format_ts(service_end), format_ts(now), barber_id, booking_id],
    )?;
    Ok(count > 0)
}

/// Recomputes the denormalized ORANGE count for a barber.
pub fn refresh_queue_length(conn: &Connection, barber_id: &str) -> anyhow::Result<i64> {
    conn.execute(
        "UPDATE barbers SET queue_length = (
           SELECT COUNT(*) FROM bookings WHERE barber_id = ?1 AND queue_status = 'ORANGE'
         ) WHERE id = ?1",
        params![barber_id],
    )?;
    let len: i64 = conn.query_row(
        "SELECT queue_length FROM barbers WHERE id = ?1",
        params![barber_id],
        |row| row.get(0),
    )?;
    Ok(len)
}

fn parse_barber_row(row: &rusqlite::Row) -> anyhow::Result<Barber> {
    let status_str: String = row.get(4)?;
    let current_status = BarberStatus::parse(&status_str)
        .with_context(|| format!("unknown barber status: {status_str}"))?;

    Ok(Barber {
        id: row.get(0)?,
        salon_id: row.get(1)?,
        name: row.get(2)?,
        chair_number: row.get(3)?,
        current_status,
        current_booking_id: row.get(5)?,
        current_service_start: parse_opt_ts(row.get(6)?)?,
        current_service_end: parse_opt_ts(row.get(7)?)?,
        queue_length: row.get(8)?,
        created_at: parse_ts(&row.get::<_, String>(9)?)?,
        updated_at: parse_ts(&row.get::<_, String>(10)?)?,
    })
}

// ── Queue Events ──

#[allow(clippy::too_many_arguments)]
pub fn insert_queue_event(
    conn: &Connection,
    salon_id: &str,
    barber_id: &str,
    booking_id: Option<&str>,
    kind: QueueEventKind,
    status: Option<QueueStatus>,
    detail: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<QueueEvent> {
    let created_at = format_ts(now);
    conn.execute(
        "INSERT INTO queue_events (salon_id, barber_id, booking_id, kind, status, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            salon_id,
            barber_id,
            booking_id,
            kind.as_str(),
            status.map(|s| s.as_str()),
            detail,
            created_at,
        ],
    )?;

    Ok(QueueEvent {
        id: conn.last_insert_rowid(),
        salon_id: salon_id.to_string(),
        barber_id: barber_id.to_string(),
        booking_id: booking_id.map(str::to_string),
        kind,
        status,
        detail: detail.to_string(),
        created_at,
    })
}

const EVENT_PAGE_SIZE: i64 = 500;

/// Every event for the salon after `last_id`, read page by page.
pub fn get_all_queue_events_since(
    conn: &Connection,
    salon_id: &str,
    last_id: i64,
) -> anyhow::Result<Vec<QueueEvent>> {
    let mut events = vec![];
    let mut cursor = last_id;
    loop {
        let page = get_queue_events_since(conn, salon_id, cursor)?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = last.id;
        events.extend(page);
    }
    Ok(events)
}

/// One page (at most `EVENT_PAGE_SIZE`) of events after `last_id`.
pub fn get_queue_events_since(
    conn: &Connection,
    salon_id: &str,
    last_id: i64,
) -> anyhow::Result<Vec<QueueEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, salon_id, barber_id, booking_id, kind, status, detail, created_at
         FROM queue_events WHERE salon_id = ?1 AND id > ?2 ORDER BY id ASC LIMIT ?3",
    )?;
    let rows = stmt.query_map(params![salon_id, last_id, EVENT_PAGE_SIZE], |row| {
        let kind_str: String = row.get(4)?;
        let status_str: Option<String> = row.get(5)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            kind_str,
            status_str,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut events = vec![];
    for row in rows {
        let (id, salon_id, barber_id, booking_id, kind_str, status_str, detail, created_at) = row?;
        let kind = QueueEventKind::parse(&kind_str)
            .with_context(|| format!("unknown event kind: {kind_str}"))?;
        events.push(QueueEvent {
            id,
            salon_id,
            barber_id,
            booking_id,
            kind,
            status: status_str.as_deref().and_then(QueueStatus::parse),
            detail,
            created_at,
        });
    }
    Ok(events)
}
