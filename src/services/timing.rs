//! Pure time predicates. Every read path derives expiry and overtime from
//! these instead of trusting stored flags.

use chrono::{Duration, NaiveDateTime};

use crate::config::QueuePolicy;
use crate::models::{Barber, BarberStatus, Booking, QueueStatus};

/// Latest instant at which a RED booking still counts as live.
pub fn expiry_deadline(booking: &Booking, policy: &QueuePolicy) -> NaiveDateTime {
    booking.expires_at + Duration::minutes(policy.grace_minutes)
}

pub fn is_expired(booking: &Booking, now: &NaiveDateTime, policy: &QueuePolicy) -> bool {
    match booking.queue_status {
        QueueStatus::Expired => true,
        QueueStatus::Red => *now > expiry_deadline(booking, policy),
        QueueStatus::Orange | QueueStatus::Green | QueueStatus::Completed => false,
    }
}

pub fn is_overtime(barber: &Barber, now: &NaiveDateTime) -> bool {
    match (barber.current_status, barber.current_service_end) {
        (BarberStatus::Occupied, Some(end)) => *now > end,
        _ => false,
    }
}

/// Minutes until `deadline`, rounded up and floored at zero.
pub fn minutes_until(deadline: &NaiveDateTime, now: &NaiveDateTime) -> i64 {
    let secs = (*deadline - *now).num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + 59) / 60
    }
}

/// Whole minutes elapsed since `start`, floored at zero.
pub fn minutes_since(start: &NaiveDateTime, now: &NaiveDateTime) -> i64 {
    (*now - *start).num_minutes().max(0)
}

pub fn remaining_service_minutes(barber: &Barber, now: &NaiveDateTime) -> i64 {
    match (barber.current_status, barber.current_service_end) {
        (BarberStatus::Occupied, Some(end)) => minutes_until(&end, now),
        _ => 0,
    }
}

pub fn actual_duration_minutes(started: &NaiveDateTime, ended: &NaiveDateTime) -> i32 {
    let secs = (*ended - *started).num_seconds().max(0);
    ((secs as f64) / 60.0).round() as i32
}

/// Heuristic wait: what is left of the current service plus one average
/// service for every arrived customer ahead.
pub fn estimate_wait(remaining_current: i64, ahead: i64, average_service_minutes: i64) -> i64 {
    remaining_current + ahead.max(0) * average_service_minutes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingKind;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn red_booking(created: &str) -> Booking {
        let created_at = dt(created);
        Booking {
            id: "k1".to_string(),
            booking_code: "WLK-ABC-1234".to_string(),
            kind: BookingKind::WalkIn,
            salon_id: "s1".to_string(),
            barber_id: "b1".to_string(),
            customer_name: "Alice".to_string(),
            customer_phone: "+15551110000".to_string(),
            service: "Trim".to_string(),
            queue_status: QueueStatus::Red,
            scheduled_for: None,
            created_at,
            expires_at: created_at + Duration::minutes(45),
            arrived_at: None,
            service_started_at: None,
            service_ended_at: None,
            estimated_duration: 30,
            selected_duration: None,
            actual_duration: None,
            is_expired: false,
            feedback: None,
            queue_seq: None,
            updated_at: created_at,
        }
    }

    fn occupied_barber(end: &str) -> Barber {
        let now = dt("2025-06-16 09:00:00");
        Barber {
            id: "b1".to_string(),
            salon_id: "s1".to_string(),
            name: "Sam".to_string(),
            chair_number: 1,
            current_status: BarberStatus::Occupied,
            current_booking_id: Some("k1".to_string()),
            current_service_start: Some(now),
            current_service_end: Some(dt(end)),
            queue_length: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_red_not_expired_inside_grace() {
        let policy = QueuePolicy::default();
        let booking = red_booking("2025-06-16 10:00:00");
        // T + 45m + 4m
        assert!(!is_expired(&booking, &dt("2025-06-16 10:49:00"), &policy));
        // Exactly at the deadline is still live.
        assert!(!is_expired(&booking, &dt("2025-06-16 10:50:00"), &policy));
    }

    #[test]
    fn test_red_expired_after_grace() {
        let policy = QueuePolicy::default();
        let booking = red_booking("2025-06-16 10:00:00");
        // T + 45m + 5m + 1s
        assert!(is_expired(&booking, &dt("2025-06-16 10:50:01"), &policy));
    }

    #[test]
    fn test_expiry_ignored_once_arrived() {
        let policy = QueuePolicy::default();
        let mut booking = red_booking("2025-06-16 10:00:00");
        booking.queue_status = QueueStatus::Orange;
        assert!(!is_expired(&booking, &dt("2025-06-16 13:00:00"), &policy));
    }

    #[test]
    fn test_overtime() {
        let barber = occupied_barber("2025-06-16 10:20:00");
        assert!(!is_overtime(&barber, &dt("2025-06-16 10:20:00")));
        assert!(is_overtime(&barber, &dt("2025-06-16 10:20:01")));

        let mut idle = barber.clone();
        idle.current_status = BarberStatus::Available;
        assert!(!is_overtime(&idle, &dt("2025-06-16 11:00:00")));
    }

    #[test]
    fn test_remaining_rounds_up() {
        let barber = occupied_barber("2025-06-16 10:20:00");
        assert_eq!(remaining_service_minutes(&barber, &dt("2025-06-16 10:00:00")), 20);
        assert_eq!(remaining_service_minutes(&barber, &dt("2025-06-16 10:00:30")), 20);
        assert_eq!(remaining_service_minutes(&barber, &dt("2025-06-16 10:25:00")), 0);
    }

    #[test]
    fn test_actual_duration_rounds() {
        let start = dt("2025-06-16 10:00:00");
        assert_eq!(actual_duration_minutes(&start, &dt("2025-06-16 10:20:29")), 20);
        assert_eq!(actual_duration_minutes(&start, &dt("2025-06-16 10:20:30")), 21);
        assert_eq!(actual_duration_minutes(&start, &start), 0);
    }

    #[test]
    fn test_wait_estimate_two_ahead_idle_barber() {
        assert_eq!(estimate_wait(0, 2, 45), 90);
        assert_eq!(estimate_wait(12, 1, 45), 57);
        assert_eq!(estimate_wait(0, 0, 45), 0);
    }
}
