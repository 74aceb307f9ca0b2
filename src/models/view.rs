use chrono::NaiveDateTime;
use serde::Serialize;

use super::{BarberStatus, Booking, QueueStatus};

#[derive(Debug, Clone, Serialize)]
pub struct SalonView {
    pub salon_id: String,
    pub barbers: Vec<BarberSummary>,
    pub total_serving: i64,
    pub total_waiting: i64,
    pub total_booked: i64,
    pub average_wait_minutes: i64,
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct BarberSummary {
    pub barber_id: String,
    pub name: String,
    pub chair_number: i32,
    pub status: BarberStatus,
    pub current_customer: Option<String>,
    pub time_left_minutes: Option<i64>,
    pub is_overtime: bool,
    pub queue_length: i64,
    pub estimated_wait_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BarberQueueView {
    pub salon_id: String,
    pub barber_id: String,
    pub barber_name: String,
    pub chair_number: i32,
    pub status: BarberStatus,
    pub current: Option<ServingEntry>,
    pub waiting: Vec<WaitingEntry>,
    pub booked: Vec<BookedEntry>,
    pub stats: QueueStats,
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServingEntry {
    pub booking: Booking,
    pub elapsed_minutes: i64,
    pub remaining_minutes: i64,
    pub overtime_minutes: i64,
    pub is_overtime: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitingEntry {
    pub booking: Booking,
    pub position: i64,
    pub estimated_wait_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookedEntry {
    pub booking: Booking,
    pub expires_in_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub waiting_count: i64,
    pub booked_count: i64,
    pub estimated_wait_minutes: i64,
    pub average_service_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerView {
    pub booking_id: String,
    pub booking_code: String,
    pub status: QueueStatus,
    pub barber_id: String,
    pub position: Option<i64>,
    pub estimated_wait_minutes: Option<i64>,
    pub expires_in_minutes: Option<i64>,
    pub elapsed_minutes: Option<i64>,
    pub remaining_minutes: Option<i64>,
    pub is_overtime: bool,
    pub is_expired: bool,
    pub generated_at: NaiveDateTime,
}
