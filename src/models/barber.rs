use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Barber {
    pub id: String,
    pub salon_id: String,
    pub name: String,
    pub chair_number: i32,
    pub current_status: BarberStatus,
    pub current_booking_id: Option<String>,
    pub current_service_start: Option<NaiveDateTime>,
    pub current_service_end: Option<NaiveDateTime>,
    pub queue_length: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BarberStatus {
    Available,
    Occupied,
    Break,
}

impl BarberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BarberStatus::Available => "AVAILABLE",
            BarberStatus::Occupied => "OCCUPIED",
            BarberStatus::Break => "BREAK",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(BarberStatus::Available),
            "OCCUPIED" => Some(BarberStatus::Occupied),
            "BREAK" => Some(BarberStatus::Break),
            _ => None,
        }
    }
}
