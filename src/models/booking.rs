use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub booking_code: String,
    pub kind: BookingKind,
    pub salon_id: String,
    pub barber_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub service: String,
    pub queue_status: QueueStatus,
    pub scheduled_for: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub arrived_at: Option<NaiveDateTime>,
    pub service_started_at: Option<NaiveDateTime>,
    pub service_ended_at: Option<NaiveDateTime>,
    pub estimated_duration: i32,
    pub selected_duration: Option<i32>,
    pub actual_duration: Option<i32>,
    pub is_expired: bool,
    pub feedback: Option<Feedback>,
    /// Arrival sequence within the barber's queue; breaks ties between equal `arrived_at`.
    #[serde(skip)]
    pub queue_seq: Option<i64>,
    pub updated_at: NaiveDateTime,
}

/// RED -> ORANGE -> GREEN -> COMPLETED, with RED -> EXPIRED as the only other exit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueueStatus {
    Red,
    Orange,
    Green,
    Completed,
    Expired,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Red => "RED",
            QueueStatus::Orange => "ORANGE",
            QueueStatus::Green => "GREEN",
            QueueStatus::Completed => "COMPLETED",
            QueueStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RED" => Some(QueueStatus::Red),
            "ORANGE" => Some(QueueStatus::Orange),
            "GREEN" => Some(QueueStatus::Green),
            "COMPLETED" => Some(QueueStatus::Completed),
            "EXPIRED" => Some(QueueStatus::Expired),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (QueueStatus::Red, QueueStatus::Orange)
                | (QueueStatus::Red, QueueStatus::Expired)
                | (QueueStatus::Orange, QueueStatus::Green)
                | (QueueStatus::Green, QueueStatus::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            QueueStatus::Completed | QueueStatus::Expired => true,
            QueueStatus::Red | QueueStatus::Orange | QueueStatus::Green => false,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingKind {
    WalkIn,
    PreBook,
}

impl BookingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingKind::WalkIn => "WALK_IN",
            BookingKind::PreBook => "PRE_BOOK",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "PRE_BOOK" => BookingKind::PreBook,
            _ => BookingKind::WalkIn,
        }
    }

    pub fn code_prefix(&self) -> &'static str {
        match self {
            BookingKind::WalkIn => "WLK",
            BookingKind::PreBook => "PRE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ratings {
    pub service: u8,
    pub barber: u8,
    pub ambience: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub ratings: Ratings,
    pub comment: Option<String>,
    pub submitted_at: NaiveDateTime,
}
