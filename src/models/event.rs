use serde::{Deserialize, Serialize};

use super::QueueStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    BookingCreated,
    Arrived,
    ServiceStarted,
    ServiceExtended,
    ServiceCompleted,
    AutoCompleted,
    Expired,
    BarberStatusChanged,
    FeedbackSubmitted,
}

impl QueueEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEventKind::BookingCreated => "booking_created",
            QueueEventKind::Arrived => "arrived",
            QueueEventKind::ServiceStarted => "service_started",
            QueueEventKind::ServiceExtended => "service_extended",
            QueueEventKind::ServiceCompleted => "service_completed",
            QueueEventKind::AutoCompleted => "auto_completed",
            QueueEventKind::Expired => "expired",
            QueueEventKind::BarberStatusChanged => "barber_status_changed",
            QueueEventKind::FeedbackSubmitted => "feedback_submitted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking_created" => Some(QueueEventKind::BookingCreated),
            "arrived" => Some(QueueEventKind::Arrived),
            "service_started" => Some(QueueEventKind::ServiceStarted),
            "service_extended" => Some(QueueEventKind::ServiceExtended),
            "service_completed" => Some(QueueEventKind::ServiceCompleted),
            "auto_completed" => Some(QueueEventKind::AutoCompleted),
            "expired" => Some(QueueEventKind::Expired),
            "barber_status_changed" => Some(QueueEventKind::BarberStatusChanged),
            "feedback_submitted" => Some(QueueEventKind::FeedbackSubmitted),
            _ => None,
        }
    }
}

/// One persisted status transition, replayed to SSE subscribers and the webhook notifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueEvent {
    pub id: i64,
    pub salon_id: String,
    pub barber_id: String,
    pub booking_id: Option<String>,
    pub kind: QueueEventKind,
    pub status: Option<QueueStatus>,
    pub detail: String,
    pub created_at: String,
}
