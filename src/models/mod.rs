pub mod barber;
pub mod booking;
pub mod event;
pub mod view;

pub use barber::{Barber, BarberStatus};
pub use booking::{Booking, BookingKind, Feedback, QueueStatus, Ratings};
pub use event::{QueueEvent, QueueEventKind};
pub use view::{
    BarberQueueView, BarberSummary, BookedEntry, CustomerView, QueueStats, SalonView,
    ServingEntry, WaitingEntry,
};
