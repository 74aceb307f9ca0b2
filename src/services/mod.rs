pub mod booking_code;
pub mod chairs;
pub mod events;
pub mod notify;
pub mod projection;
pub mod queue;
pub mod timing;
