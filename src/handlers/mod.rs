pub mod barbers;
pub mod health;
pub mod queue;
pub mod walkins;

use axum::http::HeaderMap;
use chrono::{NaiveDateTime, SubsecRound, Utc};

use crate::errors::AppError;

/// Bearer check for barber/staff routes. An empty configured token disables it (dev mode).
pub(crate) fn check_staff(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    if expected_token.is_empty() {
        return Ok(());
    }

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Storage keeps whole seconds.
pub(crate) fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}
