use std::sync::Arc;

use crate::models::QueueEvent;
use crate::state::AppState;

/// Fans persisted events out to SSE subscribers and the outbound notifier.
/// Delivery failures are logged; the transitions are already committed.
pub async fn publish(state: &Arc<AppState>, events: Vec<QueueEvent>) {
    for event in events {
        // Ignore if no receivers
        let _ = state.events_tx.send(event.clone());

        if let Err(e) = state.notifier.notify(&event).await {
            tracing::warn!(
                error = %e,
                event_id = event.id,
                kind = event.kind.as_str(),
                "failed to deliver queue notification"
            );
        }
    }
}
