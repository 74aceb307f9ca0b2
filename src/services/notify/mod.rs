pub mod webhook;

use async_trait::async_trait;

use crate::models::QueueEvent;

/// Outbound channel for queue transitions (customer/barber apps, SMS bridge, ...).
#[async_trait]
pub trait QueueNotifier: Send + Sync {
    async fn notify(&self, event: &QueueEvent) -> anyhow::Result<()>;
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl QueueNotifier for NoopNotifier {
    async fn notify(&self, _event: &QueueEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
