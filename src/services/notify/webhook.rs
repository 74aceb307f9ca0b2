use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::QueueNotifier;
use crate::models::QueueEvent;

pub const SIGNATURE_HEADER: &str = "x-queue-signature";

pub struct WebhookNotifier {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, secret: String) -> Self {
        Self {
            url,
            secret,
            client: reqwest::Client::new(),
        }
    }
}

/// Base64 HMAC-SHA1 of the request body. Empty secret means unsigned.
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    if secret.is_empty() {
        return None;
    }
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl QueueNotifier for WebhookNotifier {
    async fn notify(&self, event: &QueueEvent) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event)?;

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(signature) = sign_payload(&self.secret, &body) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        request
            .body(body)
            .send()
            .await
            .context("failed to deliver queue webhook")?
            .error_for_status()
            .context("queue webhook returned error")?;

        Ok(())
    }
}
