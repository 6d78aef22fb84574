//! Provider-agnostic webhook handling.
//!
//! A provider knows where its signature lives, how to check it and how to
//! read its events. Everything after that is shared: a settled payment is
//! finished in the background, exactly as if the client had called
//! `/purchase/finish` itself.

use std::sync::Arc;

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
};

use crate::licensing::Licensor;
use crate::state::AppState;

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

/// Parsed webhook event with provider-agnostic data.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A payment settled; its licenses should exist.
    PaymentSucceeded { payment_id: String },
    /// Event type not relevant to licensing
    Ignored,
}

/// Trait for payment provider webhook handling.
pub trait WebhookProvider: Send + Sync {
    /// Provider name for logging (e.g., "stripe")
    fn provider_name(&self) -> &'static str;

    /// Extract signature from request headers.
    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult>;

    /// Verify the signature over the raw body. `Ok(false)` means it didn't match.
    fn verify_signature(
        &self,
        state: &AppState,
        body: &Bytes,
        signature: &str,
    ) -> Result<bool, WebhookResult>;

    /// Parse the webhook payload into a provider-agnostic event.
    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult>;
}

pub async fn handle_webhook<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let signature = match provider.extract_signature(&headers) {
        Ok(s) => s,
        Err(e) => return e,
    };

    // Nothing in the body is trusted before this.
    match provider.verify_signature(state, &body, &signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(e) => return e,
    }

    let event = match provider.parse_event(&body) {
        Ok(e) => e,
        Err(e) => return e,
    };

    match event {
        WebhookEvent::PaymentSucceeded { payment_id } => {
            spawn_finish_purchase(state.licensor.clone(), provider.provider_name(), payment_id);
            (StatusCode::OK, "Event received")
        }
        WebhookEvent::Ignored => (StatusCode::OK, "Event ignored"),
    }
}

/// Finish the purchase off the request path so the provider gets its 200
/// promptly. Failures are logged; the client's own finish call or the
/// provider's redelivery will try again.
fn spawn_finish_purchase(licensor: Arc<Licensor>, provider: &'static str, payment_id: String) {
    tokio::spawn(async move {
        match licensor.finish_purchase(&payment_id).await {
            Ok(reply) => tracing::info!(
                provider,
                payment_id = %payment_id,
                count = reply.license_codes.len(),
                "Webhook finished purchase"
            ),
            Err(e) => tracing::warn!(
                provider,
                payment_id = %payment_id,
                error = e.message(),
                "Webhook could not finish purchase"
            ),
        }
    });
}
