use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::payments::{PAYMENT_INTENT_SUCCEEDED, StripePaymentIntentObject, StripeWebhookEvent};
use crate::state::AppState;

use super::common::{WebhookEvent, WebhookProvider, WebhookResult, handle_webhook};

/// Stripe webhook provider implementation.
pub struct StripeWebhookProvider;

impl WebhookProvider for StripeWebhookProvider {
    fn provider_name(&self) -> &'static str {
        "stripe"
    }

    fn extract_signature(&self, headers: &HeaderMap) -> Result<String, WebhookResult> {
        headers
            .get("stripe-signature")
            .ok_or((StatusCode::BAD_REQUEST, "Missing stripe-signature header"))?
            .to_str()
            .map(|s| s.to_string())
            .map_err(|e| {
                tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid signature header")
            })
    }

    fn verify_signature(
        &self,
        state: &AppState,
        body: &Bytes,
        signature: &str,
    ) -> Result<bool, WebhookResult> {
        state
            .stripe
            .verify_webhook_signature(body, signature)
            .map_err(|e| {
                tracing::debug!("Malformed Stripe signature header: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid signature header")
            })
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: StripeWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        if event.event_type != PAYMENT_INTENT_SUCCEEDED {
            tracing::debug!(event_type = %event.event_type, "Ignoring Stripe event");
            return Ok(WebhookEvent::Ignored);
        }

        let intent: StripePaymentIntentObject = serde_json::from_value(event.data.object)
            .map_err(|e| {
                tracing::error!("Failed to parse payment intent object: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid payment intent")
            })?;

        tracing::debug!(
            event_id = event.id.as_deref().unwrap_or("-"),
            payment_id = %intent.id,
            "Stripe payment succeeded"
        );

        Ok(WebhookEvent::PaymentSucceeded {
            payment_id: intent.id,
        })
    }
}

pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_webhook(&StripeWebhookProvider, &state, headers, body).await
}
