use std::collections::{BTreeMap, HashMap};

use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};
use super::{CreatedPaymentIntent, PaymentIntent, PaymentProcessor};

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Event type that carries a settled payment.
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    payment_method: Option<StripePaymentMethodField>,
    receipt_email: Option<String>,
}

/// `payment_method` is an id unless it was expanded.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StripePaymentMethodField {
    Expanded(StripePaymentMethod),
    Id(#[allow(dead_code)] String),
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethod {
    billing_details: StripeBillingDetails,
}

#[derive(Debug, Deserialize)]
struct StripeBillingDetails {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentIntentResponse {
    id: String,
    client_secret: String,
}

impl From<StripePaymentIntent> for PaymentIntent {
    fn from(intent: StripePaymentIntent) -> Self {
        let billing_email = match intent.payment_method {
            Some(StripePaymentMethodField::Expanded(method)) => method.billing_details.email,
            _ => None,
        }
        .or(intent.receipt_email);

        PaymentIntent {
            id: intent.id,
            status: intent.status,
            billing_email,
            metadata: intent.metadata.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    async fn fetch_payment_intent(&self, id: &str) -> Result<PaymentIntent> {
        // Path segment must not smuggle in another resource.
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(AppError::BadRequest("Invalid payment intent id".into()));
        }

        let response = self
            .client
            .get(format!("{}/payment_intents/{}", STRIPE_API_BASE, id))
            .basic_auth(&self.secret_key, None::<&str>)
            .query(&[("expand[]", "payment_method")])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Stripe API error: {} - {}",
                status, error_text
            )));
        }

        let intent: StripePaymentIntent = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(intent.into())
    }

    async fn post_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<CreatedPaymentIntent> {
        let mut form = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        form.extend(
            metadata
                .iter()
                .map(|(key, value)| (format!("metadata[{}]", key), value.clone())),
        );

        let response = self
            .client
            .post(format!("{}/payment_intents", STRIPE_API_BASE))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("Stripe API error: {}", error_text)));
        }

        let created: CreatePaymentIntentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(CreatedPaymentIntent {
            id: created.id,
            client_secret: created.client_secret,
        })
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;
    /// How far in the future a timestamp may be (clock skew).
    const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        self.verify_webhook_signature_at(payload, signature, chrono::Utc::now().timestamp())
    }

    /// Verify a `stripe-signature` header (`t=<ts>,v1=<hex>[,v1=...]`) as of `now`.
    pub fn verify_webhook_signature_at(&self, payload: &[u8], signature: &str, now: i64) -> Result<bool> {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                candidates.push(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or_else(|| AppError::BadRequest("Invalid signature format".into()))?;
        if candidates.is_empty() {
            return Err(AppError::BadRequest("Invalid signature format".into()));
        }

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest("Invalid timestamp in signature".into()))?;

        let age = now - timestamp;
        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }
        if age < -Self::WEBHOOK_FUTURE_SKEW_SECS {
            tracing::warn!("Stripe webhook rejected: timestamp in the future (age={}s)", age);
            return Ok(false);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());
        let expected_bytes = expected.as_bytes();

        // Signature length is not secret, only its content.
        Ok(candidates.iter().any(|candidate| {
            let provided = candidate.as_bytes();
            provided.len() == expected_bytes.len() && bool::from(expected_bytes.ct_eq(provided))
        }))
    }
}

impl PaymentProcessor for StripeClient {
    fn get_payment_intent<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<PaymentIntent>> {
        Box::pin(self.fetch_payment_intent(id))
    }

    fn create_payment_intent<'a>(
        &'a self,
        amount_cents: i64,
        currency: &'a str,
        metadata: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<CreatedPaymentIntent>> {
        Box::pin(self.post_payment_intent(amount_cents, currency, metadata))
    }
}

/// Generic Stripe webhook event - object is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// `data.object` of a `payment_intent.*` event.
#[derive(Debug, Deserialize)]
pub struct StripePaymentIntentObject {
    pub id: String,
}
