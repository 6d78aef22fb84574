use serde::{Deserialize, Serialize};

use crate::config::Policy;
use crate::email::EmailKind;
use crate::error::LicenseError;
use crate::identity::{Email, LicenseCode, canonicalize_email, user_id};
use crate::models::{DBLicense, DBLicenses};
use crate::payments::{METADATA_LICENSE_COUNT, METADATA_PRODUCT_ID, PaymentIntent};
use crate::store::Mutation;

use super::{Licensor, generate_license_codes};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishPurchaseRequest {
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReply {
    #[serde(rename = "licenseEmail")]
    pub email: Email,
    pub license_codes: Vec<LicenseCode>,
}

/// What a settled payment asks for.
#[derive(Debug)]
struct Order {
    email: Email,
    license_count: usize,
}

impl Order {
    fn from_intent(intent: &PaymentIntent, policy: &Policy) -> Result<Self, LicenseError> {
        if let Some(product) = intent.metadata.get(METADATA_PRODUCT_ID) {
            if *product != policy.product_id {
                tracing::warn!(payment_id = %intent.id, product = %product, "Payment is for another product");
                return Err(LicenseError::PaymentInvalid);
            }
        }

        let email = intent
            .billing_email
            .as_deref()
            .and_then(|raw| canonicalize_email(raw).ok())
            .ok_or_else(|| {
                tracing::warn!(payment_id = %intent.id, "Payment has no usable billing email");
                LicenseError::PaymentInvalid
            })?;

        let license_count = intent
            .metadata
            .get(METADATA_LICENSE_COUNT)
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|n| (policy.license_count_min..=policy.license_count_max).contains(n))
            .ok_or_else(|| {
                tracing::warn!(payment_id = %intent.id, "Payment has no valid license count");
                LicenseError::PaymentInvalid
            })?;

        Ok(Self {
            email,
            license_count: license_count as usize,
        })
    }
}

#[derive(Debug)]
struct PurchaseOutcome {
    codes: Vec<LicenseCode>,
    /// Whether this call created the licenses (and so owes a receipt).
    created: bool,
}

/// Transaction body: create `count` licenses for `payment_id` unless that
/// payment already produced some, in which case return those.
fn record_purchase(
    doc: Option<DBLicenses>,
    email: &Email,
    payment_id: &str,
    count: usize,
    pool: &[LicenseCode],
    version: u32,
    now: i64,
) -> Result<(Mutation<DBLicenses>, PurchaseOutcome), LicenseError> {
    let mut doc = doc.unwrap_or_else(|| DBLicenses::new(email.clone()));

    let existing = doc.codes_for_payment(payment_id);
    if !existing.is_empty() {
        return Ok((
            Mutation::Keep,
            PurchaseOutcome {
                codes: existing,
                created: false,
            },
        ));
    }

    let mut codes = Vec::with_capacity(count);
    for code in pool {
        if codes.len() == count {
            break;
        }
        if doc.licenses.contains_key(code) {
            continue;
        }
        doc.licenses
            .insert(code.clone(), DBLicense::new(version, payment_id, now));
        codes.push(code.clone());
    }

    if codes.len() < count {
        tracing::error!(payment_id, wanted = count, got = codes.len(), "License code pool exhausted");
        return Err(LicenseError::Unknown);
    }

    codes.sort();
    Ok((Mutation::Put(doc), PurchaseOutcome { codes, created: true }))
}

impl Licensor {
    /// Turn a settled payment into license codes, exactly once per payment.
    ///
    /// Safe to call any number of times, concurrently, from the client and
    /// the webhook: every call returns the same codes and only the call that
    /// created them sends the receipt.
    pub async fn finish_purchase(&self, payment_intent_id: &str) -> Result<PurchaseReply, LicenseError> {
        let payment_intent_id = payment_intent_id.trim();
        if payment_intent_id.is_empty() {
            return Err(LicenseError::PaymentInvalid);
        }

        let intent = self
            .payments
            .get_payment_intent(payment_intent_id)
            .await
            .map_err(|e| {
                tracing::warn!(payment_id = %payment_intent_id, error = %e, "Failed to fetch payment intent");
                LicenseError::PaymentInvalid
            })?;

        if !intent.succeeded() {
            tracing::info!(payment_id = %intent.id, status = %intent.status, "Payment not succeeded");
            return Err(LicenseError::PaymentUnsuccessful);
        }

        let order = Order::from_intent(&intent, &self.policy)?;
        let pool = generate_license_codes(order.license_count * 2);
        let user = user_id(&self.policy.product_id, &order.email);
        let version = self.policy.license_version;
        let now = self.clock.now();

        let outcome = self.store.with_licenses(&user, |doc| {
            record_purchase(
                doc,
                &order.email,
                &intent.id,
                order.license_count,
                &pool,
                version,
                now,
            )
        })?;

        if outcome.created {
            tracing::info!(payment_id = %intent.id, count = outcome.codes.len(), "Created licenses");
            self.send_license_email(EmailKind::Receipt, &order.email, &outcome.codes)
                .await;
        } else {
            tracing::debug!(payment_id = %intent.id, "Purchase already finalized");
        }

        Ok(PurchaseReply {
            email: order.email,
            license_codes: outcome.codes,
        })
    }
}
