use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LicenseError;
use crate::payments::{METADATA_LICENSE_COUNT, METADATA_PRODUCT_ID};

use super::Licensor;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub license_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReply {
    pub id: String,
    pub client_secret: String,
}

impl Licensor {
    /// Open a payment intent for `license_count` licenses.
    ///
    /// The count rides along as metadata and is read back when the purchase
    /// is finished.
    pub async fn create_payment_intent(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<PaymentReply, LicenseError> {
        let count = request.license_count;
        if !(self.policy.license_count_min..=self.policy.license_count_max).contains(&count) {
            return Err(LicenseError::InvalidInput);
        }

        let amount = self
            .policy
            .license_price_cents
            .checked_mul(i64::from(count))
            .ok_or(LicenseError::InvalidInput)?;

        let metadata = BTreeMap::from([
            (METADATA_LICENSE_COUNT.to_string(), count.to_string()),
            (METADATA_PRODUCT_ID.to_string(), self.policy.product_id.clone()),
        ]);

        let created = self
            .payments
            .create_payment_intent(amount, &self.policy.currency, &metadata)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create payment intent");
                LicenseError::PaymentInvalid
            })?;

        tracing::info!(payment_id = %created.id, count, amount, "Created payment intent");

        Ok(PaymentReply {
            id: created.id,
            client_secret: created.client_secret,
        })
    }
}
