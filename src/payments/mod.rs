//! Payment processor seam.
//!
//! Licensing code talks to [`PaymentProcessor`]; [`StripeClient`] is the
//! production implementation.

mod stripe;

pub use stripe::*;

use std::collections::BTreeMap;

use futures::future::BoxFuture;

use crate::error::Result;

/// Stripe status for a settled payment.
pub const STATUS_SUCCEEDED: &str = "succeeded";
/// Metadata key carrying the number of licenses bought.
pub const METADATA_LICENSE_COUNT: &str = "license_count";
pub const METADATA_PRODUCT_ID: &str = "product_id";

/// The parts of a payment intent that licensing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    /// Billing email entered on the payment form, if any.
    pub billing_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntent {
    pub fn succeeded(&self) -> bool {
        self.status == STATUS_SUCCEEDED
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPaymentIntent {
    pub id: String,
    pub client_secret: String,
}

pub trait PaymentProcessor: Send + Sync {
    fn get_payment_intent<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<PaymentIntent>>;

    fn create_payment_intent<'a>(
        &'a self,
        amount_cents: i64,
        currency: &'a str,
        metadata: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<CreatedPaymentIntent>>;
}
