//! Trial, license and purchase issuance.
//!
//! Every operation follows the same shape: canonicalize input, do any I/O
//! or randomness up front, run one pure store transaction, then act on
//! the committed result (seal a license, send an email).

mod codes;
mod license;
mod payment;
mod purchase;
mod reminder;
mod trial;

pub use codes::{CODE_LEN, generate_license_codes};
pub use license::LicenseRequest;
pub use payment::{CreatePaymentRequest, PaymentReply};
pub use purchase::{FinishPurchaseRequest, PurchaseReply};
pub use reminder::{ReminderReply, ReminderRequest};
pub use trial::TrialRequest;

use std::sync::Arc;

use serde::Serialize;

use crate::config::Policy;
use crate::email::{EmailKind, Mailer, compose};
use crate::error::LicenseError;
use crate::identity::{Email, LicenseCode};
use crate::payments::PaymentProcessor;
use crate::signing::{SealedLicense, Signer};
use crate::store::LicenseStore;
use crate::util::Clock;

/// Reply body for operations that hand out a sealed license.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseReply {
    pub license: SealedLicense,
}

/// Wire shape shared by every endpoint: the operation's body on success,
/// or only a user-facing `error` string.
#[derive(Debug, Clone, Serialize)]
pub struct Reply<T> {
    #[serde(flatten)]
    pub body: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Reply<T> {
    pub fn ok(body: T) -> Self {
        Self {
            body: Some(body),
            error: None,
        }
    }

    pub fn err(error: LicenseError) -> Self {
        Self {
            body: None,
            error: Some(error.message().to_string()),
        }
    }
}

impl<T> From<Result<T, LicenseError>> for Reply<T> {
    fn from(result: Result<T, LicenseError>) -> Self {
        match result {
            Ok(body) => Reply::ok(body),
            Err(error) => Reply::err(error),
        }
    }
}

/// The licensing service with all of its collaborators.
pub struct Licensor {
    store: LicenseStore,
    signer: Signer,
    payments: Arc<dyn PaymentProcessor>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    policy: Policy,
}

impl Licensor {
    pub fn new(
        store: LicenseStore,
        signer: Signer,
        payments: Arc<dyn PaymentProcessor>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        policy: Policy,
    ) -> Self {
        Self {
            store,
            signer,
            payments,
            mailer,
            clock,
            policy,
        }
    }

    pub fn store(&self) -> &LicenseStore {
        &self.store
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Compose and send a license email. Failures are logged, never returned:
    /// by the time this runs the licenses are already committed.
    async fn send_license_email(&self, kind: EmailKind, to: &Email, codes: &[LicenseCode]) {
        let message = compose(
            kind,
            &self.policy.email_from,
            &self.policy.product_name,
            to,
            codes,
        );

        match self.mailer.send_email(&message).await {
            Ok(()) => tracing::debug!(?kind, count = codes.len(), "License email sent"),
            Err(e) => tracing::error!(?kind, error = %e, "Failed to send license email"),
        }
    }
}
