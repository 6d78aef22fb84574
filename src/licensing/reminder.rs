use serde::{Deserialize, Serialize};

use crate::email::EmailKind;
use crate::error::AppError;
use crate::identity::{Email, LicenseCode, canonicalize_email, user_id};
use crate::models::DBLicenses;
use crate::store::Mutation;

use super::Licensor;

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderRequest {
    pub email: String,
}

/// Always empty: the reply must not reveal whether the address is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReply {}

/// Transaction body: if a reminder is due, stamp the send time and return
/// what to send.
fn claim_reminder(
    doc: Option<DBLicenses>,
    now: i64,
    interval: i64,
) -> (Mutation<DBLicenses>, Option<(Email, Vec<LicenseCode>)>) {
    let Some(mut doc) = doc else {
        return (Mutation::Keep, None);
    };

    // A clock that went backwards also counts as "too soon".
    if doc.licenses.is_empty() || now - doc.last_email_sent_at < interval {
        return (Mutation::Keep, None);
    }

    doc.last_email_sent_at = now;
    let due = (doc.email.clone(), doc.codes());
    (Mutation::Put(doc), Some(due))
}

impl Licensor {
    /// Email a user their license codes, at most once per reminder interval.
    ///
    /// Unknown addresses, malformed addresses, rate-limited requests and
    /// delivery failures all produce the same empty reply.
    pub async fn send_reminder(&self, request: &ReminderRequest) -> ReminderReply {
        let Ok(email) = canonicalize_email(&request.email) else {
            tracing::debug!("Reminder requested for malformed email");
            return ReminderReply::default();
        };

        let user = user_id(&self.policy.product_id, &email);
        let now = self.clock.now();
        let interval = self.policy.reminder_interval_secs;

        let due = self
            .store
            .with_licenses(&user, |doc| Ok::<_, AppError>(claim_reminder(doc, now, interval)));

        match due {
            Ok(Some((to, codes))) => {
                self.send_license_email(EmailKind::Reminder, &to, &codes).await;
            }
            Ok(None) => tracing::debug!("No reminder sent (unknown user or rate limited)"),
            Err(e) => tracing::error!(error = %e, "Reminder transaction failed"),
        }

        ReminderReply::default()
    }
}
