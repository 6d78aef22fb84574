//! License emails.
//!
//! Receipts (after a purchase) and reminders (on request) are two kinds of
//! one message, composed by [`compose`] and delivered through a [`Mailer`].
//! [`EmailService`] delivers via the Resend API.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::identity::{Email, LicenseCode};

/// Retry delays in seconds (exponential backoff: 1s, 4s, 16s)
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Which license email to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    /// Sent once, right after a purchase created new licenses.
    Receipt,
    /// Sent when the user asks for their codes again.
    Reminder,
}

/// A plain-text email ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Email transport.
pub trait Mailer: Send + Sync {
    fn send_email<'a>(&'a self, message: &'a EmailMessage) -> BoxFuture<'a, Result<()>>;
}

/// Build the license email for `to` listing `codes`.
pub fn compose(
    kind: EmailKind,
    from: &str,
    product_name: &str,
    to: &Email,
    codes: &[LicenseCode],
) -> EmailMessage {
    let (subject, intro) = match kind {
        EmailKind::Receipt => (
            format!("Your {} purchase", product_name),
            format!(
                "Thank you for purchasing {}! Your license {} listed below.",
                product_name,
                if codes.len() == 1 { "code is" } else { "codes are" }
            ),
        ),
        EmailKind::Reminder => (
            format!("Your {} license codes", product_name),
            format!(
                "You asked for a reminder of your {} license {}.",
                product_name,
                if codes.len() == 1 { "code" } else { "codes" }
            ),
        ),
    };

    let mut text = format!("{}\n\n", intro);
    for code in codes {
        text.push_str(&format!("    {}\n", code));
    }
    text.push_str(&format!(
        "\nTo activate {}, enter {} and one license code in the app.\n",
        product_name,
        to.as_str()
    ));
    if kind == EmailKind::Reminder {
        text.push_str("\nIf you didn't request this, you can ignore this email.\n");
    }

    EmailMessage {
        from: from.to_string(),
        to: to.as_str().to_string(),
        subject,
        text,
    }
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct ResendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

/// Email service using Resend API.
#[derive(Clone)]
pub struct EmailService {
    api_key: String,
    http_client: Client,
}

impl EmailService {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http_client: Client::new(),
        }
    }

    /// Send a request to Resend API with exponential backoff retry.
    ///
    /// Retries on transient errors (network issues, 5xx, 429 rate limit).
    /// Fails immediately on non-transient errors (4xx except 429).
    async fn send_request_with_retry(&self, request: &ResendEmailRequest<'_>) -> Result<()> {
        let mut last_error: Option<AppError> = None;

        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(attempt, delay_secs, "Retrying email send after transient failure");
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_resend_request(request).await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(attempt, subject = %request.subject, "Email sent successfully after retry");
                    } else {
                        tracing::info!(subject = %request.subject, "Email sent via Resend");
                    }
                    return Ok(());
                }
                Err((error, true)) => last_error = Some(error),
                Err((error, false)) => return Err(error),
            }
        }

        tracing::error!(
            attempts = RETRY_DELAYS.len() + 1,
            "Email send failed after all retries"
        );
        Err(last_error
            .unwrap_or_else(|| AppError::Upstream("Email service error: all retries exhausted".into())))
    }

    /// Send a single request to Resend API.
    ///
    /// Returns Ok(()) on success, or Err((AppError, is_transient)) on failure.
    async fn send_resend_request(
        &self,
        request: &ResendEmailRequest<'_>,
    ) -> std::result::Result<(), (AppError, bool)> {
        let response = self
            .http_client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to send request to Resend API");
                (AppError::Upstream(format!("Email service error: {}", e)), true)
            })?;

        let status = response.status();

        if status.is_success() {
            let _result: ResendEmailResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Resend API response");
                (AppError::Upstream("Email service response error".into()), false)
            })?;
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let is_transient = is_transient_status(status.as_u16());

        if is_transient {
            tracing::warn!(status = %status, body = %body, "Resend API returned transient error");
        } else {
            tracing::error!(status = %status, body = %body, "Resend API returned non-transient error");
        }

        Err((
            AppError::Upstream(format!("Email service error: {} - {}", status, body)),
            is_transient,
        ))
    }
}

impl Mailer for EmailService {
    fn send_email<'a>(&'a self, message: &'a EmailMessage) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = ResendEmailRequest {
                from: &message.from,
                to: vec![&message.to],
                subject: &message.subject,
                text: &message.text,
            };
            self.send_request_with_retry(&request).await
        })
    }
}

/// 429 and 5xx are worth retrying; other failures will not change.
fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}
