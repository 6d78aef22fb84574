mod license;
mod purchase;
mod trial;

pub use license::*;
pub use purchase::*;
pub use trial::*;

use axum::{Json, Router, routing::{get, post}};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::rate_limit;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(rate_limits: RateLimitConfig) -> Router<AppState> {
    // Both of these call the payment processor.
    let payments = Router::new()
        .route("/payment/create", post(create_payment))
        .route("/purchase/finish", post(finish_purchase));

    let licensing = Router::new()
        .route("/trial/lookup", post(lookup_trial))
        .route("/license/lookup", post(lookup_license))
        // Generic reply whether or not the email is known
        .route("/license/email", post(email_license_codes));

    let health = Router::new().route("/health", get(health));

    Router::new()
        .merge(rate_limit::limit(payments, rate_limits.strict_rpm))
        .merge(rate_limit::limit(licensing, rate_limits.standard_rpm))
        .merge(rate_limit::limit(health, rate_limits.relaxed_rpm))
}
