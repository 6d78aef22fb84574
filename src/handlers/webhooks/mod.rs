pub mod common;
pub mod stripe;

pub use stripe::handle_stripe_webhook;

use axum::{Router, extract::DefaultBodyLimit, routing::post};

use crate::state::AppState;

/// Largest webhook body accepted; bigger deliveries get 413.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 64 * 1024;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/purchase/webhook",
        post(handle_stripe_webhook).layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES)),
    )
}
