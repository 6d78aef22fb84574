//! Per-IP rate limiting for public endpoints.
//!
//! Tiers:
//! - Strict: /payment/create, /purchase/finish - external API calls
//! - Standard: /trial/lookup, /license/lookup, /license/email
//! - Relaxed: /health
//!
//! Configure via RATE_LIMIT_STRICT_RPM, RATE_LIMIT_STANDARD_RPM and
//! RATE_LIMIT_RELAXED_RPM. A tier set to 0 is not limited.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

use crate::state::AppState;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Creates a rate limiter layer allowing `requests_per_minute` per IP.
///
/// Returns `None` when the limit is zero.
pub fn layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    if requests_per_minute == 0 {
        return None;
    }

    let period_secs = 60 / requests_per_minute as u64;
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs.max(1)))
        .burst_size(requests_per_minute)
        .finish()?;

    Some(GovernorLayer::new(Arc::new(config)))
}

/// Wrap `router` in a limiter for `requests_per_minute`, if non-zero.
pub fn limit(router: Router<AppState>, requests_per_minute: u32) -> Router<AppState> {
    match layer(requests_per_minute) {
        Some(layer) => router.layer(layer),
        None => router,
    }
}
