use std::sync::Arc;

use crate::licensing::Licensor;
use crate::payments::StripeClient;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub licensor: Arc<Licensor>,
    /// Used only to verify webhook signatures; payment lookups go through
    /// the licensor's processor.
    pub stripe: Arc<StripeClient>,
}
