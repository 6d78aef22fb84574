//! License server - trials, purchases and machine-bound licenses
//!
//! Clients ask for a trial or a license for their machine and receive a
//! payload signed with the server's Ed25519 key, which they verify offline.
//! Purchases go through Stripe; license codes are delivered by email.

pub mod config;
pub mod email;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod identity;
pub mod licensing;
pub mod models;
pub mod payments;
pub mod rate_limit;
pub mod signing;
pub mod state;
pub mod store;
pub mod util;
