//! # Marketplace Settlement Ledger server
//!
//! The HTTP face of the settlement engine. It is responsible for:
//! * Receiving webhook calls from the storefront (orders, payment notifications, delivery updates,
//!   returns and withdrawal requests), authenticated by HMAC signature and an optional IP
//!   whitelist.
//! * Exposing the back-office API for finance and support staff: wallet queries, release
//!   management, withdrawal adjudication and role administration, guarded by JWT access tokens
//!   and per-route role checks.
//! * Running the background sweeper that auto-confirms stale deliveries and pays out releases
//!   that have come due.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more
//! information.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod storefront_routes;
pub mod sweeper;

#[cfg(test)]
mod endpoint_tests;
