//! # Reconciliation server
//! This crate runs the payment reconciliation workers against the marketplace ledger. It is responsible for:
//! * Checking open Stripe and Lightning invoices and recording completed payments.
//! * Sending pending withdrawals to the USDT sidecar, and following up on the ones that were delayed.
//! * Crediting USDT and Stripe deposits, and failing the ones that expire.
//! * Serving user balances.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/balance/{user_id}`: The user's USD balance.
pub mod cli;
pub mod config;
pub mod errors;
pub mod event_log;
pub mod integrations;
pub mod routes;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
