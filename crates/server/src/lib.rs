//! Marketboard server library.
//!
//! Listing writes with in-transaction quota accounting, out-of-band quota
//! reconciliation, and per-IP fixed-window quotas. Exposed as a library so
//! the CLI and integration tests share the same code paths.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod ip_quota;
pub mod middleware;
pub mod models;
pub mod reconcile;
pub mod routes;
pub mod state;
