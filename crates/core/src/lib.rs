//! Marketboard Core - Shared types and quota rules.
//!
//! This crate provides the types and pure rules used across all Marketboard
//! components:
//! - `server` - Listing write API, quota reads and IP quota middleware
//! - `cli` - Migrations, reconciliation and operator tooling
//!
//! # Architecture
//!
//! The core crate contains only types and rules - no I/O, no database access,
//! no Redis clients. The server applies these rules inside its transactions,
//! so the counter arithmetic lives in exactly one place.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs and listing enums
//! - [`quota`] - Quota counter deltas and the zero clamp
//! - [`ip_quota`] - Fixed-window decisions for per-IP quotas
//! - [`reconcile`] - Drift report types

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod ip_quota;
pub mod quota;
pub mod reconcile;
pub mod types;

pub use types::*;
