//! Core types for Marketboard.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod listing;

pub use id::*;
pub use listing::*;
