//! Domain models for the marketplace.

pub mod listing;

pub use listing::Listing;
