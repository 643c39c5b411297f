//! Snapledger Core - per-day, per-currency account snapshots and the
//! resumable import that feeds them.
//!
//! This crate is database-agnostic. It defines the repository traits that
//! the `storage-sqlite` crate implements, plus an in-memory implementation
//! in [`memory`].

pub mod constants;
pub mod errors;
pub mod import;
pub mod memory;
pub mod movements;
pub mod portfolio;
pub mod prices;
pub mod settings;
pub mod utils;

pub use portfolio::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
