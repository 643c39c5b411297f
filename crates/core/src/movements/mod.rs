//! Movements: the immutable trades, income and cash flows snapshots are built from.

pub mod idempotency;
pub mod movements_model;
pub mod movements_traits;
pub mod statement_reader;

#[cfg(test)]
mod movements_model_tests;

pub use idempotency::*;
pub use movements_model::*;
pub use movements_traits::*;
pub use statement_reader::*;
