//! Incremental snapshot engine: relevance filtering, scenario resolution,
//! batch orchestration and the single-date fallback.

pub mod batch_service;
pub mod calculators;
pub mod context;
pub mod coordinator;
pub mod relevance;
pub mod scenario;
pub mod sequencer;
pub mod single_date_processor;

pub use batch_service::*;
pub use calculators::{evaluate_pair, PairOutcome, SnapshotTarget};
pub use context::*;
pub use coordinator::*;
pub use relevance::*;
pub use scenario::*;
pub use sequencer::*;
pub use single_date_processor::*;


#[cfg(test)]
mod calculators_tests;
