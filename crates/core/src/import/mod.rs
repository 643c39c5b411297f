//! Resumable, chunked import of broker statements.

pub mod chunk_planner;
pub mod fingerprint;
pub mod import_model;
pub mod import_service;
pub mod import_traits;

pub use chunk_planner::*;
pub use fingerprint::*;
pub use import_model::*;
pub use import_service::*;
pub use import_traits::*;

#[cfg(test)]
mod import_service_tests;
