//! SQLite storage implementation for financial snapshots.

mod model;
mod repository;

pub use model::FinancialSnapshotDB;
pub use repository::SnapshotRepository;

// Re-export trait from core for convenience
pub use snapledger_core::portfolio::snapshot::SnapshotRepositoryTrait;
