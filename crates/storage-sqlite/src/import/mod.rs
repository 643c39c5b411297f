//! SQLite storage for import sessions and their chunks.

mod model;
mod repository;

pub use model::{ImportChunkDB, ImportSessionDB};
pub use repository::ImportSessionRepository;

pub use snapledger_core::import::ImportSessionRepositoryTrait;
