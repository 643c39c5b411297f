//! SQLite storage implementation for Snapledger.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the repository traits defined in `snapledger-core` and contains:
//! - Database connection pooling and management
//! - Diesel migrations
//! - Repository implementations for movements, snapshots, prices and import sessions
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place in the workspace where Diesel dependencies exist.
//! `snapledger-core` is database-agnostic and works with traits.
//!
//! ```text
//!   core (engine, import)        cli
//!            │                    │
//!            └─────────┬──────────┘
//!                      │
//!                      ▼
//!          storage-sqlite (this crate)
//!                      │
//!                      ▼
//!                  SQLite DB
//! ```
//!
//! All writes go through a single writer actor ([`WriteHandle`]); each job
//! runs in one `IMMEDIATE` transaction.

pub mod db;
pub mod errors;
pub mod schema;
pub mod utils;

// Repository implementations
pub mod import;
pub mod movements;
pub mod portfolio;
pub mod prices;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

// Re-export repositories
pub use import::ImportSessionRepository;
pub use movements::MovementRepository;
pub use portfolio::snapshot::SnapshotRepository;
pub use prices::PriceRepository;

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

// Re-export from snapledger-core for convenience
pub use snapledger_core::errors::{DatabaseError, Error, Result};
