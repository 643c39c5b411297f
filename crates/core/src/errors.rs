//! Core error types for the snapshot engine.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer.

use chrono::{NaiveDate, ParseError as ChronoParseError};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the engine.
///
/// The variants map onto three failure classes the callers care about:
/// storage failures (`Database`), validation failures (`Validation`,
/// `Calculation`) and integrity failures (`Integrity`). The first two may be
/// retried through the single-date fallback, integrity failures never are.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Snapshot calculation failed: {0}")]
    Calculation(#[from] CalculatorError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Transient storage errors and invariant violations can be retried through
    /// the slower per-date path.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Validation(_) | Error::Calculation(_)
        )
    }

    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Error::Database(_))
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate key).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A foreign key constraint was violated.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Errors raised while computing snapshots.
#[derive(Error, Debug)]
pub enum CalculatorError {
    #[error("Invalid movement data: {0}")]
    InvalidMovement(String),

    #[error("Currency mismatch for position {position_key}: position is {position_currency}, movement {movement_id} is {movement_currency}")]
    CurrencyMismatch {
        position_key: String,
        position_currency: String,
        movement_id: String,
        movement_currency: String,
    },

    #[error("Movement {movement_id} dated {movement_date} was routed to snapshot date {snapshot_date}")]
    DateMismatch {
        movement_id: String,
        movement_date: NaiveDate,
        snapshot_date: NaiveDate,
    },

    #[error("Calculation failed: {0}")]
    Calculation(String),
}

/// Validation errors for input records and computed snapshots.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Movement {movement_id} is malformed: {reason}")]
    MalformedMovement { movement_id: String, reason: String },

    #[error("Snapshot {snapshot_id} violates invariant: {reason}")]
    SnapshotInvariant { snapshot_id: String, reason: String },

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

/// Errors that must never be retried automatically.
#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("Source file {path} changed since the import started (expected fingerprint {expected}, found {actual})")]
    SourceChanged {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Import session {session_id} is {phase} and cannot be resumed; start a fresh import")]
    SessionNotResumable { session_id: String, phase: String },
}

/// Errors from the resumable import session state machine.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Import session {0} not found")]
    SessionNotFound(String),

    #[error("Chunk {chunk_number} of session {session_id} not found")]
    ChunkNotFound { session_id: String, chunk_number: i32 },

    #[error("Invalid phase transition for session {session_id}: {from} -> {to}")]
    InvalidTransition {
        session_id: String,
        from: String,
        to: String,
    },

    #[error("Failed to read source {path}: {reason}")]
    SourceUnreadable { path: String, reason: String },

    #[error("Source {0} contains no valid movements")]
    EmptySource(String),
}

// === From implementations for common error types ===

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
