//! Import session domain models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::{Error, ImportError, Result};
use crate::movements::RejectedMovement;
use crate::portfolio::engine::RecalculationReport;
use crate::utils::DateRange;

/// Phase of an import session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportPhase {
    /// Reading and validating the source, planning chunks
    #[default]
    Analyzing,
    /// Committing chunks of movements
    PersistingMovements,
    /// Recomputing snapshots over the imported dates
    CalculatingSnapshots,
    Completed,
    /// Terminal; the session cannot be resumed
    Failed,
    /// Stopped on request; resumable
    Cancelled,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Analyzing => "ANALYZING",
            ImportPhase::PersistingMovements => "PERSISTING_MOVEMENTS",
            ImportPhase::CalculatingSnapshots => "CALCULATING_SNAPSHOTS",
            ImportPhase::Completed => "COMPLETED",
            ImportPhase::Failed => "FAILED",
            ImportPhase::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportPhase::Completed | ImportPhase::Failed)
    }

    pub fn can_transition_to(&self, next: ImportPhase) -> bool {
        use ImportPhase::*;
        if *self == next {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Analyzing, PersistingMovements)
                | (Analyzing, Failed)
                | (Analyzing, Cancelled)
                | (PersistingMovements, CalculatingSnapshots)
                | (PersistingMovements, Failed)
                | (PersistingMovements, Cancelled)
                | (CalculatingSnapshots, Completed)
                | (CalculatingSnapshots, Failed)
                | (CalculatingSnapshots, Cancelled)
                | (Cancelled, Analyzing)
                | (Cancelled, PersistingMovements)
                | (Cancelled, CalculatingSnapshots)
                | (Cancelled, Failed)
        )
    }
}

impl std::fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ANALYZING" => Ok(ImportPhase::Analyzing),
            "PERSISTING_MOVEMENTS" => Ok(ImportPhase::PersistingMovements),
            "CALCULATING_SNAPSHOTS" => Ok(ImportPhase::CalculatingSnapshots),
            "COMPLETED" => Ok(ImportPhase::Completed),
            "FAILED" => Ok(ImportPhase::Failed),
            "CANCELLED" => Ok(ImportPhase::Cancelled),
            other => Err(Error::Unexpected(format!("Unknown import phase '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkState {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl ChunkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkState::Pending => "PENDING",
            ChunkState::Completed => "COMPLETED",
            ChunkState::Failed => "FAILED",
        }
    }
}

impl FromStr for ChunkState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(ChunkState::Pending),
            "COMPLETED" => Ok(ChunkState::Completed),
            "FAILED" => Ok(ChunkState::Failed),
            other => Err(Error::Unexpected(format!("Unknown chunk state '{}'", other))),
        }
    }
}

/// A resumable import of one statement file into one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSession {
    pub id: String,
    pub account_id: String,
    pub file_path: String,
    /// SHA-256 of the source bytes at session start
    pub file_hash: String,
    pub phase: ImportPhase,
    pub total_chunks: i32,
    pub chunks_completed: i32,
    pub movements_persisted: i64,
    pub rejected_movements: i64,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ImportSession {
    pub fn new(account_id: &str, file_path: &str, file_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            file_path: file_path.to_string(),
            file_hash: file_hash.to_string(),
            phase: ImportPhase::Analyzing,
            total_chunks: 0,
            chunks_completed: 0,
            movements_persisted: 0,
            rejected_movements: 0,
            min_date: None,
            max_date: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            last_error: None,
        }
    }

    pub fn date_range(&self) -> Option<DateRange> {
        match (self.min_date, self.max_date) {
            (Some(start), Some(end)) => DateRange::new(start, end).ok(),
            _ => None,
        }
    }

    pub fn is_resumable(&self) -> bool {
        !self.phase.is_terminal()
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition_to(&mut self, next: ImportPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(ImportError::InvalidTransition {
                session_id: self.id.clone(),
                from: self.phase.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.phase = next;
        self.updated_at = Utc::now();
        if next == ImportPhase::Completed {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Marks the session failed. Failure is reachable from every live phase.
    pub fn fail(&mut self, error: String) -> Result<()> {
        self.transition_to(ImportPhase::Failed)?;
        self.last_error = Some(error);
        Ok(())
    }
}

/// A bounded date sub-range of a session, committed as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportChunk {
    pub session_id: String,
    /// 1-based, in date order
    pub chunk_number: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub state: ChunkState,
    pub actual_movements: i64,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

impl ImportChunk {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == ChunkState::Completed
    }
}

/// Session counters after a chunk commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCommit {
    /// Rows actually inserted; ids already present are not counted
    pub inserted: usize,
    pub chunks_completed: i32,
    pub movements_persisted: i64,
}

/// What an import call ended with
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub session: ImportSession,
    pub rejected: Vec<RejectedMovement>,
    pub recalculation: Option<RecalculationReport>,
}
