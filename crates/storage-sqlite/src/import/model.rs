//! Database models for import sessions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::str::FromStr;

use crate::errors::corrupt;
use crate::movements::format_instant;
use crate::utils::{format_date, parse_date};
use snapledger_core::import::{ChunkState, ImportChunk, ImportPhase, ImportSession};
use snapledger_core::Result;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::import_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct ImportSessionDB {
    pub id: String,
    pub account_id: String,
    pub file_path: String,
    pub file_hash: String,
    pub phase: String,
    pub total_chunks: i32,
    pub chunks_completed: i32,
    pub movements_persisted: i64,
    pub rejected_movements: i64,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::import_chunks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ImportChunkDB {
    pub session_id: String,
    pub chunk_number: i32,
    pub start_date: String,
    pub end_date: String,
    pub state: String,
    pub actual_movements: i64,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt("import_sessions", format!("timestamp '{}': {}", raw, e)))
}

impl From<&ImportSession> for ImportSessionDB {
    fn from(session: &ImportSession) -> Self {
        Self {
            id: session.id.clone(),
            account_id: session.account_id.clone(),
            file_path: session.file_path.clone(),
            file_hash: session.file_hash.clone(),
            phase: session.phase.as_str().to_string(),
            total_chunks: session.total_chunks,
            chunks_completed: session.chunks_completed,
            movements_persisted: session.movements_persisted,
            rejected_movements: session.rejected_movements,
            min_date: session.min_date.map(format_date),
            max_date: session.max_date.map(format_date),
            created_at: format_instant(&session.created_at),
            updated_at: format_instant(&session.updated_at),
            completed_at: session.completed_at.as_ref().map(format_instant),
            last_error: session.last_error.clone(),
        }
    }
}

impl TryFrom<ImportSessionDB> for ImportSession {
    type Error = snapledger_core::Error;

    fn try_from(db: ImportSessionDB) -> Result<Self> {
        Ok(Self {
            phase: ImportPhase::from_str(&db.phase)?,
            min_date: db
                .min_date
                .as_deref()
                .map(|raw| parse_date("import_sessions", raw))
                .transpose()?,
            max_date: db
                .max_date
                .as_deref()
                .map(|raw| parse_date("import_sessions", raw))
                .transpose()?,
            created_at: parse_instant(&db.created_at)?,
            updated_at: parse_instant(&db.updated_at)?,
            completed_at: db.completed_at.as_deref().map(parse_instant).transpose()?,
            id: db.id,
            account_id: db.account_id,
            file_path: db.file_path,
            file_hash: db.file_hash,
            total_chunks: db.total_chunks,
            chunks_completed: db.chunks_completed,
            movements_persisted: db.movements_persisted,
            rejected_movements: db.rejected_movements,
            last_error: db.last_error,
        })
    }
}

impl From<&ImportChunk> for ImportChunkDB {
    fn from(chunk: &ImportChunk) -> Self {
        Self {
            session_id: chunk.session_id.clone(),
            chunk_number: chunk.chunk_number,
            start_date: format_date(chunk.start_date),
            end_date: format_date(chunk.end_date),
            state: chunk.state.as_str().to_string(),
            actual_movements: chunk.actual_movements,
            duration_ms: chunk.duration_ms,
            error: chunk.error.clone(),
        }
    }
}

impl TryFrom<ImportChunkDB> for ImportChunk {
    type Error = snapledger_core::Error;

    fn try_from(db: ImportChunkDB) -> Result<Self> {
        Ok(Self {
            start_date: parse_date("import_chunks", &db.start_date)?,
            end_date: parse_date("import_chunks", &db.end_date)?,
            state: ChunkState::from_str(&db.state)?,
            session_id: db.session_id,
            chunk_number: db.chunk_number,
            actual_movements: db.actual_movements,
            duration_ms: db.duration_ms,
            error: db.error,
        })
    }
}
