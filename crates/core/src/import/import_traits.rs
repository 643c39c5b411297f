use std::time::Instant;

use async_trait::async_trait;

use super::import_model::{ChunkCommit, ImportChunk, ImportSession};
use crate::errors::Result;
use crate::movements::Movement;

/// Persistence for import sessions and their chunks.
#[async_trait]
pub trait ImportSessionRepositoryTrait: Send + Sync {
    /// Stores a new session together with its planned chunks.
    async fn create_session(&self, session: ImportSession, chunks: Vec<ImportChunk>) -> Result<()>;

    /// Replaces the chunk plan of a session and updates the session row in one
    /// transaction. Completed chunks are kept as they are.
    async fn save_plan(&self, session: ImportSession, chunks: Vec<ImportChunk>) -> Result<()>;

    async fn update_session(&self, session: ImportSession) -> Result<()>;

    fn get_session(&self, session_id: &str) -> Result<Option<ImportSession>>;

    /// Chunks of a session ordered by chunk number.
    fn get_chunks(&self, session_id: &str) -> Result<Vec<ImportChunk>>;

    /// In one transaction: inserts the chunk's movements (ignoring ids that
    /// already exist), marks the chunk Completed and bumps the session
    /// counters. On error nothing is written. The chunk's `duration_ms` is
    /// measured from `started` to the point where the movements are written.
    async fn commit_chunk(
        &self,
        session_id: &str,
        chunk_number: i32,
        movements: Vec<Movement>,
        started: Instant,
    ) -> Result<ChunkCommit>;

    async fn mark_chunk_failed(&self, session_id: &str, chunk_number: i32, error: String) -> Result<()>;

    /// Sessions of the account that are neither Completed nor Failed, newest first.
    fn find_resumable_sessions(&self, account_id: &str) -> Result<Vec<ImportSession>>;
}
