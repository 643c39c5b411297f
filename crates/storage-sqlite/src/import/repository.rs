use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Instant;

use super::model::{ImportChunkDB, ImportSessionDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::movements::{format_instant, insert_movement_rows, to_rows};
use snapledger_core::errors::{ImportError, Result};
use snapledger_core::import::{
    ChunkCommit, ChunkState, ImportChunk, ImportPhase, ImportSession, ImportSessionRepositoryTrait,
};
use snapledger_core::movements::Movement;

pub struct ImportSessionRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl ImportSessionRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn update_session_row(conn: &mut SqliteConnection, row: &ImportSessionDB) -> Result<()> {
    use crate::schema::import_sessions::dsl::*;

    let affected = diesel::update(import_sessions.find(&row.id))
        .set(row)
        .execute(conn)
        .into_core()?;
    if affected == 0 {
        return Err(ImportError::SessionNotFound(row.id.clone()).into());
    }
    Ok(())
}

#[async_trait]
impl ImportSessionRepositoryTrait for ImportSessionRepository {
    async fn create_session(&self, session: ImportSession, chunks: Vec<ImportChunk>) -> Result<()> {
        let session_row = ImportSessionDB::from(&session);
        let chunk_rows: Vec<ImportChunkDB> = chunks.iter().map(ImportChunkDB::from).collect();

        self.writer
            .exec(move |conn| {
                diesel::insert_into(crate::schema::import_sessions::table)
                    .values(&session_row)
                    .execute(conn)
                    .into_core()?;
                if !chunk_rows.is_empty() {
                    diesel::insert_into(crate::schema::import_chunks::table)
                        .values(&chunk_rows)
                        .execute(conn)
                        .into_core()?;
                }
                Ok(())
            })
            .await
    }

    async fn save_plan(&self, session: ImportSession, chunks: Vec<ImportChunk>) -> Result<()> {
        let session_row = ImportSessionDB::from(&session);
        let chunk_rows: Vec<ImportChunkDB> = chunks.iter().map(ImportChunkDB::from).collect();

        self.writer
            .exec(move |conn| {
                use crate::schema::import_chunks::dsl::*;

                diesel::delete(
                    import_chunks
                        .filter(session_id.eq(&session_row.id))
                        .filter(state.ne(ChunkState::Completed.as_str())),
                )
                .execute(conn)
                .into_core()?;
                // Completed chunks survive a re-plan; their numbers win.
                if !chunk_rows.is_empty() {
                    diesel::insert_or_ignore_into(import_chunks)
                        .values(&chunk_rows)
                        .execute(conn)
                        .into_core()?;
                }
                update_session_row(conn, &session_row)
            })
            .await
    }

    async fn update_session(&self, session: ImportSession) -> Result<()> {
        let row = ImportSessionDB::from(&session);
        self.writer
            .exec(move |conn| update_session_row(conn, &row))
            .await
    }

    fn get_session(&self, input_session_id: &str) -> Result<Option<ImportSession>> {
        use crate::schema::import_sessions::dsl::*;

        let mut conn = get_connection(&self.pool)?;
        import_sessions
            .find(input_session_id)
            .select(ImportSessionDB::as_select())
            .first::<ImportSessionDB>(&mut conn)
            .optional()
            .into_core()?
            .map(ImportSession::try_from)
            .transpose()
    }

    fn get_chunks(&self, input_session_id: &str) -> Result<Vec<ImportChunk>> {
        use crate::schema::import_chunks::dsl::*;

        let mut conn = get_connection(&self.pool)?;
        import_chunks
            .filter(session_id.eq(input_session_id))
            .order(chunk_number.asc())
            .select(ImportChunkDB::as_select())
            .load::<ImportChunkDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(ImportChunk::try_from)
            .collect()
    }

    async fn commit_chunk(
        &self,
        input_session_id: &str,
        input_chunk_number: i32,
        movements: Vec<Movement>,
        started: Instant,
    ) -> Result<ChunkCommit> {
        let rows = to_rows(&movements)?;
        let actual = rows.len() as i64;
        let sid = input_session_id.to_string();

        let commit = self
            .writer
            .exec(move |conn| {
                let inserted = insert_movement_rows(conn, &rows)?;
                let elapsed_ms = started.elapsed().as_millis() as i64;

                {
                    use crate::schema::import_chunks::dsl::*;
                    let affected = diesel::update(
                        import_chunks
                            .filter(session_id.eq(&sid))
                            .filter(chunk_number.eq(input_chunk_number)),
                    )
                    .set((
                        state.eq(ChunkState::Completed.as_str()),
                        actual_movements.eq(actual),
                        duration_ms.eq(Some(elapsed_ms)),
                        error.eq(None::<String>),
                    ))
                    .execute(conn)
                    .into_core()?;
                    if affected == 0 {
                        return Err(ImportError::ChunkNotFound {
                            session_id: sid.clone(),
                            chunk_number: input_chunk_number,
                        }
                        .into());
                    }
                }

                use crate::schema::import_sessions::dsl::*;
                let affected = diesel::update(import_sessions.find(&sid))
                    .set((
                        chunks_completed.eq(chunks_completed + 1),
                        movements_persisted.eq(movements_persisted + inserted as i64),
                        updated_at.eq(format_instant(&Utc::now())),
                    ))
                    .execute(conn)
                    .into_core()?;
                if affected == 0 {
                    return Err(ImportError::SessionNotFound(sid.clone()).into());
                }

                let (completed, persisted): (i32, i64) = import_sessions
                    .find(&sid)
                    .select((chunks_completed, movements_persisted))
                    .first(conn)
                    .into_core()?;
                Ok(ChunkCommit {
                    inserted,
                    chunks_completed: completed,
                    movements_persisted: persisted,
                })
            })
            .await?;

        debug!(
            "Committed chunk {} of session {}: {} new movements",
            input_chunk_number, input_session_id, commit.inserted
        );
        Ok(commit)
    }

    async fn mark_chunk_failed(
        &self,
        input_session_id: &str,
        input_chunk_number: i32,
        message: String,
    ) -> Result<()> {
        let sid = input_session_id.to_string();
        warn!(
            "Chunk {} of session {} failed: {}",
            input_chunk_number, input_session_id, message
        );

        self.writer
            .exec(move |conn| {
                use crate::schema::import_chunks::dsl::*;
                let affected = diesel::update(
                    import_chunks
                        .filter(session_id.eq(&sid))
                        .filter(chunk_number.eq(input_chunk_number)),
                )
                .set((state.eq(ChunkState::Failed.as_str()), error.eq(Some(message))))
                .execute(conn)
                .into_core()?;
                if affected == 0 {
                    return Err(ImportError::ChunkNotFound {
                        session_id: sid,
                        chunk_number: input_chunk_number,
                    }
                    .into());
                }
                Ok(())
            })
            .await
    }

    fn find_resumable_sessions(&self, input_account_id: &str) -> Result<Vec<ImportSession>> {
        use crate::schema::import_sessions::dsl::*;

        let mut conn = get_connection(&self.pool)?;
        import_sessions
            .filter(account_id.eq(input_account_id))
            .filter(phase.ne_all(vec![
                ImportPhase::Completed.as_str(),
                ImportPhase::Failed.as_str(),
            ]))
            .order(created_at.desc())
            .select(ImportSessionDB::as_select())
            .load::<ImportSessionDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(ImportSession::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use crate::movements::MovementRepository;
    use chrono::{NaiveDate, TimeZone};
    use std::time::Duration;
    use rust_decimal_macros::dec;
    use snapledger_core::movements::{
        CashDirection, CashMovement, MovementDetails, MovementRepositoryTrait,
    };
    use tempfile::tempdir;

    struct Fixture {
        sessions: ImportSessionRepository,
        movements: MovementRepository,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path.to_string_lossy()).expect("Failed to create pool");
        run_migrations(&pool).expect("Failed to run migrations");
        let writer = spawn_writer((*pool).clone()).expect("Failed to spawn writer");
        Fixture {
            sessions: ImportSessionRepository::new(pool.clone(), writer.clone()),
            movements: MovementRepository::new(pool, writer),
            _dir: temp_dir,
        }
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn chunk(session: &ImportSession, number: i32, start: NaiveDate, end: NaiveDate) -> ImportChunk {
        ImportChunk {
            session_id: session.id.clone(),
            chunk_number: number,
            start_date: start,
            end_date: end,
            state: ChunkState::Pending,
            actual_movements: 0,
            duration_ms: None,
            error: None,
        }
    }

    fn deposit(id: &str, m: u32, d: u32) -> Movement {
        Movement::new(
            id,
            "acc-1",
            "USD",
            chrono::Utc.with_ymd_and_hms(2024, m, d, 12, 0, 0).unwrap(),
            MovementDetails::CashMovement(CashMovement {
                direction: CashDirection::Deposit,
                amount: dec!(25),
            }),
        )
    }

    async fn planned_session(repo: &ImportSessionRepository) -> ImportSession {
        let mut session = ImportSession::new("acc-1", "/tmp/statement.csv", "abc123");
        session.transition_to(ImportPhase::PersistingMovements).unwrap();
        session.min_date = Some(day(1, 1));
        session.max_date = Some(day(2, 29));
        session.total_chunks = 2;
        let chunks = vec![
            chunk(&session, 1, day(1, 1), day(1, 31)),
            chunk(&session, 2, day(2, 1), day(2, 29)),
        ];
        repo.create_session(session.clone(), chunks).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let f = fixture().await;
        let session = planned_session(&f.sessions).await;

        let loaded = f.sessions.get_session(&session.id).unwrap().unwrap();
        assert_eq!(loaded.phase, ImportPhase::PersistingMovements);
        assert_eq!(loaded.min_date, Some(day(1, 1)));
        assert_eq!(loaded.file_hash, "abc123");
        assert_eq!(
            loaded.created_at.timestamp_micros(),
            session.created_at.timestamp_micros()
        );

        let chunks = f.sessions.get_chunks(&session.id).unwrap();
        assert_eq!(chunks.iter().map(|c| c.chunk_number).collect::<Vec<_>>(), vec![1, 2]);
        assert!(f.sessions.get_session("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_chunk_is_atomic_and_counts_new_rows() {
        let f = fixture().await;
        let session = planned_session(&f.sessions).await;

        let commit = f
            .sessions
            .commit_chunk(&session.id, 1, vec![deposit("m1", 1, 3), deposit("m2", 1, 9)], Instant::now())
            .await
            .unwrap();
        assert_eq!(commit.inserted, 2);
        assert_eq!(commit.chunks_completed, 1);
        assert_eq!(commit.movements_persisted, 2);

        // Unknown chunk: the movement insert is rolled back with it.
        let err = f
            .sessions
            .commit_chunk(&session.id, 7, vec![deposit("m3", 2, 2)], Instant::now())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Chunk 7"));
        assert_eq!(f.movements.count_movements("acc-1").unwrap(), 2);

        // Re-running a chunk after a crash skips rows that already landed.
        let again = f
            .sessions
            .commit_chunk(&session.id, 2, vec![deposit("m2", 1, 9), deposit("m4", 2, 4)], Instant::now())
            .await
            .unwrap();
        assert_eq!(again.inserted, 1);
        assert_eq!(again.movements_persisted, 3);

        let chunks = f.sessions.get_chunks(&session.id).unwrap();
        assert!(chunks.iter().all(|c| c.state == ChunkState::Completed));
        assert_eq!(chunks[0].actual_movements, 2);
        assert!(chunks[0].duration_ms.is_some_and(|ms| ms >= 0));
    }

    #[tokio::test]
    async fn test_chunk_duration_is_measured_through_the_commit() {
        let f = fixture().await;
        let session = planned_session(&f.sessions).await;

        // The chunk was started well before the write reached the store.
        let started = Instant::now() - Duration::from_millis(250);
        f.sessions
            .commit_chunk(&session.id, 1, vec![deposit("m1", 1, 3)], started)
            .await
            .unwrap();

        let chunks = f.sessions.get_chunks(&session.id).unwrap();
        let recorded = chunks[0].duration_ms.unwrap();
        assert!(recorded >= 250, "recorded {recorded}ms");
        assert!(recorded as u128 <= started.elapsed().as_millis());
    }

    #[tokio::test]
    async fn test_failed_chunk_and_replan_keep_completed_work() {
        let f = fixture().await;
        let mut session = planned_session(&f.sessions).await;
        f.sessions
            .commit_chunk(&session.id, 1, vec![deposit("m1", 1, 3)], Instant::now())
            .await
            .unwrap();
        f.sessions
            .mark_chunk_failed(&session.id, 2, "disk full".to_string())
            .await
            .unwrap();
        let failed = &f.sessions.get_chunks(&session.id).unwrap()[1];
        assert_eq!(failed.state, ChunkState::Failed);
        assert_eq!(failed.error.as_deref(), Some("disk full"));

        session.total_chunks = 3;
        session.chunks_completed = 1;
        let replanned = vec![
            chunk(&session, 1, day(1, 1), day(1, 15)),
            chunk(&session, 2, day(2, 1), day(2, 15)),
            chunk(&session, 3, day(2, 16), day(2, 29)),
        ];
        f.sessions.save_plan(session.clone(), replanned).await.unwrap();

        let chunks = f.sessions.get_chunks(&session.id).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].state, ChunkState::Completed);
        assert_eq!(chunks[0].end_date, day(1, 31));
        assert_eq!(chunks[1].state, ChunkState::Pending);
        assert_eq!(f.sessions.get_session(&session.id).unwrap().unwrap().total_chunks, 3);
    }

    #[tokio::test]
    async fn test_resumable_sessions_exclude_terminal_phases() {
        let f = fixture().await;
        let open = planned_session(&f.sessions).await;

        let mut done = ImportSession::new("acc-1", "/tmp/other.csv", "def456");
        done.fail("source changed".to_string()).unwrap();
        f.sessions.create_session(done.clone(), vec![]).await.unwrap();

        let found = f.sessions.find_resumable_sessions("acc-1").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, open.id);
        assert!(f.sessions.find_resumable_sessions("acc-2").unwrap().is_empty());

        let mut missing = ImportSession::new("acc-1", "/tmp/x.csv", "0");
        missing.id = "nope".to_string();
        assert!(f.sessions.update_session(missing).await.is_err());
    }
}
