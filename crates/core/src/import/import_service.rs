use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::chunk_planner::{movement_span, movements_for_chunk, plan_chunks};
use super::fingerprint::fingerprint_file;
use super::import_model::{ImportPhase, ImportSession, ImportSummary};
use super::import_traits::ImportSessionRepositoryTrait;
use crate::errors::{Error, ImportError, IntegrityError, Result};
use crate::movements::{Movement, RejectedMovement, StatementReader};
use crate::portfolio::engine::SnapshotCoordinator;
use crate::settings::EngineSettings;
use crate::utils::CancelFlag;

/// Movements accepted from a statement plus the rows that were turned away.
struct AnalyzedStatement {
    movements: Vec<Movement>,
    rejected: Vec<RejectedMovement>,
}

/// Drives an import session through analysis, chunked persistence and
/// snapshot recalculation. Every phase boundary is persisted so an
/// interrupted import can be resumed.
pub struct ImportSessionService {
    session_repository: Arc<dyn ImportSessionRepositoryTrait>,
    statement_reader: Arc<dyn StatementReader>,
    coordinator: Arc<SnapshotCoordinator>,
    settings: EngineSettings,
}

impl ImportSessionService {
    pub fn new(
        session_repository: Arc<dyn ImportSessionRepositoryTrait>,
        statement_reader: Arc<dyn StatementReader>,
        coordinator: Arc<SnapshotCoordinator>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            session_repository,
            statement_reader,
            coordinator,
            settings,
        }
    }

    /// Starts a new import of the statement at `path` into `account_id`.
    ///
    /// Cancellation is honored between chunks and between recalculated
    /// dates; a cancelled import returns normally with the session in
    /// `Cancelled` and can be picked up with [`Self::resume_import`].
    pub async fn start_import(
        &self,
        account_id: &str,
        path: &Path,
        cancel: &CancelFlag,
    ) -> Result<ImportSummary> {
        let file_hash = fingerprint_file(path)?;
        let mut session = ImportSession::new(account_id, &path.display().to_string(), &file_hash);
        info!(
            "Starting import session {} for account {} from {}",
            session.id, account_id, session.file_path
        );

        let analyzed = self.analyze(account_id, path)?;
        session.rejected_movements = analyzed.rejected.len() as i64;

        let Some(span) = movement_span(&analyzed.movements) else {
            session.fail("source contains no valid movements".to_string())?;
            self.session_repository
                .create_session(session.clone(), Vec::new())
                .await?;
            return Err(ImportError::EmptySource(session.file_path).into());
        };

        let chunks = plan_chunks(&session.id, span, self.settings.chunk_days);
        session.min_date = Some(span.start);
        session.max_date = Some(span.end);
        session.total_chunks = chunks.len() as i32;
        debug!(
            "Session {} planned {} chunks over {}",
            session.id, session.total_chunks, span
        );
        self.session_repository
            .create_session(session.clone(), chunks)
            .await?;

        self.run(session, analyzed, cancel).await
    }

    /// Continues a session that was interrupted, cancelled, or failed on a
    /// chunk or during recalculation. Completed sessions are returned unchanged.
    pub async fn resume_import(&self, session_id: &str, cancel: &CancelFlag) -> Result<ImportSummary> {
        let mut session = self
            .session_repository
            .get_session(session_id)?
            .ok_or_else(|| ImportError::SessionNotFound(session_id.to_string()))?;

        match session.phase {
            ImportPhase::Completed => {
                debug!("Session {} already completed", session_id);
                return Ok(ImportSummary {
                    session,
                    rejected: Vec::new(),
                    recalculation: None,
                });
            }
            ImportPhase::Failed => {
                return Err(IntegrityError::SessionNotResumable {
                    session_id: session.id,
                    phase: session.phase.to_string(),
                }
                .into());
            }
            _ => {}
        }

        let path = Path::new(&session.file_path).to_path_buf();
        let actual = fingerprint_file(&path)?;
        if actual != session.file_hash {
            warn!(
                "Source of session {} changed on disk; failing the session",
                session.id
            );
            let expected = session.file_hash.clone();
            session.fail("source changed".to_string())?;
            self.session_repository.update_session(session.clone()).await?;
            return Err(IntegrityError::SourceChanged {
                path: session.file_path,
                expected,
                actual,
            }
            .into());
        }

        let account_id = session.account_id.clone();
        let analyzed = self.analyze(&account_id, &path)?;
        session.rejected_movements = analyzed.rejected.len() as i64;

        if session.phase == ImportPhase::Analyzing {
            let Some(span) = movement_span(&analyzed.movements) else {
                session.fail("source contains no valid movements".to_string())?;
                self.session_repository.update_session(session.clone()).await?;
                return Err(ImportError::EmptySource(session.file_path).into());
            };
            let chunks = plan_chunks(&session.id, span, self.settings.chunk_days);
            session.min_date = Some(span.start);
            session.max_date = Some(span.end);
            session.total_chunks = chunks.len() as i32;
            self.session_repository
                .save_plan(session.clone(), chunks)
                .await?;
        }

        info!(
            "Resuming import session {} from {} ({}/{} chunks done)",
            session.id, session.phase, session.chunks_completed, session.total_chunks
        );
        self.run(session, analyzed, cancel).await
    }

    pub fn find_resumable_sessions(&self, account_id: &str) -> Result<Vec<ImportSession>> {
        self.session_repository.find_resumable_sessions(account_id)
    }

    fn analyze(&self, account_id: &str, path: &Path) -> Result<AnalyzedStatement> {
        let contents = self.statement_reader.read_statement(account_id, path)?;
        let mut rejected = contents.rejected;
        let mut movements = Vec::with_capacity(contents.movements.len());

        for movement in contents.movements {
            let row = movement.sequence.max(0) as usize;
            if movement.account_id != account_id {
                rejected.push(RejectedMovement {
                    row,
                    movement_id: Some(movement.id.clone()),
                    reason: format!("belongs to account {}", movement.account_id),
                });
                continue;
            }
            match movement.validate() {
                Ok(()) => movements.push(movement),
                Err(e) => {
                    warn!("Rejecting movement {}: {}", movement.id, e);
                    rejected.push(RejectedMovement {
                        row,
                        movement_id: Some(movement.id.clone()),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !rejected.is_empty() {
            warn!(
                "{} of {} records in {} were rejected",
                rejected.len(),
                rejected.len() + movements.len(),
                path.display()
            );
        }
        Ok(AnalyzedStatement { movements, rejected })
    }

    async fn run(
        &self,
        mut session: ImportSession,
        analyzed: AnalyzedStatement,
        cancel: &CancelFlag,
    ) -> Result<ImportSummary> {
        let chunks = self.session_repository.get_chunks(&session.id)?;
        let needs_persist = match session.phase {
            ImportPhase::Analyzing => true,
            ImportPhase::CalculatingSnapshots => false,
            _ => !chunks.iter().all(|c| c.is_completed()),
        };

        if needs_persist {
            session.transition_to(ImportPhase::PersistingMovements)?;
            self.session_repository.update_session(session.clone()).await?;

            if !self
                .persist_chunks(&mut session, &analyzed.movements, cancel)
                .await?
            {
                return Ok(ImportSummary {
                    session,
                    rejected: analyzed.rejected,
                    recalculation: None,
                });
            }
        }

        if cancel.is_cancelled() {
            self.cancel_session(&mut session).await?;
            return Ok(ImportSummary {
                session,
                rejected: analyzed.rejected,
                recalculation: None,
            });
        }

        session.transition_to(ImportPhase::CalculatingSnapshots)?;
        self.session_repository.update_session(session.clone()).await?;

        let range = session.date_range().ok_or_else(|| {
            Error::Unexpected(format!("Session {} has no date range", session.id))
        })?;
        let report = match self
            .coordinator
            .recalculate_with_cancel(&session.account_id, range, cancel)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!("Snapshot recalculation for session {} failed: {}", session.id, e);
                session.last_error = Some(e.to_string());
                self.session_repository.update_session(session.clone()).await?;
                return Err(e);
            }
        };

        if report.cancelled {
            self.cancel_session(&mut session).await?;
        } else {
            session.transition_to(ImportPhase::Completed)?;
            session.last_error = None;
            self.session_repository.update_session(session.clone()).await?;
            info!(
                "Import session {} completed: {} movements persisted, {} rejected, {} snapshots written",
                session.id,
                session.movements_persisted,
                session.rejected_movements,
                report.snapshots_written
            );
        }

        Ok(ImportSummary {
            session,
            rejected: analyzed.rejected,
            recalculation: Some(report),
        })
    }

    /// Commits pending chunks in order. Returns false when cancelled.
    async fn persist_chunks(
        &self,
        session: &mut ImportSession,
        movements: &[Movement],
        cancel: &CancelFlag,
    ) -> Result<bool> {
        let chunks = self.session_repository.get_chunks(&session.id)?;

        for chunk in chunks.iter().filter(|c| !c.is_completed()) {
            if cancel.is_cancelled() {
                info!(
                    "Import session {} cancelled before chunk {}",
                    session.id, chunk.chunk_number
                );
                self.cancel_session(session).await?;
                return Ok(false);
            }

            let started = Instant::now();
            let chunk_movements = movements_for_chunk(movements, chunk);
            let expected = chunk_movements.len();

            match self
                .session_repository
                .commit_chunk(&session.id, chunk.chunk_number, chunk_movements, started)
                .await
            {
                Ok(commit) => {
                    session.chunks_completed = commit.chunks_completed;
                    session.movements_persisted = commit.movements_persisted;
                    debug!(
                        "Session {} chunk {} committed: {} of {} movements new",
                        session.id, chunk.chunk_number, commit.inserted, expected
                    );
                }
                Err(e) => {
                    warn!(
                        "Session {} chunk {} failed: {}",
                        session.id, chunk.chunk_number, e
                    );
                    self.session_repository
                        .mark_chunk_failed(&session.id, chunk.chunk_number, e.to_string())
                        .await?;
                    session.last_error = Some(e.to_string());
                    self.session_repository.update_session(session.clone()).await?;
                    return Err(e);
                }
            }
        }

        Ok(true)
    }

    async fn cancel_session(&self, session: &mut ImportSession) -> Result<()> {
        session.transition_to(ImportPhase::Cancelled)?;
        self.session_repository.update_session(session.clone()).await
    }
}
