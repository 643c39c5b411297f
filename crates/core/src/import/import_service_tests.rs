use super::*;
use crate::errors::{Error, ImportError, IntegrityError};
use crate::memory::InMemoryStore;
use crate::movements::{CsvStatementReader, MovementRepositoryTrait};
use crate::portfolio::engine::SnapshotCoordinator;
use crate::portfolio::snapshot::SnapshotRepositoryTrait;
use crate::settings::EngineSettings;
use crate::utils::CancelFlag;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const ACCOUNT: &str = "acc-1";

const STATEMENT: &str = "\
kind,executed_at,currency,symbol,side,quantity,price,fees,amount
CASH_MOVEMENT,2024-01-02,USD,,DEPOSIT,,,,10000
STOCK_TRADE,2024-01-03T15:30:00Z,USD,AAPL,BUY,10,100,1,
STOCK_TRADE,2024-02-20,USD,AAPL,SELL,4,120,1,
DIVIDEND,2024-03-15,USD,AAPL,,,,,5
STOCK_TRADE,2024-03-16,USD,AAPL,HOLD,1,1,,
";

fn statement_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn service(store: &Arc<InMemoryStore>) -> ImportSessionService {
    let settings = EngineSettings::default().with_chunk_days(30).unwrap();
    let coordinator = Arc::new(SnapshotCoordinator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        &settings,
    ));
    ImportSessionService::new(
        store.clone(),
        Arc::new(CsvStatementReader::new()),
        coordinator,
        settings,
    )
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_import_runs_every_phase_to_completion() {
    let store = Arc::new(InMemoryStore::new());
    let file = statement_file(STATEMENT);

    let summary = service(&store)
        .start_import(ACCOUNT, file.path(), &CancelFlag::new())
        .await
        .unwrap();

    let session = &summary.session;
    assert_eq!(session.phase, ImportPhase::Completed);
    assert!(session.completed_at.is_some());
    assert_eq!(session.total_chunks, 3);
    assert_eq!(session.chunks_completed, 3);
    assert_eq!(session.movements_persisted, 4);
    assert_eq!(session.rejected_movements, 1);
    assert_eq!(summary.rejected.len(), 1);
    assert_eq!(summary.rejected[0].row, 5);
    assert_eq!(session.min_date, Some(date(2024, 1, 2)));
    assert_eq!(session.max_date, Some(date(2024, 3, 15)));

    let report = summary.recalculation.as_ref().unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.dates_processed, 4);

    let last = store
        .get_snapshot(ACCOUNT, "USD", date(2024, 3, 15))
        .unwrap()
        .unwrap();
    assert_eq!(last.total_deposited, dec!(10000));
    assert_eq!(last.cash_balance, dec!(9483));
    assert_eq!(last.realized_gains, dec!(78.6));
    assert_eq!(last.total_dividends, dec!(5));
    assert_eq!(last.movement_count, 4);

    let chunks = store.get_chunks(&session.id).unwrap();
    assert!(chunks.iter().all(|c| c.is_completed()));
    assert!(chunks.iter().all(|c| c.duration_ms.is_some()));
    assert_eq!(chunks.iter().map(|c| c.actual_movements).sum::<i64>(), 4);
}

#[tokio::test]
async fn test_failed_chunk_rolls_back_and_resume_persists_it_once() {
    let store = Arc::new(InMemoryStore::new());
    let file = statement_file(STATEMENT);
    let service = service(&store);

    store.fail_next_chunk_commit();
    let err = service
        .start_import(ACCOUNT, file.path(), &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(err.is_storage_failure());
    assert_eq!(store.count_movements(ACCOUNT).unwrap(), 0);

    let resumable = service.find_resumable_sessions(ACCOUNT).unwrap();
    assert_eq!(resumable.len(), 1);
    let session = &resumable[0];
    assert_eq!(session.phase, ImportPhase::PersistingMovements);
    assert_eq!(session.chunks_completed, 0);
    assert!(session.last_error.is_some());
    let chunks = store.get_chunks(&session.id).unwrap();
    assert_eq!(chunks[0].state, ChunkState::Failed);
    assert!(chunks[0].error.is_some());

    let summary = service
        .resume_import(&session.id, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(summary.session.phase, ImportPhase::Completed);
    assert_eq!(summary.session.movements_persisted, 4);
    assert_eq!(store.count_movements(ACCOUNT).unwrap(), 4);
    assert!(service.find_resumable_sessions(ACCOUNT).unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_failure_during_recalculation_keeps_session_resumable() {
    let store = Arc::new(InMemoryStore::new());
    let file = statement_file(STATEMENT);
    let service = service(&store);

    store.fail_next_snapshot_read();
    let err = service
        .start_import(ACCOUNT, file.path(), &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(err.is_storage_failure());
    assert_eq!(store.count_movements(ACCOUNT).unwrap(), 4);
    assert!(store
        .get_snapshot(ACCOUNT, "USD", date(2024, 3, 15))
        .unwrap()
        .is_none());

    let resumable = service.find_resumable_sessions(ACCOUNT).unwrap();
    assert_eq!(resumable.len(), 1);
    let session = &resumable[0];
    assert_eq!(session.phase, ImportPhase::CalculatingSnapshots);
    assert_eq!(session.chunks_completed, 3);
    assert!(session.last_error.is_some());

    let summary = service
        .resume_import(&session.id, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(summary.session.phase, ImportPhase::Completed);
    assert!(summary.session.last_error.is_none());
    assert_eq!(store.all_snapshots(ACCOUNT).unwrap().len(), 4);
    let last = store
        .get_snapshot(ACCOUNT, "USD", date(2024, 3, 15))
        .unwrap()
        .unwrap();
    assert_eq!(last.realized_gains, dec!(78.6));
    assert_eq!(last.movement_count, 4);
}

#[tokio::test]
async fn test_cancelled_import_resumes_where_it_stopped() {
    let store = Arc::new(InMemoryStore::new());
    let file = statement_file(STATEMENT);
    let service = service(&store);

    let cancel = CancelFlag::new();
    cancel.cancel();
    let summary = service.start_import(ACCOUNT, file.path(), &cancel).await.unwrap();
    assert_eq!(summary.session.phase, ImportPhase::Cancelled);
    assert!(summary.recalculation.is_none());
    assert_eq!(store.count_movements(ACCOUNT).unwrap(), 0);
    assert!(store
        .get_snapshots_in_range(ACCOUNT, date(2024, 1, 1), date(2024, 12, 31))
        .unwrap()
        .is_empty());

    let resumed = service
        .resume_import(&summary.session.id, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(resumed.session.phase, ImportPhase::Completed);
    assert_eq!(resumed.session.chunks_completed, 3);
    assert_eq!(store.count_movements(ACCOUNT).unwrap(), 4);
}

#[tokio::test]
async fn test_resume_rejects_a_changed_source() {
    let store = Arc::new(InMemoryStore::new());
    let mut file = statement_file(STATEMENT);
    let service = service(&store);

    let cancel = CancelFlag::new();
    cancel.cancel();
    let summary = service.start_import(ACCOUNT, file.path(), &cancel).await.unwrap();
    let session_id = summary.session.id.clone();

    file.write_all(b"DIVIDEND,2024-04-01,USD,AAPL,,,,,1\n").unwrap();
    file.flush().unwrap();

    let err = service
        .resume_import(&session_id, &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Integrity(IntegrityError::SourceChanged { .. })
    ));
    let failed = store.get_session(&session_id).unwrap().unwrap();
    assert_eq!(failed.phase, ImportPhase::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("source changed"));
    assert_eq!(store.count_movements(ACCOUNT).unwrap(), 0);

    let err = service
        .resume_import(&session_id, &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Integrity(IntegrityError::SessionNotResumable { .. })
    ));
}

#[tokio::test]
async fn test_resume_of_completed_session_is_a_no_op() {
    let store = Arc::new(InMemoryStore::new());
    let file = statement_file(STATEMENT);
    let service = service(&store);

    let summary = service
        .start_import(ACCOUNT, file.path(), &CancelFlag::new())
        .await
        .unwrap();
    let commits = store.snapshot_commit_count();

    let again = service
        .resume_import(&summary.session.id, &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(again.session, summary.session);
    assert!(again.recalculation.is_none());
    assert_eq!(store.snapshot_commit_count(), commits);
}

#[tokio::test]
async fn test_statement_without_valid_movements_fails_the_session() {
    let store = Arc::new(InMemoryStore::new());
    let file = statement_file("kind,executed_at,currency\nDIVIDEND,2024-01-01,USD\n");

    let err = service(&store)
        .start_import(ACCOUNT, file.path(), &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Import(ImportError::EmptySource(_))));
    assert!(store.find_resumable_sessions(ACCOUNT).unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_session_is_reported() {
    let store = Arc::new(InMemoryStore::new());
    let err = service(&store)
        .resume_import("missing", &CancelFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Import(ImportError::SessionNotFound(_))));
}
