//! In-memory implementation of every repository trait.
//!
//! Useful for dry runs and tests. Writes follow the same all-or-nothing rules
//! as the SQLite store: each write works on a copy of the state and swaps it
//! in only when the whole operation succeeded. One-shot fault switches let
//! callers simulate a storage failure at a precise point.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use crate::errors::{DatabaseError, Error, ImportError, Result};
use crate::import::{ChunkCommit, ChunkState, ImportChunk, ImportSession, ImportSessionRepositoryTrait};
use crate::movements::{sort_movements, Movement, MovementRepositoryTrait};
use crate::portfolio::snapshot::{FinancialSnapshot, SnapshotRepositoryTrait};
use crate::prices::{PriceCacheTrait, PricePoint};

type SnapshotKey = (String, String, NaiveDate);

#[derive(Debug, Clone, Default)]
struct StoreState {
    movements: BTreeMap<String, Movement>,
    snapshots: BTreeMap<SnapshotKey, FinancialSnapshot>,
    prices: HashMap<(String, String), BTreeMap<NaiveDate, Decimal>>,
    sessions: HashMap<String, ImportSession>,
    chunks: HashMap<String, BTreeMap<i32, ImportChunk>>,
}

impl StoreState {
    fn insert_movements(&mut self, movements: Vec<Movement>) -> usize {
        let mut inserted = 0;
        for movement in movements {
            if !self.movements.contains_key(&movement.id) {
                self.movements.insert(movement.id.clone(), movement);
                inserted += 1;
            }
        }
        inserted
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    fail_next_chunk_commit: AtomicBool,
    fail_next_snapshot_commit: AtomicBool,
    fail_next_snapshot_read: AtomicBool,
    snapshot_commits: AtomicUsize,
    snapshots_written: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `commit_chunk` fails after its movements were staged, so the
    /// staged rows must be discarded with it.
    pub fn fail_next_chunk_commit(&self) {
        self.fail_next_chunk_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_snapshot_commit(&self) {
        self.fail_next_snapshot_commit.store(true, Ordering::SeqCst);
    }

    /// The next baseline lookup fails with a storage error.
    pub fn fail_next_snapshot_read(&self) {
        self.fail_next_snapshot_read.store(true, Ordering::SeqCst);
    }

    /// Number of successful `commit_snapshots` calls.
    pub fn snapshot_commit_count(&self) -> usize {
        self.snapshot_commits.load(Ordering::SeqCst)
    }

    /// Total snapshot rows written across all commits.
    pub fn snapshots_written(&self) -> usize {
        self.snapshots_written.load(Ordering::SeqCst)
    }

    pub fn all_snapshots(&self, account_id: &str) -> Result<Vec<FinancialSnapshot>> {
        Ok(self
            .read()?
            .snapshots
            .values()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|e| DatabaseError::Internal(format!("store lock poisoned: {}", e)).into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|e| DatabaseError::Internal(format!("store lock poisoned: {}", e)).into())
    }

    fn take_fault(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(Error::Database(DatabaseError::TransactionFailed(format!(
                "injected failure during {}",
                what
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl MovementRepositoryTrait for InMemoryStore {
    fn get_movements_in_range(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Movement>> {
        let mut movements: Vec<Movement> = self
            .read()?
            .movements
            .values()
            .filter(|m| m.account_id == account_id)
            .filter(|m| {
                let date = m.normalized_date();
                date >= start && date <= end
            })
            .cloned()
            .collect();
        sort_movements(&mut movements);
        Ok(movements)
    }

    fn count_movements(&self, account_id: &str) -> Result<usize> {
        Ok(self
            .read()?
            .movements
            .values()
            .filter(|m| m.account_id == account_id)
            .count())
    }

    async fn insert_movements(&self, movements: Vec<Movement>) -> Result<usize> {
        Ok(self.write()?.insert_movements(movements))
    }
}

#[async_trait]
impl SnapshotRepositoryTrait for InMemoryStore {
    fn get_latest_snapshots_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> Result<HashMap<String, FinancialSnapshot>> {
        Self::take_fault(&self.fail_next_snapshot_read, "baseline lookup")?;
        let state = self.read()?;
        let mut latest: HashMap<String, FinancialSnapshot> = HashMap::new();
        for ((account, currency, snapshot_date), snapshot) in state.snapshots.iter() {
            if account != account_id || *snapshot_date >= date {
                continue;
            }
            // Keys iterate in date order per currency, so the last one wins.
            latest.insert(currency.clone(), snapshot.clone());
        }
        Ok(latest)
    }

    fn get_snapshots_in_range(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FinancialSnapshot>> {
        let mut snapshots: Vec<FinancialSnapshot> = self
            .read()?
            .snapshots
            .values()
            .filter(|s| s.account_id == account_id)
            .filter(|s| s.snapshot_date >= start && s.snapshot_date <= end)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| {
            a.snapshot_date
                .cmp(&b.snapshot_date)
                .then_with(|| a.currency.cmp(&b.currency))
        });
        Ok(snapshots)
    }

    fn get_snapshot(
        &self,
        account_id: &str,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<FinancialSnapshot>> {
        let key = (account_id.to_string(), currency.to_string(), date);
        Ok(self.read()?.snapshots.get(&key).cloned())
    }

    async fn commit_snapshots(&self, account_id: &str, snapshots: Vec<FinancialSnapshot>) -> Result<usize> {
        let mut state = self.write()?;
        let mut staged = state.clone();
        let count = snapshots.len();
        for snapshot in snapshots {
            if snapshot.account_id != account_id {
                return Err(DatabaseError::QueryFailed(format!(
                    "snapshot {} does not belong to account {}",
                    snapshot.id, account_id
                ))
                .into());
            }
            let key = (
                snapshot.account_id.clone(),
                snapshot.currency.clone(),
                snapshot.snapshot_date,
            );
            staged.snapshots.insert(key, snapshot);
        }
        Self::take_fault(&self.fail_next_snapshot_commit, "snapshot commit")?;

        *state = staged;
        self.snapshot_commits.fetch_add(1, Ordering::SeqCst);
        self.snapshots_written.fetch_add(count, Ordering::SeqCst);
        Ok(count)
    }
}

#[async_trait]
impl PriceCacheTrait for InMemoryStore {
    fn get_price_or_previous(
        &self,
        ticker: &str,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>> {
        let state = self.read()?;
        Ok(state
            .prices
            .get(&(ticker.to_string(), currency.to_string()))
            .and_then(|series| series.range(..=date).next_back())
            .map(|(_, close)| *close))
    }

    async fn upsert_prices(&self, prices: Vec<PricePoint>) -> Result<usize> {
        let mut state = self.write()?;
        let count = prices.len();
        for price in prices {
            state
                .prices
                .entry((price.ticker, price.currency))
                .or_default()
                .insert(price.date, price.close);
        }
        Ok(count)
    }
}

#[async_trait]
impl ImportSessionRepositoryTrait for InMemoryStore {
    async fn create_session(&self, session: ImportSession, chunks: Vec<ImportChunk>) -> Result<()> {
        let mut state = self.write()?;
        if state.sessions.contains_key(&session.id) {
            return Err(DatabaseError::UniqueViolation(format!("import session {}", session.id)).into());
        }
        state.chunks.insert(
            session.id.clone(),
            chunks.into_iter().map(|c| (c.chunk_number, c)).collect(),
        );
        state.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn save_plan(&self, session: ImportSession, chunks: Vec<ImportChunk>) -> Result<()> {
        let mut state = self.write()?;
        let existing = state.chunks.remove(&session.id).unwrap_or_default();
        let mut plan: BTreeMap<i32, ImportChunk> = existing
            .into_iter()
            .filter(|(_, c)| c.is_completed())
            .collect();
        for chunk in chunks {
            plan.entry(chunk.chunk_number).or_insert(chunk);
        }
        state.chunks.insert(session.id.clone(), plan);
        state.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn update_session(&self, session: ImportSession) -> Result<()> {
        let mut state = self.write()?;
        if !state.sessions.contains_key(&session.id) {
            return Err(ImportError::SessionNotFound(session.id).into());
        }
        state.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> Result<Option<ImportSession>> {
        Ok(self.read()?.sessions.get(session_id).cloned())
    }

    fn get_chunks(&self, session_id: &str) -> Result<Vec<ImportChunk>> {
        Ok(self
            .read()?
            .chunks
            .get(session_id)
            .map(|chunks| chunks.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn commit_chunk(
        &self,
        session_id: &str,
        chunk_number: i32,
        movements: Vec<Movement>,
        started: Instant,
    ) -> Result<ChunkCommit> {
        let mut state = self.write()?;
        let mut staged = state.clone();
        let actual = movements.len() as i64;
        let inserted = staged.insert_movements(movements);

        Self::take_fault(&self.fail_next_chunk_commit, "chunk commit")?;

        let chunk = staged
            .chunks
            .get_mut(session_id)
            .and_then(|chunks| chunks.get_mut(&chunk_number))
            .ok_or_else(|| ImportError::ChunkNotFound {
                session_id: session_id.to_string(),
                chunk_number,
            })?;
        chunk.state = ChunkState::Completed;
        chunk.actual_movements = actual;
        chunk.duration_ms = Some(started.elapsed().as_millis() as i64);
        chunk.error = None;

        let session = staged
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ImportError::SessionNotFound(session_id.to_string()))?;
        session.chunks_completed += 1;
        session.movements_persisted += inserted as i64;
        session.updated_at = Utc::now();
        let commit = ChunkCommit {
            inserted,
            chunks_completed: session.chunks_completed,
            movements_persisted: session.movements_persisted,
        };

        *state = staged;
        Ok(commit)
    }

    async fn mark_chunk_failed(&self, session_id: &str, chunk_number: i32, error: String) -> Result<()> {
        let mut state = self.write()?;
        let chunk = state
            .chunks
            .get_mut(session_id)
            .and_then(|chunks| chunks.get_mut(&chunk_number))
            .ok_or_else(|| ImportError::ChunkNotFound {
                session_id: session_id.to_string(),
                chunk_number,
            })?;
        chunk.state = ChunkState::Failed;
        chunk.error = Some(error);
        Ok(())
    }

    fn find_resumable_sessions(&self, account_id: &str) -> Result<Vec<ImportSession>> {
        let mut sessions: Vec<ImportSession> = self
            .read()?
            .sessions
            .values()
            .filter(|s| s.account_id == account_id && s.is_resumable())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}
