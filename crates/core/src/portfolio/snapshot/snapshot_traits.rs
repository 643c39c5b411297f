//! Repository traits for financial snapshots.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use super::FinancialSnapshot;
use crate::errors::Result;

/// Repository trait for managing per-currency financial snapshots.
#[async_trait]
pub trait SnapshotRepositoryTrait: Send + Sync {
    /// Latest snapshot per currency with a date strictly before `date`, keyed by currency.
    fn get_latest_snapshots_before(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> Result<HashMap<String, FinancialSnapshot>>;

    /// Snapshots dated within `[start, end]`, ordered by date then currency.
    fn get_snapshots_in_range(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FinancialSnapshot>>;

    fn get_snapshot(
        &self,
        account_id: &str,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<FinancialSnapshot>>;

    /// Upserts all snapshots in one transaction. Either every row is written
    /// or none is.
    async fn commit_snapshots(&self, account_id: &str, snapshots: Vec<FinancialSnapshot>) -> Result<usize>;
}
