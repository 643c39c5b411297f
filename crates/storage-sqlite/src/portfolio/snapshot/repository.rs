use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel::sql_types::Text;
use diesel::SqliteConnection;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use super::model::FinancialSnapshotDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::utils::{chunk_rows, format_date};
use snapledger_core::errors::{DatabaseError, Result};
use snapledger_core::portfolio::snapshot::{FinancialSnapshot, SnapshotRepositoryTrait};

const SNAPSHOT_COLUMNS: usize = 19;

pub struct SnapshotRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SnapshotRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn into_domain(rows: Vec<FinancialSnapshotDB>) -> Result<Vec<FinancialSnapshot>> {
        rows.into_iter().map(FinancialSnapshot::try_from).collect()
    }
}

#[async_trait]
impl SnapshotRepositoryTrait for SnapshotRepository {
    fn get_latest_snapshots_before(
        &self,
        input_account_id: &str,
        date: NaiveDate,
    ) -> Result<HashMap<String, FinancialSnapshot>> {
        let mut conn = get_connection(&self.pool)?;

        let rows: Vec<FinancialSnapshotDB> = sql_query(
            "WITH ranked AS ( \
                SELECT *, ROW_NUMBER() OVER ( \
                    PARTITION BY currency ORDER BY snapshot_date DESC \
                ) AS rn \
                FROM financial_snapshots \
                WHERE account_id = ? AND snapshot_date < ? \
            ) \
            SELECT id, account_id, currency, snapshot_date, total_deposited, total_withdrawn, \
                total_invested, total_dividends, total_dividend_taxes, realized_gains, \
                capital_deployed, movement_count, cash_balance, total_cost_basis, open_exposure, \
                unrealized_gains, unrealized_gains_pct, positions, calculated_at \
            FROM ranked WHERE rn = 1",
        )
        .bind::<Text, _>(input_account_id)
        .bind::<Text, _>(format_date(date))
        .load::<FinancialSnapshotDB>(&mut conn)
        .into_core()?;

        Ok(Self::into_domain(rows)?
            .into_iter()
            .map(|s| (s.currency.clone(), s))
            .collect())
    }

    fn get_snapshots_in_range(
        &self,
        input_account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<FinancialSnapshot>> {
        use crate::schema::financial_snapshots::dsl::*;

        let mut conn = get_connection(&self.pool)?;
        let rows = financial_snapshots
            .filter(account_id.eq(input_account_id))
            .filter(snapshot_date.ge(format_date(start)))
            .filter(snapshot_date.le(format_date(end)))
            .order((snapshot_date.asc(), currency.asc()))
            .select(FinancialSnapshotDB::as_select())
            .load::<FinancialSnapshotDB>(&mut conn)
            .into_core()?;
        Self::into_domain(rows)
    }

    fn get_snapshot(
        &self,
        input_account_id: &str,
        input_currency: &str,
        date: NaiveDate,
    ) -> Result<Option<FinancialSnapshot>> {
        use crate::schema::financial_snapshots::dsl::*;

        let mut conn = get_connection(&self.pool)?;
        financial_snapshots
            .filter(account_id.eq(input_account_id))
            .filter(currency.eq(input_currency))
            .filter(snapshot_date.eq(format_date(date)))
            .select(FinancialSnapshotDB::as_select())
            .first::<FinancialSnapshotDB>(&mut conn)
            .optional()
            .into_core()?
            .map(FinancialSnapshot::try_from)
            .transpose()
    }

    async fn commit_snapshots(
        &self,
        input_account_id: &str,
        snapshots: Vec<FinancialSnapshot>,
    ) -> Result<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }
        if let Some(foreign) = snapshots.iter().find(|s| s.account_id != input_account_id) {
            return Err(DatabaseError::QueryFailed(format!(
                "snapshot {} does not belong to account {}",
                foreign.id, input_account_id
            ))
            .into());
        }

        let rows: Vec<FinancialSnapshotDB> =
            snapshots.into_iter().map(FinancialSnapshotDB::from).collect();
        let count = rows.len();
        debug!("Committing {} snapshots for {}", count, input_account_id);

        self.writer
            .exec(move |conn| {
                use crate::schema::financial_snapshots::dsl::*;
                for batch in chunk_rows(&rows, SNAPSHOT_COLUMNS) {
                    diesel::replace_into(financial_snapshots)
                        .values(batch)
                        .execute(conn)
                        .into_core()?;
                }
                Ok(count)
            })
            .await
    }
}
