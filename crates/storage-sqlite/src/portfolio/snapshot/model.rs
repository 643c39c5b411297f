//! Database model for financial snapshots.

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::corrupt;
use crate::utils::{format_date, parse_date};
use snapledger_core::constants::DECIMAL_PRECISION;
use snapledger_core::portfolio::snapshot::FinancialSnapshot;
use snapledger_core::Result;

const TABLE: &str = "financial_snapshots";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[derive(
    Debug, Clone, Queryable, QueryableByName, Selectable, Insertable, Serialize, Deserialize,
)]
#[diesel(table_name = crate::schema::financial_snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct FinancialSnapshotDB {
    pub id: String,
    pub account_id: String,
    pub currency: String,
    pub snapshot_date: String,
    pub total_deposited: String,
    pub total_withdrawn: String,
    pub total_invested: String,
    pub total_dividends: String,
    pub total_dividend_taxes: String,
    pub realized_gains: String,
    pub capital_deployed: String,
    pub movement_count: i64,
    pub cash_balance: String,
    pub total_cost_basis: String,
    pub open_exposure: String,
    pub unrealized_gains: String,
    pub unrealized_gains_pct: String,
    pub positions: String,
    pub calculated_at: String,
}

fn decimal_text(value: Decimal) -> String {
    value.round_dp(DECIMAL_PRECISION).normalize().to_string()
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| corrupt(TABLE, format!("{} '{}': {}", field, raw, e)))
}

impl From<FinancialSnapshot> for FinancialSnapshotDB {
    fn from(domain: FinancialSnapshot) -> Self {
        Self {
            id: domain.id,
            account_id: domain.account_id,
            currency: domain.currency,
            snapshot_date: format_date(domain.snapshot_date),
            total_deposited: decimal_text(domain.total_deposited),
            total_withdrawn: decimal_text(domain.total_withdrawn),
            total_invested: decimal_text(domain.total_invested),
            total_dividends: decimal_text(domain.total_dividends),
            total_dividend_taxes: decimal_text(domain.total_dividend_taxes),
            realized_gains: decimal_text(domain.realized_gains),
            capital_deployed: decimal_text(domain.capital_deployed),
            movement_count: domain.movement_count,
            cash_balance: decimal_text(domain.cash_balance),
            total_cost_basis: decimal_text(domain.total_cost_basis),
            open_exposure: decimal_text(domain.open_exposure),
            unrealized_gains: decimal_text(domain.unrealized_gains),
            unrealized_gains_pct: decimal_text(domain.unrealized_gains_pct),
            positions: serde_json::to_string(&domain.positions).unwrap_or_else(|_| "{}".to_string()),
            calculated_at: domain.calculated_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl TryFrom<FinancialSnapshotDB> for FinancialSnapshot {
    type Error = snapledger_core::Error;

    fn try_from(db: FinancialSnapshotDB) -> Result<Self> {
        let positions = serde_json::from_str(&db.positions)
            .map_err(|e| corrupt(TABLE, format!("{} positions: {}", db.id, e)))?;
        let calculated_at = NaiveDateTime::parse_from_str(&db.calculated_at, TIMESTAMP_FORMAT)
            .unwrap_or_else(|e| {
                log::warn!(
                    "Snapshot {} has unreadable calculated_at '{}': {}",
                    db.id,
                    db.calculated_at,
                    e
                );
                Utc::now().naive_utc()
            });

        Ok(Self {
            snapshot_date: parse_date(TABLE, &db.snapshot_date)?,
            total_deposited: parse_decimal("total_deposited", &db.total_deposited)?,
            total_withdrawn: parse_decimal("total_withdrawn", &db.total_withdrawn)?,
            total_invested: parse_decimal("total_invested", &db.total_invested)?,
            total_dividends: parse_decimal("total_dividends", &db.total_dividends)?,
            total_dividend_taxes: parse_decimal("total_dividend_taxes", &db.total_dividend_taxes)?,
            realized_gains: parse_decimal("realized_gains", &db.realized_gains)?,
            capital_deployed: parse_decimal("capital_deployed", &db.capital_deployed)?,
            movement_count: db.movement_count,
            cash_balance: parse_decimal("cash_balance", &db.cash_balance)?,
            total_cost_basis: parse_decimal("total_cost_basis", &db.total_cost_basis)?,
            open_exposure: parse_decimal("open_exposure", &db.open_exposure)?,
            unrealized_gains: parse_decimal("unrealized_gains", &db.unrealized_gains)?,
            unrealized_gains_pct: parse_decimal("unrealized_gains_pct", &db.unrealized_gains_pct)?,
            positions,
            calculated_at,
            id: db.id,
            account_id: db.account_id,
            currency: db.currency,
        })
    }
}
