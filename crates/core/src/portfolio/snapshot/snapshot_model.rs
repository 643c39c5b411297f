//! Financial snapshot domain model.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::OpenPosition;
use crate::constants::{DATE_FORMAT, DECIMAL_PRECISION};
use crate::errors::{Result, ValidationError};

/// State of one currency of one account at the close of a specific day.
///
/// Cumulative fields only grow along a chain of snapshots. Point-in-time
/// fields describe the day's close.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSnapshot {
    pub id: String, // "{account}_{currency}_{YYYY-MM-DD}"
    pub account_id: String,
    pub currency: String,
    pub snapshot_date: NaiveDate,

    // --- Cumulative ---
    pub total_deposited: Decimal,
    pub total_withdrawn: Decimal,
    /// Cash spent opening long positions (stock buys, bought options).
    pub total_invested: Decimal,
    pub total_dividends: Decimal,
    pub total_dividend_taxes: Decimal,
    pub realized_gains: Decimal,
    /// High-water mark of `open_exposure`, raised only by opening trades.
    pub capital_deployed: Decimal,
    pub movement_count: i64,

    // --- Point in time ---
    pub cash_balance: Decimal,
    pub total_cost_basis: Decimal,
    /// Capital committed by currently open lots.
    pub open_exposure: Decimal,
    pub unrealized_gains: Decimal,
    /// Percent of the cost basis of priced positions.
    pub unrealized_gains_pct: Decimal,

    #[serde(default)]
    pub positions: BTreeMap<String, OpenPosition>,

    pub calculated_at: NaiveDateTime,
}

impl FinancialSnapshot {
    pub fn snapshot_id(account_id: &str, currency: &str, date: NaiveDate) -> String {
        format!("{}_{}_{}", account_id, currency, date.format(DATE_FORMAT))
    }

    /// A zeroed snapshot with no history.
    pub fn empty(account_id: &str, currency: &str, date: NaiveDate) -> Self {
        FinancialSnapshot {
            id: Self::snapshot_id(account_id, currency, date),
            account_id: account_id.to_string(),
            currency: currency.to_string(),
            snapshot_date: date,
            total_deposited: Decimal::ZERO,
            total_withdrawn: Decimal::ZERO,
            total_invested: Decimal::ZERO,
            total_dividends: Decimal::ZERO,
            total_dividend_taxes: Decimal::ZERO,
            realized_gains: Decimal::ZERO,
            capital_deployed: Decimal::ZERO,
            movement_count: 0,
            cash_balance: Decimal::ZERO,
            total_cost_basis: Decimal::ZERO,
            open_exposure: Decimal::ZERO,
            unrealized_gains: Decimal::ZERO,
            unrealized_gains_pct: Decimal::ZERO,
            positions: BTreeMap::new(),
            calculated_at: Utc::now().naive_utc(),
        }
    }

    /// Same state, re-keyed to `date`.
    pub fn carried_to(&self, date: NaiveDate) -> Self {
        let mut next = self.clone();
        next.id = Self::snapshot_id(&self.account_id, &self.currency, date);
        next.snapshot_date = date;
        next.calculated_at = Utc::now().naive_utc();
        next
    }

    /// True when every stored value matches. `calculated_at` is ignored.
    pub fn is_content_equal(&self, other: &Self) -> bool {
        self.id == other.id
            && self.account_id == other.account_id
            && self.currency == other.currency
            && self.snapshot_date == other.snapshot_date
            && self.total_deposited == other.total_deposited
            && self.total_withdrawn == other.total_withdrawn
            && self.total_invested == other.total_invested
            && self.total_dividends == other.total_dividends
            && self.total_dividend_taxes == other.total_dividend_taxes
            && self.realized_gains == other.realized_gains
            && self.capital_deployed == other.capital_deployed
            && self.movement_count == other.movement_count
            && self.cash_balance == other.cash_balance
            && self.total_cost_basis == other.total_cost_basis
            && self.open_exposure == other.open_exposure
            && self.unrealized_gains == other.unrealized_gains
            && self.unrealized_gains_pct == other.unrealized_gains_pct
            && self.positions == other.positions
    }

    pub fn is_zero(&self) -> bool {
        self.total_deposited.is_zero()
            && self.total_withdrawn.is_zero()
            && self.total_invested.is_zero()
            && self.total_dividends.is_zero()
            && self.total_dividend_taxes.is_zero()
            && self.realized_gains.is_zero()
            && self.capital_deployed.is_zero()
            && self.movement_count == 0
            && self.cash_balance.is_zero()
            && self.total_cost_basis.is_zero()
            && self.open_exposure.is_zero()
            && self.unrealized_gains.is_zero()
            && self.unrealized_gains_pct.is_zero()
            && self.positions.is_empty()
    }

    /// Rounds every scalar to storage precision. Lots keep full precision.
    pub fn round_values(&mut self) {
        for value in [
            &mut self.total_deposited,
            &mut self.total_withdrawn,
            &mut self.total_invested,
            &mut self.total_dividends,
            &mut self.total_dividend_taxes,
            &mut self.realized_gains,
            &mut self.capital_deployed,
            &mut self.cash_balance,
            &mut self.total_cost_basis,
            &mut self.open_exposure,
            &mut self.unrealized_gains,
            &mut self.unrealized_gains_pct,
        ] {
            *value = value.round_dp(DECIMAL_PRECISION).normalize();
        }
    }

    /// Checks the invariants every persisted snapshot must hold. `previous` is
    /// the snapshot this one was derived from, if any.
    pub fn validate(&self, previous: Option<&FinancialSnapshot>) -> Result<()> {
        let fail = |reason: String| -> Result<()> {
            Err(ValidationError::SnapshotInvariant {
                snapshot_id: self.id.clone(),
                reason,
            }
            .into())
        };

        let expected_id = Self::snapshot_id(&self.account_id, &self.currency, self.snapshot_date);
        if self.id != expected_id {
            return fail(format!("id does not match key, expected {}", expected_id));
        }

        for (name, value) in [
            ("total_deposited", self.total_deposited),
            ("total_withdrawn", self.total_withdrawn),
            ("total_invested", self.total_invested),
            ("total_dividends", self.total_dividends),
            ("total_dividend_taxes", self.total_dividend_taxes),
            ("capital_deployed", self.capital_deployed),
            ("open_exposure", self.open_exposure),
            ("total_cost_basis", self.total_cost_basis),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return fail(format!("{} is negative: {}", name, value));
            }
        }
        if self.movement_count < 0 {
            return fail(format!("movement_count is negative: {}", self.movement_count));
        }
        if self.open_exposure > self.capital_deployed {
            return fail(format!(
                "open exposure {} exceeds capital deployed {}",
                self.open_exposure, self.capital_deployed
            ));
        }

        for (key, position) in &self.positions {
            if key != &position.key {
                return fail(format!("position stored under {} has key {}", key, position.key));
            }
            if position.currency != self.currency {
                return fail(format!(
                    "position {} in {} inside a {} snapshot",
                    key, position.currency, self.currency
                ));
            }
            if position.quantity <= Decimal::ZERO {
                return fail(format!("position {} has quantity {}", key, position.quantity));
            }
            let lot_quantity: Decimal = position.lots.iter().map(|lot| lot.quantity).sum();
            if lot_quantity != position.quantity {
                return fail(format!(
                    "position {} quantity {} differs from its lots {}",
                    key, position.quantity, lot_quantity
                ));
            }
        }

        if let Some(prev) = previous {
            if prev.account_id != self.account_id || prev.currency != self.currency {
                return fail(format!("derived from unrelated snapshot {}", prev.id));
            }
            if prev.snapshot_date >= self.snapshot_date {
                return fail(format!(
                    "baseline {} is not before {}",
                    prev.snapshot_date, self.snapshot_date
                ));
            }
            for (name, before, after) in [
                ("total_deposited", prev.total_deposited, self.total_deposited),
                ("total_withdrawn", prev.total_withdrawn, self.total_withdrawn),
                ("total_invested", prev.total_invested, self.total_invested),
                ("total_dividends", prev.total_dividends, self.total_dividends),
                ("total_dividend_taxes", prev.total_dividend_taxes, self.total_dividend_taxes),
                ("capital_deployed", prev.capital_deployed, self.capital_deployed),
            ] {
                if after < before {
                    return fail(format!("{} decreased from {} to {}", name, before, after));
                }
            }
            if self.movement_count < prev.movement_count {
                return fail(format!(
                    "movement_count decreased from {} to {}",
                    prev.movement_count, self.movement_count
                ));
            }
        }

        Ok(())
    }
}
