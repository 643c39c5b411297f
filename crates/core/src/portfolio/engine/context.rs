use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::relevance::relevant_dates;
use crate::errors::Result;
use crate::movements::{sort_movements, Movement, MovementRepositoryTrait};
use crate::portfolio::snapshot::{FinancialSnapshot, SnapshotRepositoryTrait};
use crate::prices::{PriceCacheTrait, PriceKey, PriceTable};
use crate::utils::DateRange;

/// Everything one batch run reads, loaded up front. Never persisted.
#[derive(Debug)]
pub struct BatchCalculationContext {
    pub account_id: String,
    pub range: DateRange,
    /// Latest snapshot per currency strictly before `range.start`.
    pub baselines: HashMap<String, FinancialSnapshot>,
    /// Movements by normalized date, then currency, in application order.
    pub movements_by_date: BTreeMap<NaiveDate, BTreeMap<String, Vec<Movement>>>,
    pub existing: HashMap<(NaiveDate, String), FinancialSnapshot>,
    pub currencies: BTreeSet<String>,
    pub relevant_dates: Vec<NaiveDate>,
    pub prices: PriceTable,
}

impl BatchCalculationContext {
    /// Reads baselines, movements and existing rows for the window. Prices are
    /// not loaded here; see [`Self::required_price_keys`].
    pub fn load(
        account_id: &str,
        range: DateRange,
        movements: &dyn MovementRepositoryTrait,
        snapshots: &dyn SnapshotRepositoryTrait,
    ) -> Result<Self> {
        let baselines = snapshots.get_latest_snapshots_before(account_id, range.start)?;
        let window_movements = movements.get_movements_in_range(account_id, range.start, range.end)?;
        let existing = snapshots.get_snapshots_in_range(account_id, range.start, range.end)?;
        Ok(Self::build(account_id, range, baselines, window_movements, existing))
    }

    pub fn build(
        account_id: &str,
        range: DateRange,
        baselines: HashMap<String, FinancialSnapshot>,
        movements: Vec<Movement>,
        existing: Vec<FinancialSnapshot>,
    ) -> Self {
        let mut movements_by_date: BTreeMap<NaiveDate, BTreeMap<String, Vec<Movement>>> =
            BTreeMap::new();
        for movement in movements {
            let date = movement.normalized_date();
            if !range.contains(date) {
                warn!(
                    "Movement {} dated {} returned for window {}; ignored",
                    movement.id, date, range
                );
                continue;
            }
            movements_by_date
                .entry(date)
                .or_default()
                .entry(movement.currency.clone())
                .or_default()
                .push(movement);
        }
        for by_currency in movements_by_date.values_mut() {
            for bucket in by_currency.values_mut() {
                sort_movements(bucket);
            }
        }

        let existing: HashMap<(NaiveDate, String), FinancialSnapshot> = existing
            .into_iter()
            .map(|s| ((s.snapshot_date, s.currency.clone()), s))
            .collect();

        let mut currencies: BTreeSet<String> = baselines.keys().cloned().collect();
        currencies.extend(existing.keys().map(|(_, currency)| currency.clone()));
        for by_currency in movements_by_date.values() {
            currencies.extend(by_currency.keys().cloned());
        }

        let dates = relevant_dates(
            movements_by_date.keys().copied(),
            existing.keys().map(|(date, _)| *date),
        );

        debug!(
            "Context for {} over {}: {} baselines, {} movement dates, {} existing rows, {} relevant dates",
            account_id,
            range,
            baselines.len(),
            movements_by_date.len(),
            existing.len(),
            dates.len()
        );

        Self {
            account_id: account_id.to_string(),
            range,
            baselines,
            movements_by_date,
            existing,
            currencies,
            relevant_dates: dates,
            prices: PriceTable::new(),
        }
    }

    pub fn movements_for(&self, date: NaiveDate, currency: &str) -> &[Movement] {
        self.movements_by_date
            .get(&date)
            .and_then(|by_currency| by_currency.get(currency))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn existing_for(&self, date: NaiveDate, currency: &str) -> Option<&FinancialSnapshot> {
        self.existing.get(&(date, currency.to_string()))
    }

    pub fn movement_count(&self) -> usize {
        self.movements_by_date
            .values()
            .flat_map(|by_currency| by_currency.values())
            .map(Vec::len)
            .sum()
    }

    /// Price triples the run will look up: for each date where a currency has
    /// movements, every instrument that can be open in that currency by then.
    pub fn required_price_keys(&self) -> HashSet<PriceKey> {
        let mut tickers: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for (currency, baseline) in &self.baselines {
            tickers
                .entry(currency.as_str())
                .or_default()
                .extend(baseline.positions.keys().cloned());
        }

        let mut keys = HashSet::new();
        for date in &self.relevant_dates {
            let Some(by_currency) = self.movements_by_date.get(date) else {
                continue;
            };
            for (currency, movements) in by_currency {
                let open = tickers.entry(currency.as_str()).or_default();
                open.extend(movements.iter().filter_map(|m| m.instrument()).map(|i| i.key()));
                keys.extend(
                    open.iter()
                        .map(|ticker| PriceKey::new(ticker.clone(), currency.clone(), *date)),
                );
            }
        }
        keys
    }

    /// Loads every required price in one parallel pass.
    pub fn prefetch_prices(&mut self, cache: &dyn PriceCacheTrait) -> Result<()> {
        let keys = self.required_price_keys();
        self.prices = PriceTable::prefetch(cache, &keys)?;
        Ok(())
    }
}
