use chrono::NaiveDate;
use dashmap::DashMap;
use log::debug;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::price_traits::PriceCacheTrait;
use crate::errors::Result;

/// A closing price for one ticker in one currency on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub ticker: String,
    pub currency: String,
    pub date: NaiveDate,
    pub close: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriceKey {
    pub ticker: String,
    pub currency: String,
    pub date: NaiveDate,
}

impl PriceKey {
    pub fn new(ticker: impl Into<String>, currency: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            currency: currency.into(),
            date,
        }
    }
}

/// Read-only price lookup used while valuing open positions.
///
/// Filled in one parallel pass before calculation starts; calculators never
/// touch the price cache themselves.
#[derive(Debug, Default)]
pub struct PriceTable {
    prices: DashMap<PriceKey, Decimal>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: PriceKey, price: Decimal) {
        self.prices.insert(key, price);
    }

    pub fn get(&self, ticker: &str, currency: &str, date: NaiveDate) -> Option<Decimal> {
        self.prices
            .get(&PriceKey::new(ticker, currency, date))
            .map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Resolves every key against the cache in parallel. Keys with no price on
    /// or before their date are simply absent from the table.
    pub fn prefetch(cache: &dyn PriceCacheTrait, keys: &HashSet<PriceKey>) -> Result<Self> {
        let table = PriceTable::new();
        let requested: Vec<&PriceKey> = keys.iter().collect();

        requested.par_iter().try_for_each(|key| -> Result<()> {
            if let Some(price) =
                cache.get_price_or_previous(&key.ticker, &key.currency, key.date)?
            {
                table.insert((*key).clone(), price);
            }
            Ok(())
        })?;

        debug!(
            "Prefetched {} of {} requested prices",
            table.len(),
            requested.len()
        );
        Ok(table)
    }
}
