use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::price_model::PricePoint;
use crate::errors::Result;

/// Storage interface for closing prices.
#[async_trait]
pub trait PriceCacheTrait: Send + Sync {
    /// Price on `date`, or the most recent earlier one. `None` when the ticker
    /// has never been priced up to that date.
    fn get_price_or_previous(
        &self,
        ticker: &str,
        currency: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>>;

    async fn upsert_prices(&self, prices: Vec<PricePoint>) -> Result<usize>;
}
