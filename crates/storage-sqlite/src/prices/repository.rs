use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

use crate::db::{get_connection, WriteHandle};
use crate::errors::{corrupt, IntoCore};
use crate::utils::{chunk_rows, format_date};
use snapledger_core::errors::Result;
use snapledger_core::prices::{PriceCacheTrait, PricePoint};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::prices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PriceDB {
    pub ticker: String,
    pub currency: String,
    pub price_date: String,
    pub close: String,
}

impl From<&PricePoint> for PriceDB {
    fn from(point: &PricePoint) -> Self {
        Self {
            ticker: point.ticker.clone(),
            currency: point.currency.clone(),
            price_date: format_date(point.date),
            close: point.close.normalize().to_string(),
        }
    }
}

pub struct PriceRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl PriceRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl PriceCacheTrait for PriceRepository {
    fn get_price_or_previous(
        &self,
        input_ticker: &str,
        input_currency: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>> {
        use crate::schema::prices::dsl::*;

        let mut conn = get_connection(&self.pool)?;
        let latest: Option<String> = prices
            .filter(ticker.eq(input_ticker))
            .filter(currency.eq(input_currency))
            .filter(price_date.le(format_date(date)))
            .order(price_date.desc())
            .select(close)
            .first::<String>(&mut conn)
            .optional()
            .into_core()?;

        latest
            .map(|raw| Decimal::from_str(&raw).map_err(|e| corrupt("prices", e)))
            .transpose()
    }

    async fn upsert_prices(&self, points: Vec<PricePoint>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }
        let rows: Vec<PriceDB> = points.iter().map(PriceDB::from).collect();
        self.writer
            .exec(move |conn| {
                use crate::schema::prices::dsl::*;
                let mut written = 0;
                for batch in chunk_rows(&rows, 4) {
                    written += diesel::replace_into(prices)
                        .values(batch)
                        .execute(conn)
                        .into_core()?;
                }
                Ok(written)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_price_or_previous() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = create_pool(&db_path.to_string_lossy()).unwrap();
        run_migrations(&pool).unwrap();
        let writer = spawn_writer((*pool).clone()).unwrap();
        let repo = PriceRepository::new(pool, writer);

        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 3, d).unwrap();
        let point = |d: u32, close: Decimal| PricePoint {
            ticker: "MSFT".to_string(),
            currency: "USD".to_string(),
            date: day(d),
            close,
        };
        repo.upsert_prices(vec![point(4, dec!(410.5)), point(8, dec!(415))])
            .await
            .unwrap();
        repo.upsert_prices(vec![point(8, dec!(416.25))]).await.unwrap();

        assert_eq!(repo.get_price_or_previous("MSFT", "USD", day(3)).unwrap(), None);
        assert_eq!(
            repo.get_price_or_previous("MSFT", "USD", day(6)).unwrap(),
            Some(dec!(410.5))
        );
        assert_eq!(
            repo.get_price_or_previous("MSFT", "USD", day(20)).unwrap(),
            Some(dec!(416.25))
        );
        assert_eq!(repo.get_price_or_previous("MSFT", "EUR", day(20)).unwrap(), None);
    }
}
