use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::SqliteConnection;
use log::debug;
use std::sync::Arc;

use super::model::MovementDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::IntoCore;
use crate::utils::{chunk_rows, format_date};
use snapledger_core::errors::Result;
use snapledger_core::movements::{sort_movements, Movement, MovementRepositoryTrait};

const MOVEMENT_COLUMNS: usize = 9;

/// Inserts rows on an open write connection, skipping ids that already
/// exist. Returns how many rows were new.
pub(crate) fn insert_movement_rows(conn: &mut SqliteConnection, rows: &[MovementDB]) -> Result<usize> {
    use crate::schema::movements::dsl::*;

    let mut inserted = 0;
    for batch in chunk_rows(rows, MOVEMENT_COLUMNS) {
        inserted += diesel::insert_or_ignore_into(movements)
            .values(batch)
            .execute(conn)
            .into_core()?;
    }
    Ok(inserted)
}

pub(crate) fn to_rows(items: &[Movement]) -> Result<Vec<MovementDB>> {
    items.iter().map(MovementDB::from_domain).collect()
}

pub struct MovementRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl MovementRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl MovementRepositoryTrait for MovementRepository {
    fn get_movements_in_range(
        &self,
        input_account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Movement>> {
        use crate::schema::movements::dsl::*;

        let mut conn = get_connection(&self.pool)?;
        let rows = movements
            .filter(account_id.eq(input_account_id))
            .filter(movement_date.ge(format_date(start)))
            .filter(movement_date.le(format_date(end)))
            .order((executed_at.asc(), sequence.asc(), id.asc()))
            .select(MovementDB::as_select())
            .load::<MovementDB>(&mut conn)
            .into_core()?;

        let mut result = rows
            .into_iter()
            .map(Movement::try_from)
            .collect::<Result<Vec<_>>>()?;
        // Text order of executed_at matches time order; re-sort in case of
        // rows written with a different timestamp precision.
        sort_movements(&mut result);
        Ok(result)
    }

    fn count_movements(&self, input_account_id: &str) -> Result<usize> {
        use crate::schema::movements::dsl::*;

        let mut conn = get_connection(&self.pool)?;
        let count: i64 = movements
            .filter(account_id.eq(input_account_id))
            .count()
            .get_result(&mut conn)
            .into_core()?;
        Ok(count as usize)
    }

    async fn insert_movements(&self, new_movements: Vec<Movement>) -> Result<usize> {
        if new_movements.is_empty() {
            return Ok(0);
        }
        let rows = to_rows(&new_movements)?;
        let inserted = self
            .writer
            .exec(move |conn| insert_movement_rows(conn, &rows))
            .await?;
        debug!(
            "Inserted {} of {} movements",
            inserted,
            new_movements.len()
        );
        Ok(inserted)
    }
}
