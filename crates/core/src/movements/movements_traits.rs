use async_trait::async_trait;
use chrono::NaiveDate;

use super::movements_model::Movement;
use crate::errors::Result;

/// Persistence for immutable movements.
#[async_trait]
pub trait MovementRepositoryTrait: Send + Sync {
    /// Movements whose normalized date lies in `[start, end]`, in application
    /// order (executed_at, sequence, id).
    fn get_movements_in_range(
        &self,
        account_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Movement>>;

    fn count_movements(&self, account_id: &str) -> Result<usize>;

    /// Inserts movements, ignoring ids that already exist. Returns the number
    /// of rows actually inserted.
    async fn insert_movements(&self, movements: Vec<Movement>) -> Result<usize>;
}
