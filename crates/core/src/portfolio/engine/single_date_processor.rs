use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::batch_service::{evaluate_context, BatchOutcome};
use super::context::BatchCalculationContext;
use super::scenario::ScenarioKind;
use crate::errors::Result;
use crate::movements::MovementRepositoryTrait;
use crate::portfolio::snapshot::SnapshotRepositoryTrait;
use crate::prices::PriceCacheTrait;
use crate::utils::DateRange;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleDateOutcome {
    pub date: NaiveDate,
    /// No movements and no stored rows on the date.
    pub skipped: bool,
    pub evaluated_pairs: usize,
    pub scenario_counts: BTreeMap<ScenarioKind, usize>,
    pub snapshots_written: usize,
}

/// Processes one date at a time with its own reads and commit. Slower than
/// the batch path; used when batch mode is off or a batch run failed.
pub struct SingleDateProcessor {
    movement_repository: Arc<dyn MovementRepositoryTrait>,
    snapshot_repository: Arc<dyn SnapshotRepositoryTrait>,
    price_cache: Arc<dyn PriceCacheTrait>,
}

impl SingleDateProcessor {
    pub fn new(
        movement_repository: Arc<dyn MovementRepositoryTrait>,
        snapshot_repository: Arc<dyn SnapshotRepositoryTrait>,
        price_cache: Arc<dyn PriceCacheTrait>,
    ) -> Self {
        Self {
            movement_repository,
            snapshot_repository,
            price_cache,
        }
    }

    pub async fn process_date(&self, account_id: &str, date: NaiveDate) -> Result<SingleDateOutcome> {
        let movements = self
            .movement_repository
            .get_movements_in_range(account_id, date, date)?;
        let existing = self
            .snapshot_repository
            .get_snapshots_in_range(account_id, date, date)?;

        if movements.is_empty() && existing.is_empty() {
            return Ok(SingleDateOutcome {
                date,
                skipped: true,
                evaluated_pairs: 0,
                scenario_counts: BTreeMap::new(),
                snapshots_written: 0,
            });
        }

        let baselines = self
            .snapshot_repository
            .get_latest_snapshots_before(account_id, date)?;
        let context = BatchCalculationContext::build(
            account_id,
            DateRange::single(date),
            baselines,
            movements,
            existing,
        );

        for key in context.required_price_keys() {
            if let Some(price) =
                self.price_cache
                    .get_price_or_previous(&key.ticker, &key.currency, key.date)?
            {
                context.prices.insert(key, price);
            }
        }

        let mut outcome = BatchOutcome::default();
        let writes = evaluate_context(&context, &mut outcome)?;
        let snapshots_written = if writes.is_empty() {
            0
        } else {
            self.snapshot_repository
                .commit_snapshots(account_id, writes)
                .await?
        };

        debug!(
            "Single-date {} {}: {} pairs, {} written",
            account_id, date, outcome.evaluated_pairs, snapshots_written
        );

        Ok(SingleDateOutcome {
            date,
            skipped: false,
            evaluated_pairs: outcome.evaluated_pairs,
            scenario_counts: outcome.scenario_counts,
            snapshots_written,
        })
    }
}
