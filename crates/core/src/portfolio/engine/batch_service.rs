use chrono::NaiveDate;
use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use super::calculators::{evaluate_pair, SnapshotTarget};
use super::context::BatchCalculationContext;
use super::scenario::ScenarioKind;
use crate::errors::Result;
use crate::movements::MovementRepositoryTrait;
use crate::portfolio::snapshot::{FinancialSnapshot, SnapshotRepositoryTrait};
use crate::prices::PriceCacheTrait;
use crate::utils::DateRange;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub relevant_dates: Vec<NaiveDate>,
    /// (date, currency) pairs handed to the resolver.
    pub evaluated_pairs: usize,
    pub scenario_counts: BTreeMap<ScenarioKind, usize>,
    pub snapshots_written: usize,
}

/// Recomputes a date window for one account in a single load/compute/commit pass.
pub struct BatchSnapshotService {
    movement_repository: Arc<dyn MovementRepositoryTrait>,
    snapshot_repository: Arc<dyn SnapshotRepositoryTrait>,
    price_cache: Arc<dyn PriceCacheTrait>,
}

impl BatchSnapshotService {
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

    /// Evaluates every relevant (date, currency) pair in `range` and commits
    /// all resulting writes at once. Any error aborts before the commit.
    pub async fn process_batch(&self, account_id: &str, range: DateRange) -> Result<BatchOutcome> {
        let started = Instant::now();
        let mut context = BatchCalculationContext::load(
            account_id,
            range,
            self.movement_repository.as_ref(),
            self.snapshot_repository.as_ref(),
        )?;

        let mut outcome = BatchOutcome {
            relevant_dates: context.relevant_dates.clone(),
            ..Default::default()
        };
        if context.relevant_dates.is_empty() {
            debug!("No relevant dates for {} in {}", account_id, range);
            return Ok(outcome);
        }

        context.prefetch_prices(self.price_cache.as_ref())?;

        let writes = evaluate_context(&context, &mut outcome)?;

        outcome.snapshots_written = if writes.is_empty() {
            0
        } else {
            self.snapshot_repository
                .commit_snapshots(account_id, writes)
                .await?
        };

        info!(
            "Batch {} {}: {} relevant dates, {} pairs, {} written in {:?}",
            account_id,
            range,
            outcome.relevant_dates.len(),
            outcome.evaluated_pairs,
            outcome.snapshots_written,
            started.elapsed()
        );
        Ok(outcome)
    }
}

/// Walks the relevant dates in order, carrying each currency's latest state
/// forward as the next date's baseline. Returns the snapshots to write.
pub fn evaluate_context(
    context: &BatchCalculationContext,
    outcome: &mut BatchOutcome,
) -> Result<Vec<FinancialSnapshot>> {
    let mut running: HashMap<String, FinancialSnapshot> = context.baselines.clone();
    let mut writes = Vec::new();

    for date in &context.relevant_dates {
        for currency in &context.currencies {
            let target = SnapshotTarget {
                account_id: &context.account_id,
                currency,
                date: *date,
            };
            let pair = evaluate_pair(
                &target,
                context.movements_for(*date, currency),
                running.get(currency),
                context.existing_for(*date, currency),
                &context.prices,
            )?;

            outcome.evaluated_pairs += 1;
            *outcome.scenario_counts.entry(pair.kind).or_insert(0) += 1;

            if let Some(snapshot) = pair.snapshot {
                if pair.needs_write {
                    writes.push(snapshot.clone());
                }
                running.insert(currency.clone(), snapshot);
            }
        }
    }

    Ok(writes)
}
