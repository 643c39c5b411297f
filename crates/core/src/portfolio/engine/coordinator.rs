use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::batch_service::BatchSnapshotService;
use super::sequencer::AccountSequencer;
use super::single_date_processor::SingleDateProcessor;
use crate::errors::Result;
use crate::movements::MovementRepositoryTrait;
use crate::portfolio::snapshot::SnapshotRepositoryTrait;
use crate::prices::PriceCacheTrait;
use crate::settings::EngineSettings;
use crate::utils::{CancelFlag, DateRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingMode {
    Batch,
    SingleDate,
    /// Batch failed and the single-date processor took over.
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationReport {
    pub account_id: String,
    pub range: DateRange,
    pub mode: ProcessingMode,
    pub dates_processed: usize,
    pub evaluated_pairs: usize,
    pub snapshots_written: usize,
    /// Why the batch path was abandoned, when it was.
    pub batch_error: Option<String>,
    pub cancelled: bool,
}

/// Entry point for every snapshot recomputation. Picks the batch path or the
/// single-date processor and falls back from one to the other on failure.
pub struct SnapshotCoordinator {
    batch: BatchSnapshotService,
    single_date: SingleDateProcessor,
    sequencer: AccountSequencer,
    batch_mode: AtomicBool,
}

impl SnapshotCoordinator {
    pub fn new(
        movement_repository: Arc<dyn MovementRepositoryTrait>,
        snapshot_repository: Arc<dyn SnapshotRepositoryTrait>,
        price_cache: Arc<dyn PriceCacheTrait>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            batch: BatchSnapshotService::new(
                movement_repository.clone(),
                snapshot_repository.clone(),
                price_cache.clone(),
            ),
            single_date: SingleDateProcessor::new(movement_repository, snapshot_repository, price_cache),
            sequencer: AccountSequencer::new(),
            batch_mode: AtomicBool::new(settings.batch_mode_enabled),
        }
    }

    pub fn enable_batch_mode(&self, enabled: bool) {
        self.batch_mode.store(enabled, Ordering::SeqCst);
        info!("Batch snapshot mode {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_batch_mode_enabled(&self) -> bool {
        self.batch_mode.load(Ordering::SeqCst)
    }

    pub async fn recalculate(&self, account_id: &str, range: DateRange) -> Result<RecalculationReport> {
        self.recalculate_with_cancel(account_id, range, &CancelFlag::new())
            .await
    }

    /// Like [`Self::recalculate`], checking `cancel` between dates on the
    /// single-date path. A batch run is one unit and is not interrupted.
    pub async fn recalculate_with_cancel(
        &self,
        account_id: &str,
        range: DateRange,
        cancel: &CancelFlag,
    ) -> Result<RecalculationReport> {
        let _guard = self.sequencer.lock(account_id).await;

        if !self.is_batch_mode_enabled() {
            return self
                .run_single_dates(account_id, range, range.days(), ProcessingMode::SingleDate, None, cancel)
                .await;
        }

        if cancel.is_cancelled() {
            return Ok(RecalculationReport {
                account_id: account_id.to_string(),
                range,
                mode: ProcessingMode::Batch,
                dates_processed: 0,
                evaluated_pairs: 0,
                snapshots_written: 0,
                batch_error: None,
                cancelled: true,
            });
        }

        match self.batch.process_batch(account_id, range).await {
            Ok(outcome) => Ok(RecalculationReport {
                account_id: account_id.to_string(),
                range,
                mode: ProcessingMode::Batch,
                dates_processed: outcome.relevant_dates.len(),
                evaluated_pairs: outcome.evaluated_pairs,
                snapshots_written: outcome.snapshots_written,
                batch_error: None,
                cancelled: false,
            }),
            Err(e) if e.is_storage_failure() => {
                warn!(
                    "Batch for {} over {} hit a storage failure ({}); retrying {} only",
                    account_id, range, e, range.start
                );
                let report = self
                    .run_single_dates(
                        account_id,
                        range,
                        vec![range.start],
                        ProcessingMode::Fallback,
                        Some(e.to_string()),
                        cancel,
                    )
                    .await?;
                if range.start == range.end || report.cancelled {
                    return Ok(report);
                }
                // Dates after the requested one were not computed; the caller
                // must retry the range.
                warn!(
                    "Recalculation of {} left {} unprocessed after {}",
                    account_id, range, range.start
                );
                Err(e)
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!(
                    "Batch for {} over {} failed ({}); falling back to single-date processing",
                    account_id, range, e
                );
                self.run_single_dates(
                    account_id,
                    range,
                    range.days(),
                    ProcessingMode::Fallback,
                    Some(e.to_string()),
                    cancel,
                )
                .await
            }
            Err(e) => Err(e),
        }
    }

    async fn run_single_dates(
        &self,
        account_id: &str,
        range: DateRange,
        dates: Vec<NaiveDate>,
        mode: ProcessingMode,
        batch_error: Option<String>,
        cancel: &CancelFlag,
    ) -> Result<RecalculationReport> {
        let mut report = RecalculationReport {
            account_id: account_id.to_string(),
            range,
            mode,
            dates_processed: 0,
            evaluated_pairs: 0,
            snapshots_written: 0,
            batch_error,
            cancelled: false,
        };

        for date in dates {
            if cancel.is_cancelled() {
                info!("Recalculation of {} cancelled before {}", account_id, date);
                report.cancelled = true;
                break;
            }
            let outcome = self.single_date.process_date(account_id, date).await?;
            if !outcome.skipped {
                report.dates_processed += 1;
            }
            report.evaluated_pairs += outcome.evaluated_pairs;
            report.snapshots_written += outcome.snapshots_written;
        }

        Ok(report)
    }
}
