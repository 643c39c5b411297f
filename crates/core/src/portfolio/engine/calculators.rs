//! One pure calculator per scenario.
//!
//! Calculators never read storage or the price cache. A `None` result means
//! nothing should exist for the pair (scenario F).

use chrono::NaiveDate;
use log::{debug, warn};

use super::scenario::{resolve, Scenario, ScenarioKind};
use crate::errors::Result;
use crate::movements::Movement;
use crate::portfolio::snapshot::{FinancialSnapshot, SnapshotCalculator};
use crate::prices::PriceTable;

/// The (account, currency, date) a calculation produces a snapshot for.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotTarget<'a> {
    pub account_id: &'a str,
    pub currency: &'a str,
    pub date: NaiveDate,
}

/// A: baseline plus the day's deltas.
pub fn append_from_baseline(
    baseline: &FinancialSnapshot,
    movements: &[Movement],
    date: NaiveDate,
    prices: &PriceTable,
) -> Result<FinancialSnapshot> {
    let calculator = SnapshotCalculator::new();
    let mut snapshot = calculator.apply_day(baseline, movements, date)?.snapshot;
    finish(&calculator, &mut snapshot, prices);
    Ok(snapshot)
}

/// B: first snapshot for the currency, built from the day's movements alone.
pub fn initial_from_movements(
    target: &SnapshotTarget<'_>,
    movements: &[Movement],
    prices: &PriceTable,
) -> Result<FinancialSnapshot> {
    let calculator = SnapshotCalculator::new();
    let start = FinancialSnapshot::empty(target.account_id, target.currency, target.date);
    let mut snapshot = calculator.apply_day(&start, movements, target.date)?.snapshot;
    finish(&calculator, &mut snapshot, prices);
    Ok(snapshot)
}

/// C: the existing row rebuilt from its baseline. The caller decides whether
/// the result differs from what is stored.
pub fn recompute_with_baseline(
    baseline: &FinancialSnapshot,
    existing: &FinancialSnapshot,
    movements: &[Movement],
    prices: &PriceTable,
) -> Result<FinancialSnapshot> {
    let mut snapshot = append_from_baseline(baseline, movements, existing.snapshot_date, prices)?;
    snapshot.id = existing.id.clone();
    Ok(snapshot)
}

/// D: the existing row rebuilt from the day's movements. Without a baseline
/// the day cannot see earlier lots, so stored realized gains are kept unless
/// the day itself closed something.
pub fn recompute_without_baseline(
    existing: &FinancialSnapshot,
    movements: &[Movement],
    prices: &PriceTable,
) -> Result<FinancialSnapshot> {
    let calculator = SnapshotCalculator::new();
    let start = FinancialSnapshot::empty(&existing.account_id, &existing.currency, existing.snapshot_date);
    let application = calculator.apply_day(&start, movements, existing.snapshot_date)?;
    let has_closing_activity = application.has_closing_activity();
    let mut snapshot = application.snapshot;
    if !has_closing_activity {
        snapshot.realized_gains = existing.realized_gains;
    }
    finish(&calculator, &mut snapshot, prices);
    Ok(snapshot)
}

/// E: the baseline, unchanged, on a new date.
pub fn carry_forward(baseline: &FinancialSnapshot, date: NaiveDate) -> FinancialSnapshot {
    baseline.carried_to(date)
}

/// G: the existing row if it matches what the baseline implies, otherwise the
/// corrected row.
pub fn revalidate(baseline: &FinancialSnapshot, existing: &FinancialSnapshot) -> FinancialSnapshot {
    let expected = carry_forward(baseline, existing.snapshot_date);
    if existing.is_content_equal(&expected) {
        existing.clone()
    } else {
        warn!(
            "Snapshot {} diverged from baseline {}; correcting",
            existing.id, baseline.id
        );
        expected
    }
}

/// H: a row that no longer has anything behind it is zeroed.
pub fn reset(existing: &FinancialSnapshot) -> FinancialSnapshot {
    if existing.is_zero() {
        return existing.clone();
    }
    FinancialSnapshot::empty(&existing.account_id, &existing.currency, existing.snapshot_date)
}

pub fn calculate(
    scenario: Scenario<'_>,
    target: &SnapshotTarget<'_>,
    prices: &PriceTable,
) -> Result<Option<FinancialSnapshot>> {
    let snapshot = match scenario {
        Scenario::AppendFromBaseline { baseline, movements } => {
            append_from_baseline(baseline, movements, target.date, prices)?
        }
        Scenario::InitialFromMovements { movements } => {
            initial_from_movements(target, movements, prices)?
        }
        Scenario::RecomputeWithBaseline {
            baseline,
            existing,
            movements,
        } => recompute_with_baseline(baseline, existing, movements, prices)?,
        Scenario::RecomputeWithoutBaseline { existing, movements } => {
            recompute_without_baseline(existing, movements, prices)?
        }
        Scenario::CarryForward { baseline } => carry_forward(baseline, target.date),
        Scenario::NoOp => return Ok(None),
        Scenario::Revalidate { baseline, existing } => revalidate(baseline, existing),
        Scenario::Reset { existing } => reset(existing),
    };
    Ok(Some(snapshot))
}

/// What evaluating one (date, currency) pair produced.
#[derive(Debug, Clone)]
pub struct PairOutcome {
    pub kind: ScenarioKind,
    /// State at the close of the date, if any.
    pub snapshot: Option<FinancialSnapshot>,
    /// The snapshot differs from the stored row and must be written.
    pub needs_write: bool,
}

/// Resolves, calculates and validates one pair.
pub fn evaluate_pair(
    target: &SnapshotTarget<'_>,
    movements: &[Movement],
    baseline: Option<&FinancialSnapshot>,
    existing: Option<&FinancialSnapshot>,
    prices: &PriceTable,
) -> Result<PairOutcome> {
    let scenario = resolve(movements, baseline, existing);
    let kind = scenario.kind();
    let snapshot = calculate(scenario, target, prices)?;

    let needs_write = match &snapshot {
        Some(snapshot) => {
            snapshot.validate(baseline)?;
            !existing.is_some_and(|row| row.is_content_equal(snapshot))
        }
        None => false,
    };

    debug!(
        "{} {} {} -> {} (write: {})",
        target.account_id, target.currency, target.date, kind, needs_write
    );

    Ok(PairOutcome {
        kind,
        snapshot,
        needs_write,
    })
}

fn finish(calculator: &SnapshotCalculator, snapshot: &mut FinancialSnapshot, prices: &PriceTable) {
    calculator.apply_valuation(snapshot, prices);
    snapshot.round_values();
}
