use super::calculators::*;
use super::scenario::ScenarioKind;
use crate::movements::*;
use crate::portfolio::snapshot::FinancialSnapshot;
use crate::prices::PriceTable;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;

const ACCOUNT: &str = "acc-1";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 8, d).unwrap()
}

fn deposit(d: u32, amount: rust_decimal::Decimal) -> Movement {
    Movement::new(
        format!("dep-{}", d),
        ACCOUNT,
        "USD",
        Utc.with_ymd_and_hms(2024, 8, d, 9, 30, 0).unwrap(),
        MovementDetails::CashMovement(CashMovement {
            direction: CashDirection::Deposit,
            amount,
        }),
    )
}

fn buy_to_close(d: u32) -> Movement {
    Movement::new(
        format!("btc-{}", d),
        ACCOUNT,
        "USD",
        Utc.with_ymd_and_hms(2024, 8, d, 15, 0, 0).unwrap(),
        MovementDetails::OptionTrade(OptionTrade {
            underlying: "QQQ".to_string(),
            option_type: OptionType::Call,
            strike: dec!(500),
            expiration: day(30),
            action: OptionAction::BuyToClose,
            quantity: dec!(1),
            net_premium: dec!(20),
            multiplier: dec!(100),
        }),
    )
}

fn baseline_with_deposits(d: u32, amount: rust_decimal::Decimal) -> FinancialSnapshot {
    let mut snapshot = FinancialSnapshot::empty(ACCOUNT, "USD", day(d));
    snapshot.total_deposited = amount;
    snapshot.cash_balance = amount;
    snapshot.movement_count = 1;
    snapshot
}

fn target(d: u32) -> SnapshotTarget<'static> {
    SnapshotTarget {
        account_id: ACCOUNT,
        currency: "USD",
        date: day(d),
    }
}

#[test]
fn test_append_from_baseline_adds_deltas() {
    let baseline = baseline_with_deposits(1, dec!(100));
    let snapshot =
        append_from_baseline(&baseline, &[deposit(5, dec!(10))], day(5), &PriceTable::new()).unwrap();
    assert_eq!(snapshot.id, "acc-1_USD_2024-08-05");
    assert_eq!(snapshot.total_deposited, dec!(110));
    assert_eq!(snapshot.cash_balance, dec!(110));
    assert_eq!(snapshot.movement_count, 2);
}

#[test]
fn test_initial_from_movements_starts_from_zero() {
    let snapshot =
        initial_from_movements(&target(5), &[deposit(5, dec!(10))], &PriceTable::new()).unwrap();
    assert_eq!(snapshot.total_deposited, dec!(10));
    assert_eq!(snapshot.movement_count, 1);
}

#[test]
fn test_recompute_with_baseline_matches_stored_row() {
    let baseline = baseline_with_deposits(1, dec!(100));
    let movements = vec![deposit(5, dec!(10))];
    let stored =
        append_from_baseline(&baseline, &movements, day(5), &PriceTable::new()).unwrap();

    let outcome = evaluate_pair(
        &target(5),
        &movements,
        Some(&baseline),
        Some(&stored),
        &PriceTable::new(),
    )
    .unwrap();
    assert_eq!(outcome.kind, ScenarioKind::RecomputeWithBaseline);
    assert!(!outcome.needs_write);
}

#[test]
fn test_recompute_without_baseline_keeps_realized_without_closes() {
    let mut existing = FinancialSnapshot::empty(ACCOUNT, "USD", day(5));
    existing.realized_gains = dec!(50);
    let snapshot =
        recompute_without_baseline(&existing, &[deposit(5, dec!(10))], &PriceTable::new()).unwrap();
    assert_eq!(snapshot.realized_gains, dec!(50));
    assert_eq!(snapshot.total_deposited, dec!(10));
}

#[test]
fn test_recompute_without_baseline_recomputes_realized_with_closes() {
    let mut existing = FinancialSnapshot::empty(ACCOUNT, "USD", day(5));
    existing.realized_gains = dec!(50);
    let snapshot =
        recompute_without_baseline(&existing, &[buy_to_close(5)], &PriceTable::new()).unwrap();
    assert_eq!(snapshot.realized_gains, dec!(0));
    assert_eq!(snapshot.cash_balance, dec!(-20));
}

#[test]
fn test_carry_forward_keeps_every_value() {
    let mut baseline = baseline_with_deposits(1, dec!(100));
    baseline.unrealized_gains = dec!(7.5);
    let carried = carry_forward(&baseline, day(9));
    assert_eq!(carried.snapshot_date, day(9));
    assert_eq!(carried.total_deposited, dec!(100));
    assert_eq!(carried.unrealized_gains, dec!(7.5));

    let outcome = evaluate_pair(&target(9), &[], Some(&baseline), None, &PriceTable::new()).unwrap();
    assert_eq!(outcome.kind, ScenarioKind::CarryForward);
    assert!(outcome.needs_write);
}

#[test]
fn test_no_op_produces_nothing() {
    let outcome = evaluate_pair(&target(9), &[], None, None, &PriceTable::new()).unwrap();
    assert_eq!(outcome.kind, ScenarioKind::NoOp);
    assert!(outcome.snapshot.is_none());
    assert!(!outcome.needs_write);
}

#[test]
fn test_revalidate_only_writes_on_divergence() {
    let baseline = baseline_with_deposits(1, dec!(100));
    let consistent = carry_forward(&baseline, day(9));

    let outcome =
        evaluate_pair(&target(9), &[], Some(&baseline), Some(&consistent), &PriceTable::new()).unwrap();
    assert_eq!(outcome.kind, ScenarioKind::Revalidate);
    assert!(!outcome.needs_write);

    let mut diverged = consistent.clone();
    diverged.total_dividend_taxes = dec!(0.01);
    let corrected = revalidate(&baseline, &diverged);
    assert_eq!(corrected.total_dividend_taxes, dec!(0));

    let outcome =
        evaluate_pair(&target(9), &[], Some(&baseline), Some(&diverged), &PriceTable::new()).unwrap();
    assert!(outcome.needs_write);
}

#[test]
fn test_reset_zeroes_orphaned_rows_once() {
    let orphan = baseline_with_deposits(9, dec!(100));
    let outcome = evaluate_pair(&target(9), &[], None, Some(&orphan), &PriceTable::new()).unwrap();
    assert_eq!(outcome.kind, ScenarioKind::Reset);
    assert!(outcome.needs_write);
    let zeroed = outcome.snapshot.unwrap();
    assert!(zeroed.is_zero());
    assert_eq!(zeroed.id, orphan.id);

    let again = evaluate_pair(&target(9), &[], None, Some(&zeroed), &PriceTable::new()).unwrap();
    assert!(!again.needs_write);
}
