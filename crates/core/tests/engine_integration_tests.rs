//! End-to-end runs of the snapshot engine against the in-memory store.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use snapledger_core::memory::InMemoryStore;
use snapledger_core::movements::{
    CashDirection, CashMovement, Dividend, Movement, MovementDetails, MovementRepositoryTrait,
    StockTrade, TradeSide,
};
use snapledger_core::portfolio::engine::{
    BatchSnapshotService, ProcessingMode, ScenarioKind, SnapshotCoordinator,
};
use snapledger_core::portfolio::snapshot::SnapshotRepositoryTrait;
use snapledger_core::settings::EngineSettings;
use snapledger_core::utils::DateRange;

const ACCOUNT: &str = "acc-1";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn movement(id: &str, day: NaiveDate, hour: u32, details: MovementDetails) -> Movement {
    Movement::new(
        id,
        ACCOUNT,
        "USD",
        Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap()),
        details,
    )
}

fn stock(side: TradeSide, quantity: Decimal, price: Decimal) -> MovementDetails {
    MovementDetails::StockTrade(StockTrade {
        ticker: "MSFT".to_string(),
        side,
        quantity,
        price,
        fees: dec!(1),
    })
}

/// Twenty active dates spread over eighteen months.
fn sparse_history() -> Vec<Movement> {
    let first = date(2023, 1, 5);
    (0..20)
        .map(|i| {
            let day = first + Duration::days(i * 27);
            let id = format!("m{:02}", i);
            let details = match i {
                0 => MovementDetails::CashMovement(CashMovement {
                    direction: CashDirection::Deposit,
                    amount: dec!(100000),
                }),
                _ if i % 5 == 0 => MovementDetails::Dividend(Dividend {
                    ticker: "MSFT".to_string(),
                    amount: dec!(12.5),
                }),
                _ if i % 2 == 1 => stock(TradeSide::Buy, dec!(10), Decimal::from(250 + i)),
                _ => stock(TradeSide::Sell, dec!(4), Decimal::from(270 + i)),
            };
            movement(&id, day, 15, details)
        })
        .collect()
}

async fn store_with(movements: Vec<Movement>) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert_movements(movements).await.unwrap();
    store
}

fn coordinator(store: &Arc<InMemoryStore>, batch: bool) -> SnapshotCoordinator {
    let settings = EngineSettings::default().with_batch_mode(batch);
    SnapshotCoordinator::new(store.clone(), store.clone(), store.clone(), &settings)
}

fn full_window() -> DateRange {
    DateRange::new(date(2023, 1, 1), date(2024, 12, 31)).unwrap()
}

#[tokio::test]
async fn test_sparse_history_evaluates_only_active_dates() {
    let store = store_with(sparse_history()).await;
    let service = BatchSnapshotService::new(store.clone(), store.clone(), store.clone());

    let outcome = service.process_batch(ACCOUNT, full_window()).await.unwrap();
    assert_eq!(outcome.relevant_dates.len(), 20);
    assert_eq!(outcome.evaluated_pairs, 20);
    assert_eq!(outcome.snapshots_written, 20);
    assert_eq!(
        outcome.scenario_counts.get(&ScenarioKind::AppendFromBaseline),
        Some(&19)
    );
    assert_eq!(store.all_snapshots(ACCOUNT).unwrap().len(), 20);
}

#[tokio::test]
async fn test_sparse_history_matches_single_date_processing() {
    let batch_store = store_with(sparse_history()).await;
    let single_store = store_with(sparse_history()).await;

    let batch = coordinator(&batch_store, true)
        .recalculate(ACCOUNT, full_window())
        .await
        .unwrap();
    let single = coordinator(&single_store, false)
        .recalculate(ACCOUNT, full_window())
        .await
        .unwrap();
    assert_eq!(batch.mode, ProcessingMode::Batch);
    assert_eq!(single.mode, ProcessingMode::SingleDate);

    let from_batch = batch_store.all_snapshots(ACCOUNT).unwrap();
    let from_single = single_store.all_snapshots(ACCOUNT).unwrap();
    assert_eq!(from_batch.len(), from_single.len());
    for (a, b) in from_batch.iter().zip(&from_single) {
        assert!(a.is_content_equal(b), "{} differs", a.id);
    }

    let last = from_batch.last().unwrap();
    assert_eq!(last.movement_count, 20);
    assert_eq!(last.total_deposited, dec!(100000));
    assert_eq!(last.total_dividends, dec!(37.5));
}

#[tokio::test]
async fn test_recalculation_is_idempotent() {
    let store = store_with(sparse_history()).await;
    let coordinator = coordinator(&store, true);

    let first = coordinator.recalculate(ACCOUNT, full_window()).await.unwrap();
    assert_eq!(first.snapshots_written, 20);
    let before = store.all_snapshots(ACCOUNT).unwrap();

    let second = coordinator.recalculate(ACCOUNT, full_window()).await.unwrap();
    assert_eq!(second.snapshots_written, 0);
    assert_eq!(store.all_snapshots(ACCOUNT).unwrap(), before);
    assert_eq!(store.snapshot_commit_count(), 1);
}

#[tokio::test]
async fn test_gain_is_realized_on_the_sale_date() {
    let store = store_with(vec![
        movement("buy", date(2024, 3, 1), 15, stock(TradeSide::Buy, dec!(10), dec!(100))),
        movement("sell", date(2024, 3, 12), 15, stock(TradeSide::Sell, dec!(10), dec!(110))),
    ])
    .await;
    coordinator(&store, true)
        .recalculate(ACCOUNT, DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap())
        .await
        .unwrap();

    let opened = store.get_snapshot(ACCOUNT, "USD", date(2024, 3, 1)).unwrap().unwrap();
    assert_eq!(opened.realized_gains, Decimal::ZERO);
    let closed = store.get_snapshot(ACCOUNT, "USD", date(2024, 3, 12)).unwrap().unwrap();
    // (10 * 110 - 1) - (10 * 100 + 1)
    assert_eq!(closed.realized_gains, dec!(98));
    assert!(closed.positions.is_empty());
}

#[tokio::test]
async fn test_late_utc_movement_lands_on_its_own_date() {
    let late_sell = Movement::new(
        "late",
        ACCOUNT,
        "USD",
        Utc.with_ymd_and_hms(2024, 3, 4, 23, 59, 30).unwrap(),
        stock(TradeSide::Sell, dec!(5), dec!(120)),
    );
    let store = store_with(vec![
        movement("buy", date(2024, 3, 1), 15, stock(TradeSide::Buy, dec!(5), dec!(100))),
        late_sell,
    ])
    .await;
    coordinator(&store, true)
        .recalculate(ACCOUNT, DateRange::new(date(2024, 3, 1), date(2024, 3, 31)).unwrap())
        .await
        .unwrap();

    let sale_day = store.get_snapshot(ACCOUNT, "USD", date(2024, 3, 4)).unwrap().unwrap();
    assert_eq!(sale_day.movement_count, 2);
    assert_eq!(sale_day.realized_gains, dec!(98));
    assert!(store.get_snapshot(ACCOUNT, "USD", date(2024, 3, 5)).unwrap().is_none());
}
