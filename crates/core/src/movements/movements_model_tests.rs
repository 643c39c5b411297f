use super::*;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;

fn stock_buy(id: &str, hour: u32, sequence: i64) -> Movement {
    Movement::new(
        id,
        "acc-1",
        "USD",
        Utc.with_ymd_and_hms(2024, 4, 2, hour, 0, 0).unwrap(),
        MovementDetails::StockTrade(StockTrade {
            ticker: "MSFT".to_string(),
            side: TradeSide::Buy,
            quantity: dec!(5),
            price: dec!(400),
            fees: dec!(0),
        }),
    )
    .with_sequence(sequence)
}

#[test]
fn test_normalized_date_buckets_late_utc_instant_on_same_day() {
    let movement = stock_buy("m1", 23, 0);
    assert_eq!(
        movement.normalized_date(),
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    );
}

#[test]
fn test_sort_orders_by_instant_then_sequence() {
    let mut movements = vec![stock_buy("c", 15, 1), stock_buy("b", 10, 9), stock_buy("a", 15, 0)];
    sort_movements(&mut movements);
    let ids: Vec<&str> = movements.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a", "c"]);
}

#[test]
fn test_option_instrument_key_normalizes_strike() {
    let a = Instrument::Option {
        underlying: "SPY".to_string(),
        option_type: OptionType::Put,
        strike: dec!(35.00),
        expiration: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
    };
    let b = Instrument::Option {
        underlying: "SPY".to_string(),
        option_type: OptionType::Put,
        strike: dec!(35),
        expiration: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
    };
    assert_eq!(a.key(), b.key());
    assert_eq!(a.key(), "SPY 2024-06-21 P 35");
}

#[test]
fn test_validate_rejects_malformed_trades() {
    let mut movement = stock_buy("m1", 12, 0);
    assert!(movement.validate().is_ok());

    if let MovementDetails::StockTrade(trade) = &mut movement.details {
        trade.quantity = dec!(0);
    }
    assert!(movement.validate().is_err());

    let option = Movement::new(
        "o1",
        "acc-1",
        "USD",
        Utc.with_ymd_and_hms(2024, 4, 2, 12, 0, 0).unwrap(),
        MovementDetails::OptionTrade(OptionTrade {
            underlying: "SPY".to_string(),
            option_type: OptionType::Call,
            strike: dec!(-1),
            expiration: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            action: OptionAction::SellToOpen,
            quantity: dec!(1),
            net_premium: dec!(50),
            multiplier: dec!(100),
        }),
    );
    assert!(option.validate().is_err());
}

#[test]
fn test_movement_json_round_trip_keeps_kind_tag() {
    let movement = stock_buy("m1", 12, 3);
    let json = serde_json::to_string(&movement).unwrap();
    assert!(json.contains("\"kind\":\"STOCK_TRADE\""));
    let back: Movement = serde_json::from_str(&json).unwrap();
    assert_eq!(back, movement);
}

#[test]
fn test_option_multiplier_defaults_when_missing() {
    let json = r#"{"underlying":"SPY","optionType":"CALL","strike":"400","expiration":"2024-06-21","action":"BUY_TO_OPEN","quantity":"1","netPremium":"120"}"#;
    let trade: OptionTrade = serde_json::from_str(json).unwrap();
    assert_eq!(trade.multiplier, dec!(100));
}

#[test]
fn test_csv_reader_parses_rows_and_reports_rejects() {
    let csv = "\
id,kind,executed_at,currency,symbol,side,quantity,price,fees,amount,option_type,strike,expiration,action,multiplier
,CASH_MOVEMENT,2024-01-02,usd,,DEPOSIT,,,,5000,,,,,
,STOCK_TRADE,2024-01-03T15:30:00Z,USD,AAPL,BUY,10,185.5,1,,,,,,
,OPTION_TRADE,2024-01-04 14:00:00,USD,AAPL,,1,,,120,C,200,2024-02-16,STO,
,STOCK_TRADE,2024-01-05,USD,AAPL,HOLD,10,185.5,1,,,,,,
,DIVIDEND,not-a-date,USD,AAPL,,,,,3.2,,,,,
";
    let contents = CsvStatementReader::new().parse("acc-1", csv.as_bytes()).unwrap();
    assert_eq!(contents.movements.len(), 3);
    assert_eq!(contents.rejected.len(), 2);
    assert_eq!(contents.rejected[0].row, 4);
    assert_eq!(contents.movements[0].currency, "USD");
    assert_eq!(contents.movements[1].sequence, 2);
    match &contents.movements[2].details {
        MovementDetails::OptionTrade(trade) => {
            assert_eq!(trade.action, OptionAction::SellToOpen);
            assert_eq!(trade.multiplier, dec!(100));
            assert_eq!(trade.net_premium, dec!(120));
        }
        other => panic!("unexpected details {:?}", other),
    }
}

#[test]
fn test_csv_reader_ids_are_stable_and_distinguish_duplicates() {
    let csv = "\
kind,executed_at,currency,symbol,side,quantity,price
STOCK_TRADE,2024-01-03,USD,AAPL,BUY,1,100
STOCK_TRADE,2024-01-03,USD,AAPL,BUY,1,100
";
    let reader = CsvStatementReader::new();
    let first = reader.parse("acc-1", csv.as_bytes()).unwrap();
    let second = reader.parse("acc-1", csv.as_bytes()).unwrap();
    assert_eq!(first.movements.len(), 2);
    assert_ne!(first.movements[0].id, first.movements[1].id);
    assert_eq!(first.movements[0].id, second.movements[0].id);
    assert_eq!(first.movements[1].id, second.movements[1].id);
}
