//! Stable movement identifiers for statement rows that carry no broker id.
//!
//! Re-reading the same statement must produce the same ids, otherwise a
//! resumed import would persist a chunk twice under different keys.

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use super::movements_model::{MovementDetails, MovementKind};
use chrono::{DateTime, Utc};

/// Computes a deterministic id from a movement's semantic content.
///
/// `occurrence` distinguishes identical rows within one source (two equal
/// fills on the same instant are two real trades).
pub fn compute_movement_id(
    account_id: &str,
    currency: &str,
    executed_at: &DateTime<Utc>,
    details: &MovementDetails,
    occurrence: u32,
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(account_id.as_bytes());
    hasher.update(b"|");
    hasher.update(currency.as_bytes());
    hasher.update(b"|");
    hasher.update(executed_at.to_rfc3339().as_bytes());
    hasher.update(b"|");
    hasher.update(content_fingerprint(details).as_bytes());
    hasher.update(b"|");
    hasher.update(occurrence.to_string().as_bytes());

    hex::encode(hasher.finalize())
}

/// Canonical text of the kind-specific fields, used for hashing and for
/// counting duplicate rows.
pub fn content_fingerprint(details: &MovementDetails) -> String {
    match details {
        MovementDetails::StockTrade(t) => format!(
            "{}|{}|{:?}|{}|{}|{}",
            MovementKind::StockTrade.as_str(),
            t.ticker,
            t.side,
            normalize_decimal(t.quantity),
            normalize_decimal(t.price),
            normalize_decimal(t.fees)
        ),
        MovementDetails::OptionTrade(t) => format!(
            "{}|{}|{:?}|{}|{}|{:?}|{}|{}|{}",
            MovementKind::OptionTrade.as_str(),
            t.underlying,
            t.option_type,
            normalize_decimal(t.strike),
            t.expiration,
            t.action,
            normalize_decimal(t.quantity),
            normalize_decimal(t.net_premium),
            normalize_decimal(t.multiplier)
        ),
        MovementDetails::Dividend(d) => format!(
            "{}|{}|{}",
            MovementKind::Dividend.as_str(),
            d.ticker,
            normalize_decimal(d.amount)
        ),
        MovementDetails::DividendTax(d) => format!(
            "{}|{}|{}",
            MovementKind::DividendTax.as_str(),
            d.ticker,
            normalize_decimal(d.amount)
        ),
        MovementDetails::CashMovement(c) => format!(
            "{}|{:?}|{}",
            MovementKind::CashMovement.as_str(),
            c.direction,
            normalize_decimal(c.amount)
        ),
    }
}

fn normalize_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movements::{CashDirection, CashMovement, StockTrade, TradeSide};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn buy(quantity: Decimal) -> MovementDetails {
        MovementDetails::StockTrade(StockTrade {
            ticker: "AAPL".to_string(),
            side: TradeSide::Buy,
            quantity,
            price: dec!(150),
            fees: dec!(1),
        })
    }

    #[test]
    fn test_same_content_same_id() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        let a = compute_movement_id("acc", "USD", &at, &buy(dec!(10)), 0);
        let b = compute_movement_id("acc", "USD", &at, &buy(dec!(10.000)), 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_occurrence_and_content_change_id() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        let base = compute_movement_id("acc", "USD", &at, &buy(dec!(10)), 0);
        assert_ne!(base, compute_movement_id("acc", "USD", &at, &buy(dec!(10)), 1));
        assert_ne!(base, compute_movement_id("acc", "USD", &at, &buy(dec!(11)), 0));
        assert_ne!(base, compute_movement_id("other", "USD", &at, &buy(dec!(10)), 0));
    }

    #[test]
    fn test_fingerprint_distinguishes_kinds() {
        let deposit = MovementDetails::CashMovement(CashMovement {
            direction: CashDirection::Deposit,
            amount: dec!(100),
        });
        let withdrawal = MovementDetails::CashMovement(CashMovement {
            direction: CashDirection::Withdrawal,
            amount: dec!(100),
        });
        assert_ne!(content_fingerprint(&deposit), content_fingerprint(&withdrawal));
    }
}
