//! Movement domain models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::constants::DEFAULT_OPTION_MULTIPLIER;
use crate::errors::{Result, ValidationError};
use crate::utils::movement_date_from_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_code(&self) -> &'static str {
        match self {
            OptionType::Call => "C",
            OptionType::Put => "P",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionAction {
    SellToOpen,
    BuyToOpen,
    BuyToClose,
    SellToClose,
    /// Contract expired worthless; closes whatever is open at zero premium.
    Expire,
}

impl OptionAction {
    pub fn is_opening(&self) -> bool {
        matches!(self, OptionAction::SellToOpen | OptionAction::BuyToOpen)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashDirection {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockTrade {
    pub ticker: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub fees: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTrade {
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
    pub action: OptionAction,
    /// Number of contracts.
    pub quantity: Decimal,
    /// Total cash amount of the trade including fees. The sign is ignored; the
    /// action decides the cash direction.
    pub net_premium: Decimal,
    #[serde(default = "default_multiplier")]
    pub multiplier: Decimal,
}

fn default_multiplier() -> Decimal {
    Decimal::from(DEFAULT_OPTION_MULTIPLIER)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dividend {
    pub ticker: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DividendTax {
    pub ticker: String,
    /// Withheld amount; sign is ignored.
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashMovement {
    pub direction: CashDirection,
    pub amount: Decimal,
}

/// The kind-specific part of a movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementDetails {
    StockTrade(StockTrade),
    OptionTrade(OptionTrade),
    Dividend(Dividend),
    DividendTax(DividendTax),
    CashMovement(CashMovement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    StockTrade,
    OptionTrade,
    Dividend,
    DividendTax,
    CashMovement,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::StockTrade => "STOCK_TRADE",
            MovementKind::OptionTrade => "OPTION_TRADE",
            MovementKind::Dividend => "DIVIDEND",
            MovementKind::DividendTax => "DIVIDEND_TAX",
            MovementKind::CashMovement => "CASH_MOVEMENT",
        }
    }
}

/// Identity of a tradable instrument. Options are grouped by underlying,
/// type, strike and expiration for FIFO matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instrument {
    Stock {
        ticker: String,
    },
    Option {
        underlying: String,
        #[serde(rename = "optionType")]
        option_type: OptionType,
        strike: Decimal,
        expiration: NaiveDate,
    },
}

impl Instrument {
    /// Grouping key, also used as the ticker for price lookups.
    pub fn key(&self) -> String {
        match self {
            Instrument::Stock { ticker } => ticker.clone(),
            Instrument::Option {
                underlying,
                option_type,
                strike,
                expiration,
            } => format!(
                "{} {} {} {}",
                underlying,
                expiration.format("%Y-%m-%d"),
                option_type.as_code(),
                strike.normalize()
            ),
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, Instrument::Option { .. })
    }
}

/// An immutable financial movement on an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: String,
    pub account_id: String,
    pub currency: String,
    pub executed_at: DateTime<Utc>,
    /// Position of the movement in its source; orders same-instant movements.
    #[serde(default)]
    pub sequence: i64,
    #[serde(flatten)]
    pub details: MovementDetails,
}

impl Movement {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        currency: impl Into<String>,
        executed_at: DateTime<Utc>,
        details: MovementDetails,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            currency: currency.into(),
            executed_at,
            sequence: 0,
            details,
        }
    }

    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }

    /// The calendar date this movement is booked on.
    pub fn normalized_date(&self) -> NaiveDate {
        movement_date_from_utc(self.executed_at)
    }

    pub fn kind(&self) -> MovementKind {
        match &self.details {
            MovementDetails::StockTrade(_) => MovementKind::StockTrade,
            MovementDetails::OptionTrade(_) => MovementKind::OptionTrade,
            MovementDetails::Dividend(_) => MovementKind::Dividend,
            MovementDetails::DividendTax(_) => MovementKind::DividendTax,
            MovementDetails::CashMovement(_) => MovementKind::CashMovement,
        }
    }

    /// Instrument touched by a trade; `None` for income and cash movements.
    pub fn instrument(&self) -> Option<Instrument> {
        match &self.details {
            MovementDetails::StockTrade(trade) => Some(Instrument::Stock {
                ticker: trade.ticker.clone(),
            }),
            MovementDetails::OptionTrade(trade) => Some(Instrument::Option {
                underlying: trade.underlying.clone(),
                option_type: trade.option_type,
                strike: trade.strike,
                expiration: trade.expiration,
            }),
            _ => None,
        }
    }

    /// Rejects data-shape errors. A malformed movement is fatal for that
    /// record only and must be reported by the caller.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| -> Result<()> {
            Err(ValidationError::MalformedMovement {
                movement_id: self.id.clone(),
                reason,
            }
            .into())
        };

        if self.id.trim().is_empty() {
            return fail("missing id".to_string());
        }
        if self.account_id.trim().is_empty() {
            return fail("missing account id".to_string());
        }
        if self.currency.trim().is_empty() {
            return fail("missing currency".to_string());
        }

        match &self.details {
            MovementDetails::StockTrade(trade) => {
                if trade.ticker.trim().is_empty() {
                    return fail("stock trade without ticker".to_string());
                }
                if trade.quantity <= Decimal::ZERO {
                    return fail(format!("non-positive quantity {}", trade.quantity));
                }
                if trade.price.is_sign_negative() {
                    return fail(format!("negative price {}", trade.price));
                }
                if trade.fees.is_sign_negative() {
                    return fail(format!("negative fees {}", trade.fees));
                }
            }
            MovementDetails::OptionTrade(trade) => {
                if trade.underlying.trim().is_empty() {
                    return fail("option trade without underlying".to_string());
                }
                if trade.strike <= Decimal::ZERO {
                    return fail(format!("non-positive strike {}", trade.strike));
                }
                if trade.quantity <= Decimal::ZERO {
                    return fail(format!("non-positive contract count {}", trade.quantity));
                }
                if trade.multiplier <= Decimal::ZERO {
                    return fail(format!("non-positive multiplier {}", trade.multiplier));
                }
            }
            MovementDetails::Dividend(dividend) => {
                if dividend.ticker.trim().is_empty() {
                    return fail("dividend without ticker".to_string());
                }
                if dividend.amount.is_sign_negative() {
                    return fail(format!("negative dividend {}", dividend.amount));
                }
            }
            MovementDetails::DividendTax(tax) => {
                if tax.ticker.trim().is_empty() {
                    return fail("dividend tax without ticker".to_string());
                }
            }
            MovementDetails::CashMovement(cash) => {
                if cash.amount <= Decimal::ZERO {
                    return fail(format!("non-positive cash amount {}", cash.amount));
                }
            }
        }
        Ok(())
    }
}

/// Chronological order used everywhere movements are applied.
pub fn compare_movements(a: &Movement, b: &Movement) -> Ordering {
    a.executed_at
        .cmp(&b.executed_at)
        .then(a.sequence.cmp(&b.sequence))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_movements(movements: &mut [Movement]) {
    movements.sort_by(compare_movements);
}
