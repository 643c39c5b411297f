//! Reading broker statements into movements.
//!
//! The canonical layout is a headed CSV with one movement per row:
//!
//! ```text
//! id,kind,executed_at,currency,symbol,side,quantity,price,fees,amount,option_type,strike,expiration,action,multiplier
//! ```
//!
//! `symbol` is the ticker (or the underlying for options). `side` carries
//! BUY/SELL for stock trades and DEPOSIT/WITHDRAWAL for cash movements.
//! `amount` is the dividend, tax, cash amount, or net premium. `id` is
//! optional; rows without one get a content-derived id.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, Trim};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::idempotency::{compute_movement_id, content_fingerprint};
use super::movements_model::*;
use crate::constants::DEFAULT_OPTION_MULTIPLIER;
use crate::errors::{ImportError, Result};

/// A statement row that could not be turned into a valid movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedMovement {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub movement_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct StatementContents {
    pub movements: Vec<Movement>,
    pub rejected: Vec<RejectedMovement>,
}

/// Source of movements for an import session.
pub trait StatementReader: Send + Sync {
    /// Reads every movement in the statement. Row-level problems go to
    /// `rejected`; only an unreadable source is an error.
    fn read_statement(&self, account_id: &str, path: &Path) -> Result<StatementContents>;
}

#[derive(Debug, Default, Deserialize)]
struct CsvMovementRow {
    #[serde(default)]
    id: Option<String>,
    kind: String,
    executed_at: String,
    currency: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    fees: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    option_type: Option<String>,
    #[serde(default)]
    strike: Option<String>,
    #[serde(default)]
    expiration: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    multiplier: Option<String>,
}

/// Reader for the canonical CSV statement layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvStatementReader;

impl CsvStatementReader {
    pub fn new() -> Self {
        Self
    }

    /// Parses statement text. Exposed separately so callers holding the bytes
    /// (e.g. after fingerprinting) do not read the file twice.
    pub fn parse(&self, account_id: &str, data: &[u8]) -> Result<StatementContents> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(data);

        let mut contents = StatementContents::default();
        let mut occurrences: HashMap<String, u32> = HashMap::new();

        for (index, record) in reader.deserialize::<CsvMovementRow>().enumerate() {
            let row_number = index + 1;
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    contents.rejected.push(RejectedMovement {
                        row: row_number,
                        movement_id: None,
                        reason: format!("unparseable row: {}", e),
                    });
                    continue;
                }
            };

            let explicit_id = row.id.clone().filter(|id| !id.is_empty());
            match row_to_movement(account_id, &row) {
                Ok((executed_at, currency, details)) => {
                    let id = match explicit_id {
                        Some(id) => id,
                        None => {
                            let identity = format!(
                                "{}|{}|{}",
                                executed_at.to_rfc3339(),
                                currency,
                                content_fingerprint(&details)
                            );
                            let seen = occurrences.entry(identity).or_insert(0);
                            let id = compute_movement_id(
                                account_id,
                                &currency,
                                &executed_at,
                                &details,
                                *seen,
                            );
                            *seen += 1;
                            id
                        }
                    };
                    contents.movements.push(
                        Movement::new(id, account_id, currency, executed_at, details)
                            .with_sequence(row_number as i64),
                    );
                }
                Err(reason) => contents.rejected.push(RejectedMovement {
                    row: row_number,
                    movement_id: explicit_id,
                    reason,
                }),
            }
        }

        debug!(
            "Parsed statement: {} movements, {} rejected rows",
            contents.movements.len(),
            contents.rejected.len()
        );
        Ok(contents)
    }
}

impl StatementReader for CsvStatementReader {
    fn read_statement(&self, account_id: &str, path: &Path) -> Result<StatementContents> {
        let data = std::fs::read(path).map_err(|e| ImportError::SourceUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let contents = self.parse(account_id, &data)?;
        for rejected in &contents.rejected {
            warn!(
                "Statement {} row {} rejected: {}",
                path.display(),
                rejected.row,
                rejected.reason
            );
        }
        Ok(contents)
    }
}

type ParsedRow = (DateTime<Utc>, String, MovementDetails);

fn row_to_movement(account_id: &str, row: &CsvMovementRow) -> std::result::Result<ParsedRow, String> {
    if account_id.is_empty() {
        return Err("missing account id".to_string());
    }
    let executed_at = parse_instant(&row.executed_at)?;
    let currency = row.currency.trim().to_uppercase();
    if currency.is_empty() {
        return Err("missing currency".to_string());
    }

    let details = match row.kind.trim().to_uppercase().as_str() {
        "STOCK_TRADE" | "TRADE" => MovementDetails::StockTrade(StockTrade {
            ticker: required_text(&row.symbol, "symbol")?,
            side: match required_text(&row.side, "side")?.to_uppercase().as_str() {
                "BUY" => TradeSide::Buy,
                "SELL" => TradeSide::Sell,
                other => return Err(format!("unknown trade side '{}'", other)),
            },
            quantity: required_decimal(&row.quantity, "quantity")?,
            price: required_decimal(&row.price, "price")?,
            fees: optional_decimal(&row.fees, "fees")?.unwrap_or(Decimal::ZERO),
        }),
        "OPTION_TRADE" | "OPTION" => MovementDetails::OptionTrade(OptionTrade {
            underlying: required_text(&row.symbol, "symbol")?,
            option_type: match required_text(&row.option_type, "option_type")?
                .to_uppercase()
                .as_str()
            {
                "C" | "CALL" => OptionType::Call,
                "P" | "PUT" => OptionType::Put,
                other => return Err(format!("unknown option type '{}'", other)),
            },
            strike: required_decimal(&row.strike, "strike")?,
            expiration: NaiveDate::parse_from_str(&required_text(&row.expiration, "expiration")?, "%Y-%m-%d")
                .map_err(|e| format!("invalid expiration: {}", e))?,
            action: parse_option_action(&required_text(&row.action, "action")?)?,
            quantity: required_decimal(&row.quantity, "quantity")?,
            net_premium: optional_decimal(&row.amount, "amount")?.unwrap_or(Decimal::ZERO),
            multiplier: optional_decimal(&row.multiplier, "multiplier")?
                .unwrap_or_else(|| Decimal::from(DEFAULT_OPTION_MULTIPLIER)),
        }),
        "DIVIDEND" => MovementDetails::Dividend(Dividend {
            ticker: required_text(&row.symbol, "symbol")?,
            amount: required_decimal(&row.amount, "amount")?,
        }),
        "DIVIDEND_TAX" | "TAX" => MovementDetails::DividendTax(DividendTax {
            ticker: required_text(&row.symbol, "symbol")?,
            amount: required_decimal(&row.amount, "amount")?.abs(),
        }),
        "CASH_MOVEMENT" | "CASH" => MovementDetails::CashMovement(CashMovement {
            direction: match required_text(&row.side, "side")?.to_uppercase().as_str() {
                "DEPOSIT" | "IN" => CashDirection::Deposit,
                "WITHDRAWAL" | "OUT" => CashDirection::Withdrawal,
                other => return Err(format!("unknown cash direction '{}'", other)),
            },
            amount: required_decimal(&row.amount, "amount")?.abs(),
        }),
        other => return Err(format!("unknown movement kind '{}'", other)),
    };

    Ok((executed_at, currency, details))
}

fn parse_option_action(raw: &str) -> std::result::Result<OptionAction, String> {
    match raw.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
        "SELL_TO_OPEN" | "STO" => Ok(OptionAction::SellToOpen),
        "BUY_TO_OPEN" | "BTO" => Ok(OptionAction::BuyToOpen),
        "BUY_TO_CLOSE" | "BTC" => Ok(OptionAction::BuyToClose),
        "SELL_TO_CLOSE" | "STC" => Ok(OptionAction::SellToClose),
        "EXPIRE" | "EXPIRED" => Ok(OptionAction::Expire),
        other => Err(format!("unknown option action '{}'", other)),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or a bare date (UTC midnight).
fn parse_instant(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("invalid executed_at '{}'", raw))
}

fn required_text(value: &Option<String>, field: &str) -> std::result::Result<String, String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing {}", field))
}

fn optional_decimal(value: &Option<String>, field: &str) -> std::result::Result<Option<Decimal>, String> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => Decimal::from_str(&raw.replace(',', ""))
            .map(Some)
            .map_err(|e| format!("invalid {} '{}': {}", field, raw, e)),
    }
}

fn required_decimal(value: &Option<String>, field: &str) -> std::result::Result<Decimal, String> {
    optional_decimal(value, field)?.ok_or_else(|| format!("missing {}", field))
}
