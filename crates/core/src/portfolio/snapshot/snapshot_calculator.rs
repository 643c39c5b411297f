use chrono::NaiveDate;
use log::{debug, warn};
use rust_decimal::Decimal;

use crate::errors::{CalculatorError, Result};
use crate::movements::{
    compare_movements, CashDirection, Instrument, Movement, MovementDetails, OptionAction,
    OptionTrade, StockTrade, TradeSide,
};
use crate::portfolio::snapshot::{FinancialSnapshot, Lot, OpenPosition, PositionDirection};
use crate::prices::PriceTable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillStats {
    pub applied: usize,
    pub opening_fills: usize,
    /// Trades that closed (or tried to close) open quantity, expiries included.
    pub closing_fills: usize,
}

/// Result of applying one day's movements to a running state.
#[derive(Debug, Clone)]
pub struct DayApplication {
    /// State after the movements, before valuation and rounding.
    pub snapshot: FinancialSnapshot,
    pub stats: FillStats,
}

impl DayApplication {
    pub fn has_closing_activity(&self) -> bool {
        self.stats.closing_fills > 0
    }
}

/// Applies movements to a snapshot and values the resulting positions.
///
/// Pure: no storage, no price cache. Everything it needs arrives as arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotCalculator;

impl SnapshotCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Applies `movements` (all booked on `target_date`) on top of `previous`.
    pub fn apply_day(
        &self,
        previous: &FinancialSnapshot,
        movements: &[Movement],
        target_date: NaiveDate,
    ) -> Result<DayApplication> {
        let mut state = previous.carried_to(target_date);
        let mut ordered: Vec<&Movement> = movements.iter().collect();
        ordered.sort_by(|a, b| compare_movements(a, b));

        let mut stats = FillStats::default();

        debug!(
            "Applying {} movements to {} for {}",
            ordered.len(),
            previous.id,
            target_date
        );

        for movement in ordered {
            let date = movement.normalized_date();
            if date != target_date {
                return Err(CalculatorError::DateMismatch {
                    movement_id: movement.id.clone(),
                    movement_date: date,
                    snapshot_date: target_date,
                }
                .into());
            }
            if movement.currency != state.currency {
                return Err(CalculatorError::InvalidMovement(format!(
                    "Movement {} in {} applied to {} snapshot {}",
                    movement.id, movement.currency, state.currency, state.id
                ))
                .into());
            }

            match &movement.details {
                MovementDetails::StockTrade(trade) => {
                    self.handle_stock_trade(&mut state, movement, trade, &mut stats)?
                }
                MovementDetails::OptionTrade(trade) => {
                    self.handle_option_trade(&mut state, movement, trade, &mut stats)?
                }
                MovementDetails::Dividend(dividend) => {
                    state.total_dividends += dividend.amount;
                    state.cash_balance += dividend.amount;
                }
                MovementDetails::DividendTax(tax) => {
                    let withheld = tax.amount.abs();
                    state.total_dividend_taxes += withheld;
                    state.cash_balance -= withheld;
                }
                MovementDetails::CashMovement(cash) => match cash.direction {
                    CashDirection::Deposit => {
                        state.total_deposited += cash.amount;
                        state.cash_balance += cash.amount;
                    }
                    CashDirection::Withdrawal => {
                        state.total_withdrawn += cash.amount;
                        state.cash_balance -= cash.amount;
                    }
                },
            }

            state.movement_count += 1;
            stats.applied += 1;
        }

        refresh_position_totals(&mut state);
        Ok(DayApplication {
            snapshot: state,
            stats,
        })
    }

    fn handle_stock_trade(
        &self,
        state: &mut FinancialSnapshot,
        movement: &Movement,
        trade: &StockTrade,
        stats: &mut FillStats,
    ) -> Result<()> {
        let instrument = Instrument::Stock {
            ticker: trade.ticker.clone(),
        };
        let gross = trade.quantity * trade.price;
        let (cash_value, opening_direction) = match trade.side {
            TradeSide::Buy => {
                state.cash_balance -= gross + trade.fees;
                (gross + trade.fees, PositionDirection::Long)
            }
            TradeSide::Sell => {
                state.cash_balance += gross - trade.fees;
                (gross - trade.fees, PositionDirection::Short)
            }
        };

        let mut remaining = trade.quantity;
        let key = instrument.key();

        let closes_existing = state
            .positions
            .get(&key)
            .map(|p| p.direction == opening_direction.opposite())
            .unwrap_or(false);

        if closes_existing {
            if let Some(position) = state.positions.get_mut(&key) {
                let to_close = remaining.min(position.quantity);
                let close_value = cash_value * to_close / trade.quantity;
                let relief = position.close_fifo(to_close, close_value)?;
                state.realized_gains += relief.realized_gain;
                remaining -= relief.closed_quantity;
                stats.closing_fills += 1;
                debug!(
                    "Stock {} closed {} units of {}, realized {}",
                    movement.id, relief.closed_quantity, key, relief.realized_gain
                );
                if position.is_empty() {
                    state.positions.remove(&key);
                }
            }
        }

        if remaining > Decimal::ZERO {
            // Overfill flips the position: the rest opens in the trade's direction.
            let lot_value = if remaining == trade.quantity {
                cash_value
            } else {
                cash_value * remaining / trade.quantity
            };
            if opening_direction == PositionDirection::Long {
                state.total_invested += lot_value;
            }
            let lot = Lot {
                id: movement.id.clone(),
                opened_at: movement.executed_at,
                quantity: remaining,
                cost_basis: lot_value,
                commitment: lot_value,
            };
            self.open_lot(state, movement, instrument, opening_direction, Decimal::ONE, lot)?;
            stats.opening_fills += 1;
        }

        Ok(())
    }

    fn handle_option_trade(
        &self,
        state: &mut FinancialSnapshot,
        movement: &Movement,
        trade: &OptionTrade,
        stats: &mut FillStats,
    ) -> Result<()> {
        let instrument = Instrument::Option {
            underlying: trade.underlying.clone(),
            option_type: trade.option_type,
            strike: trade.strike,
            expiration: trade.expiration,
        };
        let key = instrument.key();
        let premium = if trade.action == OptionAction::Expire {
            Decimal::ZERO
        } else {
            trade.net_premium.abs()
        };

        match trade.action {
            action if action.is_opening() => {
                let direction = if action == OptionAction::SellToOpen {
                    state.cash_balance += premium;
                    PositionDirection::Short
                } else {
                    state.cash_balance -= premium;
                    PositionDirection::Long
                };

                let mut remaining = trade.quantity;
                if let Some(position) = state
                    .positions
                    .get_mut(&key)
                    .filter(|p| p.direction == direction.opposite())
                {
                    let to_close = remaining.min(position.quantity);
                    let close_value = premium * to_close / trade.quantity;
                    let relief = position.close_fifo(to_close, close_value)?;
                    state.realized_gains += relief.realized_gain;
                    remaining -= relief.closed_quantity;
                    stats.closing_fills += 1;
                    debug!(
                        "Option {} opening against {} closed {} contracts, realized {}",
                        movement.id, key, relief.closed_quantity, relief.realized_gain
                    );
                    if position.is_empty() {
                        state.positions.remove(&key);
                    }
                }

                if remaining > Decimal::ZERO {
                    let lot_premium = if remaining == trade.quantity {
                        premium
                    } else {
                        premium * remaining / trade.quantity
                    };
                    let commitment = match direction {
                        PositionDirection::Short => trade.strike * trade.multiplier * remaining,
                        PositionDirection::Long => {
                            state.total_invested += lot_premium;
                            lot_premium
                        }
                    };
                    let lot = Lot {
                        id: movement.id.clone(),
                        opened_at: movement.executed_at,
                        quantity: remaining,
                        cost_basis: lot_premium,
                        commitment,
                    };
                    self.open_lot(state, movement, instrument, direction, trade.multiplier, lot)?;
                    stats.opening_fills += 1;
                }
            }
            _ => {
                let expected = match trade.action {
                    OptionAction::BuyToClose => Some(PositionDirection::Short),
                    OptionAction::SellToClose => Some(PositionDirection::Long),
                    _ => None,
                };
                match trade.action {
                    OptionAction::BuyToClose => state.cash_balance -= premium,
                    OptionAction::SellToClose => state.cash_balance += premium,
                    _ => {}
                }
                stats.closing_fills += 1;

                let Some(position) = state.positions.get_mut(&key) else {
                    warn!(
                        "Option {} closes {} but nothing is open; cash booked, no gain realized",
                        movement.id, key
                    );
                    return Ok(());
                };
                if let Some(direction) = expected {
                    if position.direction != direction {
                        return Err(CalculatorError::InvalidMovement(format!(
                            "{:?} on {} which is open {:?}",
                            trade.action, key, position.direction
                        ))
                        .into());
                    }
                }
                let relief = position.close_fifo(trade.quantity, premium)?;
                state.realized_gains += relief.realized_gain;
                debug!(
                    "Option {} closed {} contracts of {}, realized {}",
                    movement.id, relief.closed_quantity, key, relief.realized_gain
                );
                if position.is_empty() {
                    state.positions.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn open_lot(
        &self,
        state: &mut FinancialSnapshot,
        movement: &Movement,
        instrument: Instrument,
        direction: PositionDirection,
        multiplier: Decimal,
        lot: Lot,
    ) -> Result<()> {
        let key = instrument.key();
        let position = state.positions.entry(key.clone()).or_insert_with(|| {
            OpenPosition::new(
                instrument,
                movement.currency.clone(),
                direction,
                multiplier,
                movement.executed_at,
            )
        });
        if position.direction != direction {
            return Err(CalculatorError::InvalidMovement(format!(
                "Movement {} opens {:?} on {} which is open {:?}",
                movement.id, direction, key, position.direction
            ))
            .into());
        }
        position.add_lot(lot, &movement.currency)?;

        refresh_position_totals(state);
        if state.open_exposure > state.capital_deployed {
            state.capital_deployed = state.open_exposure;
        }
        Ok(())
    }

    /// Sets unrealized gains from `prices` for `snapshot.snapshot_date`.
    /// Positions without a price are left out and logged.
    pub fn apply_valuation(&self, snapshot: &mut FinancialSnapshot, prices: &PriceTable) {
        let mut unrealized = Decimal::ZERO;
        let mut priced_cost = Decimal::ZERO;

        for position in snapshot.positions.values() {
            match prices.get(&position.key, &snapshot.currency, snapshot.snapshot_date) {
                Some(price) => {
                    let valuation = position.valuation(price);
                    unrealized += valuation.unrealized_gain;
                    priced_cost += valuation.cost_basis;
                }
                None => warn!(
                    "No price for {} ({}) on or before {}; excluded from unrealized gains",
                    position.key, snapshot.currency, snapshot.snapshot_date
                ),
            }
        }

        snapshot.unrealized_gains = unrealized;
        snapshot.unrealized_gains_pct = if priced_cost.is_zero() {
            Decimal::ZERO
        } else {
            unrealized / priced_cost * Decimal::ONE_HUNDRED
        };
    }
}

fn refresh_position_totals(state: &mut FinancialSnapshot) {
    state.total_cost_basis = state.positions.values().map(|p| p.total_cost_basis).sum();
    state.open_exposure = state.positions.values().map(|p| p.total_commitment).sum();
}
