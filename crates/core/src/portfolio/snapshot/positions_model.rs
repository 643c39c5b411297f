use chrono::{DateTime, Utc};
use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::constants::QUANTITY_THRESHOLD;
use crate::errors::{CalculatorError, Result};
use crate::movements::Instrument;

pub fn is_quantity_significant(quantity: &Decimal) -> bool {
    let threshold =
        Decimal::from_str_radix(QUANTITY_THRESHOLD, 10).unwrap_or_else(|_| Decimal::new(1, 8));
    quantity.abs() >= threshold
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionDirection {
    Long,
    Short,
}

impl PositionDirection {
    pub fn opposite(&self) -> Self {
        match self {
            PositionDirection::Long => PositionDirection::Short,
            PositionDirection::Short => PositionDirection::Long,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    /// Id of the opening movement.
    pub id: String,
    pub opened_at: DateTime<Utc>,
    /// Units (shares or contracts), always positive.
    pub quantity: Decimal,
    /// Cash paid for a long lot or received for a short lot, fees included.
    pub cost_basis: Decimal,
    /// Capital tied up by the lot while it stays open.
    pub commitment: Decimal,
}

/// Outcome of closing part of a position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FifoRelief {
    pub closed_quantity: Decimal,
    pub cost_basis_released: Decimal,
    pub realized_gain: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionValuation {
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_gain: Decimal,
}

/// An open long or short position in one instrument, held as FIFO lots.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenPosition {
    pub key: String,
    pub instrument: Instrument,
    pub currency: String,
    pub direction: PositionDirection,
    /// Units per contract; 1 for stock.
    pub multiplier: Decimal,
    pub quantity: Decimal,
    pub total_cost_basis: Decimal,
    pub total_commitment: Decimal,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub lots: VecDeque<Lot>,
}

impl OpenPosition {
    pub fn new(
        instrument: Instrument,
        currency: impl Into<String>,
        direction: PositionDirection,
        multiplier: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        OpenPosition {
            key: instrument.key(),
            instrument,
            currency: currency.into(),
            direction,
            multiplier,
            quantity: Decimal::ZERO,
            total_cost_basis: Decimal::ZERO,
            total_commitment: Decimal::ZERO,
            opened_at,
            lots: VecDeque::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty() || !is_quantity_significant(&self.quantity)
    }

    pub fn recalculate_aggregates(&mut self) {
        self.quantity = self.lots.iter().map(|lot| lot.quantity).sum();
        self.total_cost_basis = self.lots.iter().map(|lot| lot.cost_basis).sum();
        self.total_commitment = self.lots.iter().map(|lot| lot.commitment).sum();
        if let Some(first) = self.lots.front() {
            self.opened_at = first.opened_at;
        }
    }

    /// Appends a lot. Lots are opened in application order so the queue stays FIFO.
    pub fn add_lot(&mut self, lot: Lot, movement_currency: &str) -> Result<()> {
        if self.currency != movement_currency {
            return Err(CalculatorError::CurrencyMismatch {
                position_key: self.key.clone(),
                position_currency: self.currency.clone(),
                movement_id: lot.id.clone(),
                movement_currency: movement_currency.to_string(),
            }
            .into());
        }
        if !lot.quantity.is_sign_positive() || lot.quantity.is_zero() {
            return Err(CalculatorError::InvalidMovement(format!(
                "Lot {} for {} has non-positive quantity {}",
                lot.id, self.key, lot.quantity
            ))
            .into());
        }
        self.lots.push_back(lot);
        self.recalculate_aggregates();
        Ok(())
    }

    /// Closes up to `quantity` units against the oldest lots first.
    ///
    /// `close_value` is the total cash of the closing fill for `quantity`
    /// units: paid to buy back a short, received when selling a long, zero on
    /// expiry. Any quantity beyond what is open is left for the caller.
    pub fn close_fifo(&mut self, quantity: Decimal, close_value: Decimal) -> Result<FifoRelief> {
        if !quantity.is_sign_positive() || quantity.is_zero() {
            return Err(CalculatorError::InvalidMovement(format!(
                "Close quantity for {} must be positive, got {}",
                self.key, quantity
            ))
            .into());
        }

        let mut relief = FifoRelief::default();
        let mut remaining = quantity;

        while remaining > Decimal::ZERO {
            let Some(lot) = self.lots.front_mut() else {
                break;
            };
            let take = remaining.min(lot.quantity);
            let basis_released = if take == lot.quantity {
                lot.cost_basis
            } else {
                lot.cost_basis * take / lot.quantity
            };
            let commitment_released = if take == lot.quantity {
                lot.commitment
            } else {
                lot.commitment * take / lot.quantity
            };
            let close_share = if take == quantity {
                close_value
            } else {
                close_value * take / quantity
            };

            relief.realized_gain += match self.direction {
                PositionDirection::Long => close_share - basis_released,
                PositionDirection::Short => basis_released - close_share,
            };
            relief.closed_quantity += take;
            relief.cost_basis_released += basis_released;
            remaining -= take;

            let left = lot.quantity - take;
            if left <= Decimal::ZERO || !is_quantity_significant(&left) {
                self.lots.pop_front();
            } else {
                lot.quantity = left;
                lot.cost_basis -= basis_released;
                lot.commitment -= commitment_released;
            }
        }

        if remaining > Decimal::ZERO && is_quantity_significant(&remaining) {
            warn!(
                "Close of {} units on {} exceeded open quantity; {} units unmatched",
                quantity, self.key, remaining
            );
        }

        self.recalculate_aggregates();
        Ok(relief)
    }

    /// Values the open quantity at `price` per underlying unit.
    pub fn valuation(&self, price: Decimal) -> PositionValuation {
        let market_value = price * self.quantity.abs() * self.multiplier;
        let cost_basis = self.total_cost_basis;
        let unrealized_gain = match self.direction {
            PositionDirection::Long => market_value - cost_basis,
            PositionDirection::Short => cost_basis - market_value,
        };
        PositionValuation {
            market_value,
            cost_basis,
            unrealized_gain,
        }
    }
}
