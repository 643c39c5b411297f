//! Financial snapshots - per-day, per-currency account state and the FIFO position book.

mod positions_model;
pub mod snapshot_calculator;
mod snapshot_model;
mod snapshot_traits;

pub use positions_model::*;
pub use snapshot_calculator::*;
pub use snapshot_model::*;
pub use snapshot_traits::*;
