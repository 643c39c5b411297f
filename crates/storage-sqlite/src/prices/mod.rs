//! SQLite storage for closing prices.

mod repository;

pub use repository::{PriceDB, PriceRepository};

pub use snapledger_core::prices::PriceCacheTrait;
