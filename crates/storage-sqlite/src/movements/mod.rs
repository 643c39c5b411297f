//! SQLite storage for movements.

mod model;
mod repository;

pub use model::MovementDB;
pub(crate) use model::format_instant;
pub(crate) use repository::{insert_movement_rows, to_rows};
pub use repository::MovementRepository;

pub use snapledger_core::movements::MovementRepositoryTrait;
