pub mod price_model;
pub mod price_traits;

pub use price_model::*;
pub use price_traits::*;
