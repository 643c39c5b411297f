pub mod cancel;
pub mod time_utils;

pub use cancel::*;
pub use time_utils::*;
