/// Decimal precision for persisted snapshot values
pub const DECIMAL_PRECISION: u32 = 6;

/// Quantity threshold for significant positions
pub const QUANTITY_THRESHOLD: &str = "0.00000001";

/// Contracts-to-shares multiplier for standard equity options
pub const DEFAULT_OPTION_MULTIPLIER: i64 = 100;

/// Default width, in calendar days, of one import chunk
pub const DEFAULT_CHUNK_DAYS: u32 = 30;

/// Date format used for ids and storage columns
pub const DATE_FORMAT: &str = "%Y-%m-%d";
