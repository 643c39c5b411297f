//! Helpers for keeping multi-row statements under SQLite's bind limit.

use chrono::NaiveDate;

use crate::errors::corrupt;
use snapledger_core::constants::DATE_FORMAT;
use snapledger_core::Result;

/// Bind parameters allowed per statement by the oldest SQLite builds.
pub const SQLITE_MAX_BIND_PARAMS: usize = 999;

/// Splits rows so that one multi-row INSERT of `columns_per_row` columns never
/// exceeds [`SQLITE_MAX_BIND_PARAMS`].
pub fn chunk_rows<T>(rows: &[T], columns_per_row: usize) -> impl Iterator<Item = &[T]> {
    let per_statement = (SQLITE_MAX_BIND_PARAMS / columns_per_row.max(1)).max(1);
    rows.chunks(per_statement)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(table: &'static str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| corrupt(table, format!("date '{}': {}", raw, e)))
}
