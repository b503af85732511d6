pub mod summary_repository;
pub mod transaction_repository;

pub use summary_repository::SummaryRepository;
pub use transaction_repository::TransactionRepository;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// Calendar days are stored as ISO text so they sort lexically
const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn date_param(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn date_column(row: &SqliteRow, column: &str) -> Result<NaiveDate> {
    let raw: String = row.try_get(column)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .with_context(|| format!("Invalid date in column {}: {}", column, raw))
}

pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).with_context(|| format!("Invalid decimal in column {}: {}", column, raw))
}
