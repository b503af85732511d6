//! # Storage Module
//!
//! Persistence for the ledger: read access to the transaction categories and
//! the one table the ledger owns, `daily_summaries`.
//!
//! The domain layer depends only on the traits in [`traits`]; the SQLite
//! implementation lives in [`connection`] and [`repositories`].
//!
//! ## Current Implementation
//!
//! - **Primary Storage**: SQLite through SQLx, schema created on connect
//! - **Money**: decimal text columns, parsed into `rust_decimal::Decimal`
//! - **Dates**: ISO `YYYY-MM-DD` text, so lexical order is calendar order

pub mod connection;
pub mod repositories;
pub mod traits;

#[cfg(test)]
pub mod test_utils;

pub use connection::{DbConnection, WriteTransaction};
pub use repositories::{SummaryRepository, TransactionRepository};
pub use traits::{Connection, SummaryStorage, TransactionStorage};
