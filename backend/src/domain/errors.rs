use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors the recompute paths surface to their callers
#[derive(Debug, Error)]
pub enum LedgerError {
    /// `income - expenses` does not match the remaining balance. Never persisted.
    #[error(
        "Ledger invariant violated for project {project_id} on {date}: \
         income {total_income} - expenses {total_expenses} != remaining {remaining_balance}"
    )]
    InvariantViolation {
        project_id: String,
        date: NaiveDate,
        total_income: Decimal,
        total_expenses: Decimal,
        remaining_balance: Decimal,
    },
    /// A day's sums leave the range `Decimal` can represent
    #[error("Amounts for project {project_id} on {date} overflow the decimal range")]
    AmountOverflow { project_id: String, date: NaiveDate },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, LedgerError::InvariantViolation { .. })
    }
}

/// Rejections of a transaction record before it reaches storage
#[derive(Debug, Error, PartialEq)]
pub enum RecordValidationError {
    #[error("Record id {0} does not belong to a {1}")]
    MismatchedId(String, &'static str),
    #[error("Project id cannot be empty")]
    MissingProject,
    #[error("Worker id cannot be empty")]
    MissingWorker,
    #[error("{field} cannot be negative, got {value}")]
    NegativeAmount { field: &'static str, value: Decimal },
    #[error("{field} exceeds the largest accepted amount, got {value}")]
    AmountTooLarge { field: &'static str, value: Decimal },
}
