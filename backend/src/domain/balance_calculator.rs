//! Aggregation of one project's transactions on one calendar day.
//!
//! Two rules are ledger policy:
//!
//! - material purchases count only when cash-settled; credit purchases are
//!   payables and stay out of the day's expenses
//! - wages count what was actually paid that day, not what was earned
//!
//! A category whose read fails is logged and counted as zero so one broken
//! source cannot block the rest of the report. Sums that leave the decimal
//! range fail the day with `LedgerError::AmountOverflow`.

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::{CategoryTotals, InterProjectTransfer};
use tracing::{debug, error};

use super::errors::{LedgerError, LedgerResult};
use crate::storage::TransactionStorage;

#[derive(Clone)]
pub struct BalanceCalculator<T: TransactionStorage> {
    transactions: T,
}

impl<T: TransactionStorage> BalanceCalculator<T> {
    pub fn new(transactions: T) -> Self {
        Self { transactions }
    }

    /// Sum every category for exactly `date`. Unreadable categories are zero;
    /// only an overflowing sum is an error.
    pub async fn compute_daily_totals(&self, project_id: &str, date: NaiveDate) -> LedgerResult<CategoryTotals> {
        let repo = &self.transactions;
        let (fund_transfers, attendance, purchases, transportation, worker_transfers, misc_expenses, project_transfers) = tokio::join!(
            repo.list_fund_transfers(project_id, date),
            repo.list_attendance(project_id, date),
            repo.list_material_purchases(project_id, date),
            repo.list_transportation_expenses(project_id, date),
            repo.list_worker_transfers(project_id, date),
            repo.list_worker_misc_expenses(project_id, date),
            repo.list_project_transfers(project_id, date),
        );

        let overflow = || LedgerError::AmountOverflow {
            project_id: project_id.to_string(),
            date,
        };

        let (incoming_project_transfers, outgoing_project_transfers) = match project_transfers {
            Ok(rows) => split_project_transfers(project_id, &rows).ok_or_else(overflow)?,
            Err(e) => {
                log_degraded("inter-project transfers", project_id, date, &e);
                (Decimal::ZERO, Decimal::ZERO)
            }
        };

        let totals = CategoryTotals {
            fund_transfers: sum_or_zero("fund transfers", project_id, date, fund_transfers, |r| r.amount)
                .ok_or_else(overflow)?,
            worker_wages: sum_or_zero("worker wages", project_id, date, attendance, |r| r.paid_amount)
                .ok_or_else(overflow)?,
            material_costs: sum_or_zero("material purchases", project_id, date, purchases, |r| {
                if r.is_cash_settled() {
                    r.total_amount
                } else {
                    Decimal::ZERO
                }
            })
            .ok_or_else(overflow)?,
            transportation: sum_or_zero("transportation", project_id, date, transportation, |r| r.amount)
                .ok_or_else(overflow)?,
            worker_transfers: sum_or_zero("worker transfers", project_id, date, worker_transfers, |r| r.amount)
                .ok_or_else(overflow)?,
            worker_misc_expenses: sum_or_zero("worker misc expenses", project_id, date, misc_expenses, |r| r.amount)
                .ok_or_else(overflow)?,
            incoming_project_transfers,
            outgoing_project_transfers,
        };

        debug!("Daily totals for project {} on {}: {:?}", project_id, date, totals);
        Ok(totals)
    }
}

/// `None` only when the sum overflows
fn sum_or_zero<R>(
    category: &str,
    project_id: &str,
    date: NaiveDate,
    rows: Result<Vec<R>>,
    amount: impl Fn(&R) -> Decimal,
) -> Option<Decimal> {
    match rows {
        Ok(rows) => rows.iter().map(amount).try_fold(Decimal::ZERO, Decimal::checked_add),
        Err(e) => {
            log_degraded(category, project_id, date, &e);
            Some(Decimal::ZERO)
        }
    }
}

fn log_degraded(category: &str, project_id: &str, date: NaiveDate, e: &anyhow::Error) {
    error!(
        "Failed to read {} for project {} on {}, counting it as zero: {:#}",
        category, project_id, date, e
    );
}

/// (incoming, outgoing) for the project. A self-transfer counts on both sides.
fn split_project_transfers(project_id: &str, transfers: &[InterProjectTransfer]) -> Option<(Decimal, Decimal)> {
    transfers.iter().try_fold((Decimal::ZERO, Decimal::ZERO), |(incoming, outgoing), t| {
        let incoming = if t.to_project_id == project_id { incoming.checked_add(t.amount)? } else { incoming };
        let outgoing = if t.from_project_id == project_id { outgoing.checked_add(t.amount)? } else { outgoing };
        Some((incoming, outgoing))
    })
}
