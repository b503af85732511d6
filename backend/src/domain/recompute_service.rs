//! Recompute orchestration for daily summaries.
//!
//! This service owns every write to the summary store. A single-date
//! recompute reads the previous day's persisted remaining balance, totals the
//! day's transactions, checks the ledger invariant and upserts the row.
//!
//! A full-history repair rebuilds a project in ascending date order:
//!
//! 1. Collapse duplicate rows so every date has at most one summary
//! 2. Collect the dates to rebuild (summary dates, optionally transaction dates)
//! 3. Delete every summary of the project
//! 4. Recompute each date ascending, so each day reads the row written just before it
//!
//! All writes for a project hold that project's write lock, so a repair and a
//! background recompute of the same project never interleave.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{CategoryTotals, DailySummary, DateFailure, RepairReport};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::balance_calculator::BalanceCalculator;
use super::carry_forward::CarryForwardResolver;
use super::errors::{LedgerError, LedgerResult};
use super::write_locks::ProjectWriteLocks;
use crate::config::{LedgerConfig, RepairConfig};
use crate::storage::{Connection, SummaryStorage, TransactionStorage};

#[derive(Clone)]
pub struct RecomputeService<C: Connection> {
    transaction_repository: C::TransactionRepository,
    summary_repository: C::SummaryRepository,
    calculator: BalanceCalculator<C::TransactionRepository>,
    carry_forward: CarryForwardResolver<C::SummaryRepository>,
    write_locks: ProjectWriteLocks,
    invariant_tolerance: Decimal,
    repair: RepairConfig,
}

impl<C: Connection> RecomputeService<C> {
    pub fn new(connection: Arc<C>, config: &LedgerConfig) -> Self {
        let transaction_repository = connection.create_transaction_repository();
        let summary_repository = connection.create_summary_repository();
        Self {
            calculator: BalanceCalculator::new(transaction_repository.clone()),
            carry_forward: CarryForwardResolver::new(summary_repository.clone()),
            transaction_repository,
            summary_repository,
            write_locks: ProjectWriteLocks::new(),
            invariant_tolerance: config.invariant_tolerance,
            repair: config.repair.clone(),
        }
    }

    /// Recompute and persist the summary of one day
    pub async fn recompute_date(&self, project_id: &str, date: NaiveDate) -> LedgerResult<DailySummary> {
        let _guard = self.write_locks.acquire(project_id).await;
        self.summary_repository.collapse_duplicate_summaries(project_id).await?;
        self.recompute_date_locked(project_id, date).await
    }

    async fn recompute_date_locked(&self, project_id: &str, date: NaiveDate) -> LedgerResult<DailySummary> {
        let summary = self.compute_daily_summary(project_id, date).await?;
        let stored = self.summary_repository.upsert_summary(&summary).await?;
        info!(
            "Recomputed project {} on {}: carried {}, income {}, expenses {}, remaining {}",
            project_id,
            date,
            stored.carried_forward_amount,
            stored.total_income,
            stored.total_expenses,
            stored.remaining_balance
        );
        Ok(stored)
    }

    /// The summary for one day as it would be persisted, without writing it
    pub async fn compute_daily_summary(&self, project_id: &str, date: NaiveDate) -> LedgerResult<DailySummary> {
        let opening_balance = self.carry_forward.resolve_opening_balance(project_id, date).await?;
        let totals = self.calculator.compute_daily_totals(project_id, date).await?;
        let summary = build_summary(project_id, date, opening_balance, &totals, Utc::now())?;
        check_invariant(&summary, self.invariant_tolerance)?;
        Ok(summary)
    }

    /// The persisted summary if there is one, otherwise the on-the-fly figures
    pub async fn get_daily_summary(&self, project_id: &str, date: NaiveDate) -> LedgerResult<DailySummary> {
        match self.summary_repository.get_summary(project_id, date).await? {
            Some(summary) => Ok(summary),
            None => {
                debug!("No summary stored for project {} on {}, computing it", project_id, date);
                self.compute_daily_summary(project_id, date).await
            }
        }
    }

    pub async fn get_daily_totals(&self, project_id: &str, date: NaiveDate) -> LedgerResult<CategoryTotals> {
        self.calculator.compute_daily_totals(project_id, date).await
    }

    /// Remaining balance carried into `date`
    pub async fn opening_balance(&self, project_id: &str, date: NaiveDate) -> LedgerResult<Decimal> {
        Ok(self.carry_forward.resolve_opening_balance(project_id, date).await?)
    }

    /// The persisted summary of the closest earlier day
    pub async fn previous_summary(&self, project_id: &str, date: NaiveDate) -> LedgerResult<Option<DailySummary>> {
        Ok(self.carry_forward.previous_summary(project_id, date).await?)
    }

    pub async fn list_daily_summaries(
        &self,
        project_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<DailySummary>> {
        Ok(self.summary_repository.list_summaries(project_id, start_date, end_date).await?)
    }

    /// Rebuild every summary of the project from its transactions.
    ///
    /// Errors before the replay starts are returned. A date that fails during
    /// the replay stops the walk; it and every later date are listed as failures.
    pub async fn recompute_project_history(&self, project_id: &str) -> LedgerResult<RepairReport> {
        let _guard = self.write_locks.acquire(project_id).await;
        info!("Starting full-history repair for project {}", project_id);

        let mut report = RepairReport::new(project_id);
        report.duplicates_removed = self.summary_repository.collapse_duplicate_summaries(project_id).await?;

        let mut dates = self.summary_repository.list_summary_dates(project_id).await?;
        if self.repair.include_transaction_dates {
            dates.extend(self.transaction_repository.list_transaction_dates(project_id).await?);
            dates.sort();
            dates.dedup();
        }

        let removed = self.summary_repository.delete_project_summaries(project_id).await?;
        info!(
            "Deleted {} summaries of project {}, replaying {} dates",
            removed,
            project_id,
            dates.len()
        );

        let mut remaining = dates.into_iter();
        while let Some(date) = remaining.next() {
            match self.recompute_date_locked(project_id, date).await {
                Ok(_) => report.recomputed.push(date),
                Err(e) => {
                    error!("Repair of project {} failed on {}: {}", project_id, date, e);
                    report.failures.push(DateFailure {
                        date,
                        reason: e.to_string(),
                    });
                    for skipped in remaining.by_ref() {
                        report.failures.push(DateFailure {
                            date: skipped,
                            reason: format!("skipped, earlier date {} failed", date),
                        });
                    }
                }
            }
        }

        if report.is_success() {
            info!(
                "Repaired project {}: {} dates recomputed",
                project_id,
                report.recomputed.len()
            );
        } else {
            warn!(
                "Repair of project {} incomplete: {} recomputed, {} failed or skipped",
                project_id,
                report.recomputed.len(),
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Repair every project that has summaries, several projects at a time
    pub async fn recompute_all_projects(&self) -> LedgerResult<BTreeMap<String, LedgerResult<RepairReport>>> {
        let projects = self.summary_repository.list_projects().await?;
        info!(
            "Repairing {} projects, {} at a time",
            projects.len(),
            self.repair.concurrency
        );

        let permits = Arc::new(Semaphore::new(self.repair.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for project_id in projects {
            let service = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = service.recompute_project_history(&project_id).await;
                (project_id, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((project_id, result)) => {
                    results.insert(project_id, result);
                }
                Err(e) => error!("Repair task ended abnormally: {}", e),
            }
        }
        Ok(results)
    }

    /// Report every persisted row that breaks the invariant and every
    /// consecutive pair that breaks the carry-forward chain. Empty means healthy.
    pub async fn validate_project_chain(&self, project_id: &str) -> LedgerResult<Vec<String>> {
        info!("Validating summary chain for project {}", project_id);
        let summaries = self.summary_repository.list_summaries(project_id, None, None).await?;

        let mut errors = Vec::new();
        let mut expected_opening = Decimal::ZERO;
        let mut previous_date: Option<NaiveDate> = None;

        for summary in &summaries {
            if !within_tolerance(summary, self.invariant_tolerance) {
                errors.push(format!(
                    "{}: income {} - expenses {} != remaining {}",
                    summary.date, summary.total_income, summary.total_expenses, summary.remaining_balance
                ));
            }
            if summary.carried_forward_amount != expected_opening {
                let source = previous_date
                    .map(|d| format!("remaining balance of {}", d))
                    .unwrap_or_else(|| "zero for the first day".to_string());
                errors.push(format!(
                    "{}: carried forward {} but expected {} ({})",
                    summary.date, summary.carried_forward_amount, expected_opening, source
                ));
            }
            expected_opening = summary.remaining_balance;
            previous_date = Some(summary.date);
        }

        if errors.is_empty() {
            info!("All {} summaries are consistent for project {}", summaries.len(), project_id);
        } else {
            warn!("Found {} problems in the summary chain of project {}", errors.len(), project_id);
        }
        Ok(errors)
    }
}

/// Assemble a day's summary from its opening balance and category totals.
/// Inter-project transfers enter income as a net figure.
pub fn build_summary(
    project_id: &str,
    date: NaiveDate,
    opening_balance: Decimal,
    totals: &CategoryTotals,
    created_at: DateTime<Utc>,
) -> LedgerResult<DailySummary> {
    let overflow = || LedgerError::AmountOverflow {
        project_id: project_id.to_string(),
        date,
    };
    let total_income = totals
        .net_project_transfers()
        .and_then(|net| opening_balance.checked_add(totals.fund_transfers)?.checked_add(net))
        .ok_or_else(overflow)?;
    let total_expenses = totals.total_expenses().ok_or_else(overflow)?;
    let remaining_balance = total_income.checked_sub(total_expenses).ok_or_else(overflow)?;

    Ok(DailySummary {
        project_id: project_id.to_string(),
        date,
        carried_forward_amount: opening_balance,
        total_fund_transfers: totals.fund_transfers,
        total_worker_wages: totals.worker_wages,
        total_material_costs: totals.material_costs,
        total_transportation_costs: totals.transportation,
        total_worker_transfers: totals.worker_transfers,
        total_worker_misc_expenses: totals.worker_misc_expenses,
        total_incoming_project_transfers: totals.incoming_project_transfers,
        total_outgoing_project_transfers: totals.outgoing_project_transfers,
        total_income,
        total_expenses,
        remaining_balance,
        created_at,
    })
}

/// An imbalance too large to represent is outside any tolerance
fn within_tolerance(summary: &DailySummary, tolerance: Decimal) -> bool {
    matches!(summary.imbalance(), Some(gap) if gap < tolerance)
}

pub fn check_invariant(summary: &DailySummary, tolerance: Decimal) -> LedgerResult<()> {
    if within_tolerance(summary, tolerance) {
        return Ok(());
    }
    error!(
        "Refusing to persist summary for project {} on {}: imbalance {}",
        summary.project_id,
        summary.date,
        summary
            .imbalance()
            .map_or_else(|| "out of range".to_string(), |gap| gap.to_string())
    );
    Err(LedgerError::InvariantViolation {
        project_id: summary.project_id.clone(),
        date: summary.date,
        total_income: summary.total_income,
        total_expenses: summary.total_expenses,
        remaining_balance: summary.remaining_balance,
    })
}
