use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use shared::{WorkerAttendance, WorkerBalance, WorkerTransfer};
use std::sync::Arc;
use tracing::info;

use crate::storage::{Connection, TransactionStorage};

/// Read-model of what each worker is owed. Always computed from history, never stored.
#[derive(Clone)]
pub struct WorkerBalanceService<C: Connection> {
    transaction_repository: C::TransactionRepository,
}

impl<C: Connection> WorkerBalanceService<C> {
    pub fn new(connection: Arc<C>) -> Self {
        let transaction_repository = connection.create_transaction_repository();
        Self { transaction_repository }
    }

    pub async fn get_worker_balance(&self, worker_id: &str, project_id: &str) -> Result<WorkerBalance> {
        let (attendance, transfers) = tokio::try_join!(
            self.transaction_repository.list_worker_attendance_history(worker_id, project_id),
            self.transaction_repository.list_worker_transfer_history(worker_id, project_id),
        )?;

        project_worker_balance(worker_id, project_id, &attendance, &transfers)
            .ok_or_else(|| anyhow!("Balance of worker {} on project {} overflows the decimal range", worker_id, project_id))
    }

    /// One balance per worker with attendance or transfers on the project, ordered by worker id
    pub async fn list_project_worker_balances(&self, project_id: &str) -> Result<Vec<WorkerBalance>> {
        let workers = self.transaction_repository.list_project_workers(project_id).await?;
        info!("Computing balances for {} workers on project {}", workers.len(), project_id);

        let mut balances = Vec::with_capacity(workers.len());
        for worker_id in &workers {
            balances.push(self.get_worker_balance(worker_id, project_id).await?);
        }
        Ok(balances)
    }
}

/// `None` if any sum leaves the decimal range
fn project_worker_balance(
    worker_id: &str,
    project_id: &str,
    attendance: &[WorkerAttendance],
    transfers: &[WorkerTransfer],
) -> Option<WorkerBalance> {
    let total_earned = attendance
        .iter()
        .try_fold(Decimal::ZERO, |sum, a| sum.checked_add(a.actual_wage()?))?;
    let total_paid = checked_sum(attendance.iter().map(|a| a.paid_amount))?;
    let total_transferred = checked_sum(transfers.iter().map(|t| t.amount))?;

    Some(WorkerBalance {
        worker_id: worker_id.to_string(),
        project_id: project_id.to_string(),
        total_earned,
        total_paid,
        total_transferred,
        current_balance: total_earned.checked_sub(total_paid)?.checked_sub(total_transferred)?,
    })
}

fn checked_sum(mut amounts: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    amounts.try_fold(Decimal::ZERO, Decimal::checked_add)
}
