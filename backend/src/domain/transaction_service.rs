use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::{TransactionKind, TransactionRecord};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::errors::RecordValidationError;
use super::recompute_queue::RecomputeQueue;
use crate::storage::{Connection, TransactionStorage};

/// Entry point for transaction mutations.
///
/// Writes go to storage first and their errors reach the caller. Each
/// successful write schedules a background recompute of every ledger day it
/// touched; those recomputes never report back.
#[derive(Clone)]
pub struct TransactionService<C: Connection> {
    transaction_repository: C::TransactionRepository,
    recompute_queue: RecomputeQueue<C>,
}

impl<C: Connection> TransactionService<C> {
    pub fn new(connection: Arc<C>, recompute_queue: RecomputeQueue<C>) -> Self {
        let transaction_repository = connection.create_transaction_repository();
        Self {
            transaction_repository,
            recompute_queue,
        }
    }

    pub async fn record_transaction(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        validate_record(&record)?;
        self.transaction_repository.store_transaction(&record).await?;
        info!("Recorded {} on {}", record.id(), record.date());

        self.schedule_recompute(record.ledger_days());
        Ok(record)
    }

    /// Replace a stored record. Returns the previous version, or `None` when
    /// no record has that id. Days of both versions are recomputed.
    pub async fn update_transaction(&self, record: TransactionRecord) -> Result<Option<TransactionRecord>> {
        validate_record(&record)?;
        let previous = self.transaction_repository.update_transaction(&record).await?;

        match &previous {
            Some(previous) => {
                info!("Updated {} ({} -> {})", record.id(), previous.date(), record.date());
                let mut days = previous.ledger_days();
                days.extend(record.ledger_days());
                self.schedule_recompute(days);
            }
            None => warn!("Update of unknown record {}", record.id()),
        }
        Ok(previous)
    }

    pub async fn delete_transaction(&self, kind: TransactionKind, id: &str) -> Result<Option<TransactionRecord>> {
        let removed = self.transaction_repository.delete_transaction(kind, id).await?;
        match &removed {
            Some(record) => {
                info!("Deleted {} from {}", id, record.date());
                self.schedule_recompute(record.ledger_days());
            }
            None => warn!("Delete of unknown record {}", id),
        }
        Ok(removed)
    }

    pub async fn get_transaction(&self, kind: TransactionKind, id: &str) -> Result<Option<TransactionRecord>> {
        self.transaction_repository.get_transaction(kind, id).await
    }

    /// Earlier days are scheduled first so later days tend to read fresh carry-forwards
    fn schedule_recompute(&self, days: Vec<(String, NaiveDate)>) {
        let ordered: BTreeSet<(NaiveDate, String)> = days
            .into_iter()
            .map(|(project_id, date)| (date, project_id))
            .collect();

        for (date, project_id) in ordered {
            self.recompute_queue.trigger(&project_id, date);
        }
    }
}

/// Largest amount a single record may carry: one quadrillion
pub const MAX_RECORD_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

pub fn validate_record(record: &TransactionRecord) -> std::result::Result<(), RecordValidationError> {
    let kind = record.kind();
    if TransactionKind::from_id(record.id()).ok() != Some(kind) {
        return Err(RecordValidationError::MismatchedId(record.id().to_string(), kind.as_str()));
    }
    if record.project_ids().iter().any(|p| p.trim().is_empty()) {
        return Err(RecordValidationError::MissingProject);
    }

    let amounts: Vec<(&'static str, Decimal)> = match record {
        TransactionRecord::FundTransfer(t) => vec![("amount", t.amount)],
        TransactionRecord::WorkerAttendance(a) => {
            require_worker(&a.worker_id)?;
            vec![
                ("daily_wage", a.daily_wage),
                ("work_days", a.work_days),
                ("paid_amount", a.paid_amount),
            ]
        }
        TransactionRecord::MaterialPurchase(p) => vec![
            ("quantity", p.quantity),
            ("unit_price", p.unit_price),
            ("total_amount", p.total_amount),
        ],
        TransactionRecord::TransportationExpense(e) => vec![("amount", e.amount)],
        TransactionRecord::WorkerTransfer(t) => {
            require_worker(&t.worker_id)?;
            vec![("amount", t.amount)]
        }
        TransactionRecord::WorkerMiscExpense(e) => {
            require_worker(&e.worker_id)?;
            vec![("amount", e.amount)]
        }
        TransactionRecord::InterProjectTransfer(t) => vec![("amount", t.amount)],
    };

    for (field, value) in amounts {
        if value < Decimal::ZERO {
            return Err(RecordValidationError::NegativeAmount { field, value });
        }
        if value > MAX_RECORD_AMOUNT {
            return Err(RecordValidationError::AmountTooLarge { field, value });
        }
    }
    Ok(())
}

fn require_worker(worker_id: &str) -> std::result::Result<(), RecordValidationError> {
    if worker_id.trim().is_empty() {
        return Err(RecordValidationError::MissingWorker);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::domain::RecomputeService;
    use crate::storage::test_utils::*;
    use crate::storage::{DbConnection, SummaryRepository, SummaryStorage};
    use shared::DailySummary;
    use std::time::Duration;

    async fn create_test_service() -> (TransactionService<DbConnection>, SummaryRepository, DbConnection) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let connection = Arc::new(db.clone());
        let queue = RecomputeQueue::new(RecomputeService::new(connection.clone(), &LedgerConfig::default()));
        (
            TransactionService::new(connection, queue),
            SummaryRepository::new(db.clone()),
            db,
        )
    }

    /// Poll until the background recompute has written the expected remaining balance
    async fn wait_for_remaining(summaries: &SummaryRepository, project_id: &str, day: NaiveDate, expected: &str) -> DailySummary {
        for _ in 0..100 {
            if let Some(summary) = summaries.get_summary(project_id, day).await.unwrap() {
                if summary.remaining_balance == dec(expected) {
                    return summary;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("summary for {} on {} never reached {}", project_id, day, expected);
    }

    #[tokio::test]
    async fn test_record_triggers_recompute() {
        let (service, summaries, _db) = create_test_service().await;
        let day = date("2025-03-01");

        service.record_transaction(fund_transfer("site-a", day, "10000")).await.unwrap();
        wait_for_remaining(&summaries, "site-a", day, "10000").await;

        service.record_transaction(cash_purchase("site-a", day, "1500")).await.unwrap();
        let summary = wait_for_remaining(&summaries, "site-a", day, "8500").await;
        assert_eq!(summary.total_material_costs, dec("1500"));
    }

    #[tokio::test]
    async fn test_project_transfer_recomputes_both_projects() {
        let (service, summaries, _db) = create_test_service().await;
        let day = date("2025-03-01");

        service.record_transaction(project_transfer("site-b", "site-a", day, "400")).await.unwrap();

        wait_for_remaining(&summaries, "site-a", day, "400").await;
        wait_for_remaining(&summaries, "site-b", day, "-400").await;
    }

    #[tokio::test]
    async fn test_moving_a_record_recomputes_both_dates() {
        let (service, summaries, _db) = create_test_service().await;
        let day1 = date("2025-03-01");
        let day2 = date("2025-03-02");

        let record = service.record_transaction(transportation("site-a", day1, "300")).await.unwrap();
        wait_for_remaining(&summaries, "site-a", day1, "-300").await;

        let TransactionRecord::TransportationExpense(mut moved) = record else {
            unreachable!()
        };
        moved.date = day2;
        let previous = service
            .update_transaction(TransactionRecord::TransportationExpense(moved))
            .await
            .unwrap();
        assert_eq!(previous.map(|p| p.date()), Some(day1));

        wait_for_remaining(&summaries, "site-a", day1, "0").await;
        let day2_summary = wait_for_remaining(&summaries, "site-a", day2, "-300").await;
        assert_eq!(day2_summary.total_transportation_costs, dec("300"));
    }

    #[tokio::test]
    async fn test_delete_recomputes_day() {
        let (service, summaries, _db) = create_test_service().await;
        let day = date("2025-03-01");

        let record = service.record_transaction(fund_transfer("site-a", day, "75")).await.unwrap();
        wait_for_remaining(&summaries, "site-a", day, "75").await;

        let removed = service.delete_transaction(record.kind(), record.id()).await.unwrap();
        assert!(removed.is_some());
        wait_for_remaining(&summaries, "site-a", day, "0").await;

        assert!(service.get_transaction(record.kind(), record.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_record_is_not_an_error() {
        let (service, _summaries, _db) = create_test_service().await;
        let record = fund_transfer("site-a", date("2025-03-01"), "10");

        assert!(service.update_transaction(record.clone()).await.unwrap().is_none());
        assert!(service.delete_transaction(record.kind(), record.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_reaches_caller() {
        let (service, _summaries, db) = create_test_service().await;
        sqlx::query("DROP TABLE fund_transfers").execute(db.pool()).await.unwrap();

        let result = service.record_transaction(fund_transfer("site-a", date("2025-03-01"), "10")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_recompute_failure_stays_hidden() {
        let (service, _summaries, db) = create_test_service().await;
        sqlx::query("DROP TABLE daily_summaries").execute(db.pool()).await.unwrap();

        let result = service.record_transaction(fund_transfer("site-a", date("2025-03-01"), "10")).await;
        assert!(result.is_ok());
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_invalid_record_is_not_stored() {
        let (service, _summaries, _db) = create_test_service().await;
        let record = fund_transfer("site-a", date("2025-03-01"), "-5");

        let err = service.record_transaction(record.clone()).await.unwrap_err();
        assert!(err.to_string().contains("amount cannot be negative"));
        assert!(service.get_transaction(record.kind(), record.id()).await.unwrap().is_none());
    }

    #[test]
    fn test_validate_record() {
        let day = date("2025-03-01");
        assert!(validate_record(&attendance("site-a", "w1", day, "200", "0.5", "0")).is_ok());
        assert_eq!(
            validate_record(&attendance("site-a", " ", day, "200", "1", "0")),
            Err(RecordValidationError::MissingWorker)
        );
        assert_eq!(
            validate_record(&transportation("", day, "10")),
            Err(RecordValidationError::MissingProject)
        );

        let TransactionRecord::FundTransfer(mut transfer) = fund_transfer("site-a", day, "10") else {
            unreachable!()
        };
        transfer.id = TransactionKind::WorkerTransfer.generate_id();
        assert!(matches!(
            validate_record(&TransactionRecord::FundTransfer(transfer)),
            Err(RecordValidationError::MismatchedId(_, "fund_transfer"))
        ));
    }

    #[test]
    fn test_validate_record_bounds_amounts() {
        let day = date("2025-03-01");
        assert_eq!(MAX_RECORD_AMOUNT, dec("1000000000000000"));
        assert!(validate_record(&fund_transfer("site-a", day, "1000000000000000")).is_ok());
        assert_eq!(
            validate_record(&fund_transfer("site-a", day, "1000000000000000.01")),
            Err(RecordValidationError::AmountTooLarge {
                field: "amount",
                value: dec("1000000000000000.01"),
            })
        );
        assert_eq!(
            validate_record(&transportation("site-a", day, "-1")),
            Err(RecordValidationError::NegativeAmount {
                field: "amount",
                value: dec("-1"),
            })
        );
    }
}
