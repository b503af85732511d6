//! # Storage Traits
//!
//! Storage abstractions the ledger services are written against, so the
//! domain layer never sees SQL and tests can run against any backend.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    DailySummary, FundTransfer, InterProjectTransfer, MaterialPurchase, TransactionKind,
    TransactionRecord, TransportationExpense, WorkerAttendance, WorkerMiscExpense,
    WorkerTransfer,
};

/// Typed access to the transaction categories the ledger aggregates.
///
/// The ledger itself only reads; the write methods exist for the mutation
/// path in `TransactionService`.
#[async_trait]
pub trait TransactionStorage: Send + Sync {
    /// Store a new transaction record
    async fn store_transaction(&self, record: &TransactionRecord) -> Result<()>;

    /// Retrieve a record by kind and ID
    async fn get_transaction(&self, kind: TransactionKind, id: &str) -> Result<Option<TransactionRecord>>;

    /// Replace an existing record, returning the previous version (None if it did not exist)
    async fn update_transaction(&self, record: &TransactionRecord) -> Result<Option<TransactionRecord>>;

    /// Delete a record, returning it if it existed
    async fn delete_transaction(&self, kind: TransactionKind, id: &str) -> Result<Option<TransactionRecord>>;

    async fn list_fund_transfers(&self, project_id: &str, date: NaiveDate) -> Result<Vec<FundTransfer>>;

    async fn list_attendance(&self, project_id: &str, date: NaiveDate) -> Result<Vec<WorkerAttendance>>;

    /// All purchases of the day, cash and credit alike
    async fn list_material_purchases(&self, project_id: &str, date: NaiveDate) -> Result<Vec<MaterialPurchase>>;

    async fn list_transportation_expenses(&self, project_id: &str, date: NaiveDate) -> Result<Vec<TransportationExpense>>;

    async fn list_worker_transfers(&self, project_id: &str, date: NaiveDate) -> Result<Vec<WorkerTransfer>>;

    async fn list_worker_misc_expenses(&self, project_id: &str, date: NaiveDate) -> Result<Vec<WorkerMiscExpense>>;

    /// Inter-project transfers of the day where the project is either sender or receiver
    async fn list_project_transfers(&self, project_id: &str, date: NaiveDate) -> Result<Vec<InterProjectTransfer>>;

    /// Full attendance history of a worker on a project
    async fn list_worker_attendance_history(&self, worker_id: &str, project_id: &str) -> Result<Vec<WorkerAttendance>>;

    /// Full family-transfer history of a worker on a project
    async fn list_worker_transfer_history(&self, worker_id: &str, project_id: &str) -> Result<Vec<WorkerTransfer>>;

    /// Workers with any attendance or transfer on the project, ordered by ID
    async fn list_project_workers(&self, project_id: &str) -> Result<Vec<String>>;

    /// Distinct dates carrying any transaction for the project, ascending
    async fn list_transaction_dates(&self, project_id: &str) -> Result<Vec<NaiveDate>>;
}

/// Persistence of daily summaries, one row per (project, date)
#[async_trait]
pub trait SummaryStorage: Send + Sync {
    /// Overwrite the row for (project, date) in place, or insert it.
    /// Returns the row as stored; `created_at` of an existing row is kept.
    async fn upsert_summary(&self, summary: &DailySummary) -> Result<DailySummary>;

    async fn get_summary(&self, project_id: &str, date: NaiveDate) -> Result<Option<DailySummary>>;

    /// The most recent summary strictly before `date`
    async fn get_latest_summary_before(&self, project_id: &str, date: NaiveDate) -> Result<Option<DailySummary>>;

    /// Distinct summary dates for the project, ascending
    async fn list_summary_dates(&self, project_id: &str) -> Result<Vec<NaiveDate>>;

    /// Summaries in an inclusive date range, ascending
    async fn list_summaries(
        &self,
        project_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailySummary>>;

    /// Drop every summary of the project. Returns the number of rows removed.
    async fn delete_project_summaries(&self, project_id: &str) -> Result<u64>;

    /// Keep only the newest row per (project, date). Returns the number of rows removed.
    async fn collapse_duplicate_summaries(&self, project_id: &str) -> Result<u64>;

    /// Projects that have at least one summary
    async fn list_projects(&self) -> Result<Vec<String>>;
}

/// Factory for the repositories of one storage backend.
///
/// Services are generic over this trait so the domain layer never names a
/// concrete backend.
pub trait Connection: Send + Sync + Clone + 'static {
    type TransactionRepository: TransactionStorage + Clone + 'static;
    type SummaryRepository: SummaryStorage + Clone + 'static;

    fn create_transaction_repository(&self) -> Self::TransactionRepository;

    fn create_summary_repository(&self) -> Self::SummaryRepository;
}
