use anyhow::{anyhow, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::repositories::{SummaryRepository, TransactionRepository};
use super::traits::Connection;
use crate::config::DATABASE_URL;

/// How long a connection waits on another writer's lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// DbConnection manages the SQLite pool and the ledger schema
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create a new database connection.
    ///
    /// The database runs in WAL mode so readers never block the writer, and
    /// every connection waits out a held write lock instead of failing with
    /// `SQLITE_BUSY`.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        info!("Opening database {}", url);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::setup_schema(&pool).await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Initialize the standard database
    pub async fn init() -> Result<Self> {
        Self::new(DATABASE_URL).await
    }

    /// Initialize a private in-memory database.
    ///
    /// A single connection that never expires keeps the memory database alive
    /// and serializes access, so concurrent tasks in tests never see a locked table.
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::setup_schema(&pool).await?;

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction that holds the database write lock from its first statement
    pub async fn begin_write(&self) -> Result<WriteTransaction> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(WriteTransaction { conn: Some(conn) })
    }

    /// Set up the required database schema
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        // Money columns are decimal text so no value ever passes through a float
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS fund_transfers (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                sender_name TEXT NOT NULL,
                transfer_type TEXT NOT NULL,
                notes TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS worker_attendance (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                worker_id TEXT NOT NULL,
                date TEXT NOT NULL,
                daily_wage TEXT NOT NULL,
                work_days TEXT NOT NULL,
                paid_amount TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS material_purchases (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                date TEXT NOT NULL,
                material_name TEXT NOT NULL,
                quantity TEXT NOT NULL,
                unit_price TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                purchase_type TEXT NOT NULL,
                supplier_name TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS transportation_expenses (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS worker_transfers (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                worker_id TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                recipient_name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS worker_misc_expenses (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                worker_id TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS project_fund_transfers (
                id TEXT PRIMARY KEY,
                from_project_id TEXT NOT NULL,
                to_project_id TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS daily_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                date TEXT NOT NULL,
                carried_forward_amount TEXT NOT NULL,
                total_fund_transfers TEXT NOT NULL,
                total_worker_wages TEXT NOT NULL,
                total_material_costs TEXT NOT NULL,
                total_transportation_costs TEXT NOT NULL,
                total_worker_transfers TEXT NOT NULL,
                total_worker_misc_expenses TEXT NOT NULL,
                total_incoming_project_transfers TEXT NOT NULL,
                total_outgoing_project_transfers TEXT NOT NULL,
                total_income TEXT NOT NULL,
                total_expenses TEXT NOT NULL,
                remaining_balance TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
            "CREATE INDEX IF NOT EXISTS idx_fund_transfers_project_date ON fund_transfers(project_id, date);",
            "CREATE INDEX IF NOT EXISTS idx_worker_attendance_project_date ON worker_attendance(project_id, date);",
            "CREATE INDEX IF NOT EXISTS idx_worker_attendance_worker ON worker_attendance(worker_id, project_id);",
            "CREATE INDEX IF NOT EXISTS idx_material_purchases_project_date ON material_purchases(project_id, date);",
            "CREATE INDEX IF NOT EXISTS idx_transportation_expenses_project_date ON transportation_expenses(project_id, date);",
            "CREATE INDEX IF NOT EXISTS idx_worker_transfers_project_date ON worker_transfers(project_id, date);",
            "CREATE INDEX IF NOT EXISTS idx_worker_transfers_worker ON worker_transfers(worker_id, project_id);",
            "CREATE INDEX IF NOT EXISTS idx_worker_misc_expenses_project_date ON worker_misc_expenses(project_id, date);",
            "CREATE INDEX IF NOT EXISTS idx_project_fund_transfers_from ON project_fund_transfers(from_project_id, date);",
            "CREATE INDEX IF NOT EXISTS idx_project_fund_transfers_to ON project_fund_transfers(to_project_id, date);",
            // Databases written before the unique index may still hold duplicate
            // days; keep the newest row of each before the index is built.
            r#"
            DELETE FROM daily_summaries
            WHERE EXISTS (
                SELECT 1 FROM daily_summaries AS newer
                WHERE newer.project_id = daily_summaries.project_id
                  AND newer.date = daily_summaries.date
                  AND (newer.created_at > daily_summaries.created_at
                       OR (newer.created_at = daily_summaries.created_at AND newer.id > daily_summaries.id))
            );
            "#,
            "DROP INDEX IF EXISTS idx_daily_summaries_project_date;",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_daily_summaries_project_day ON daily_summaries(project_id, date);",
        ];

        for statement in statements {
            sqlx::query(statement).execute(pool).await?;
        }

        debug!("Ledger schema ready");
        Ok(())
    }
}

/// A `BEGIN IMMEDIATE` transaction on one pooled connection.
///
/// Dropping it without `commit` or `rollback` detaches and closes the
/// connection, which makes SQLite roll the transaction back.
pub struct WriteTransaction {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTransaction {
    pub fn connection(&mut self) -> Result<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| anyhow!("Write transaction already finished"))
    }

    pub async fn commit(mut self) -> Result<()> {
        let mut conn = self.take()?;
        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            discard(conn, &e).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        let mut conn = self.take()?;
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            drop(conn.detach());
            return Err(e.into());
        }
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`. The work's own error wins over a rollback failure.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = self.rollback().await {
                    warn!("Rollback failed after {:#}: {:#}", e, rollback_error);
                }
                Err(e)
            }
        }
    }

    fn take(&mut self) -> Result<PoolConnection<Sqlite>> {
        self.conn
            .take()
            .ok_or_else(|| anyhow!("Write transaction already finished"))
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!("Write transaction dropped unfinished, closing its connection");
            drop(conn.detach());
        }
    }
}

async fn discard(mut conn: PoolConnection<Sqlite>, cause: &sqlx::Error) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        warn!("Rollback after failed commit ({}) also failed: {}", cause, e);
        drop(conn.detach());
    }
}

impl Connection for DbConnection {
    type TransactionRepository = TransactionRepository;
    type SummaryRepository = SummaryRepository;

    fn create_transaction_repository(&self) -> Self::TransactionRepository {
        TransactionRepository::new(self.clone())
    }

    fn create_summary_repository(&self) -> Self::SummaryRepository {
        SummaryRepository::new(self.clone())
    }
}
