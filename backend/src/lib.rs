//! # Site Ledger Backend
//!
//! Daily financial ledger for construction projects. Transactions recorded
//! against a project roll up into one persisted summary per project and
//! calendar day, each carrying forward the previous day's remaining balance.
//!
//! The crate has three layers:
//! - [`config`]: file and environment configuration
//! - [`storage`]: SQLite persistence behind async storage traits
//! - [`domain`]: calculation, recompute orchestration and mutation services

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub mod config;
pub mod domain;
pub mod storage;

pub use config::LedgerConfig;
pub use storage::DbConnection;

/// Wires every service to one SQLite connection
#[derive(Clone)]
pub struct Backend {
    pub transaction_service: domain::TransactionService<DbConnection>,
    pub recompute_service: domain::RecomputeService<DbConnection>,
    pub recompute_queue: domain::RecomputeQueue<DbConnection>,
    pub worker_balance_service: domain::WorkerBalanceService<DbConnection>,
}

impl Backend {
    /// Connect to the configured database and build the services
    pub async fn new(config: &LedgerConfig) -> Result<Self> {
        info!("Opening ledger database {}", config.database_url);
        let db = DbConnection::new(&config.database_url).await?;
        Ok(Self::with_connection(db, config))
    }

    pub fn with_connection(db: DbConnection, config: &LedgerConfig) -> Self {
        let connection = Arc::new(db);

        let recompute_service = domain::RecomputeService::new(connection.clone(), config);
        let recompute_queue = domain::RecomputeQueue::new(recompute_service.clone());
        let transaction_service = domain::TransactionService::new(connection.clone(), recompute_queue.clone());
        let worker_balance_service = domain::WorkerBalanceService::new(connection);

        Self {
            transaction_service,
            recompute_service,
            recompute_queue,
            worker_balance_service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::*;

    #[tokio::test]
    async fn test_backend_services_share_one_store() {
        let db = DbConnection::init_test().await.unwrap();
        let backend = Backend::with_connection(db, &LedgerConfig::default());
        let day = date("2025-03-01");

        backend
            .transaction_service
            .record_transaction(attendance("site-a", "w1", day, "200", "1", "50"))
            .await
            .unwrap();

        let balance = backend.worker_balance_service.get_worker_balance("w1", "site-a").await.unwrap();
        assert_eq!(balance.current_balance, dec("150"));

        let summary = backend.recompute_service.recompute_date("site-a", day).await.unwrap();
        assert_eq!(summary.total_worker_wages, dec("50"));
        assert_eq!(summary.remaining_balance, dec("-50"));
    }
}
