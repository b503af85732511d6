use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::recompute_service::RecomputeService;
use crate::storage::Connection;

type RecomputeKey = (String, NaiveDate);

/// Fire-and-forget recomputation of single days.
///
/// A trigger for a (project, date) that is already scheduled but has not
/// started yet joins the pending task. The mark is cleared when the task
/// starts, so a mutation landing mid-computation gets a fresh run.
#[derive(Clone)]
pub struct RecomputeQueue<C: Connection> {
    recompute_service: RecomputeService<C>,
    pending: Arc<Mutex<HashSet<RecomputeKey>>>,
}

impl<C: Connection> RecomputeQueue<C> {
    pub fn new(recompute_service: RecomputeService<C>) -> Self {
        Self {
            recompute_service,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Schedule a recompute and return at once. `None` when the trigger was coalesced.
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, project_id: &str, date: NaiveDate) -> Option<JoinHandle<()>> {
        let key = (project_id.to_string(), date);
        if !self.lock_pending().insert(key.clone()) {
            debug!("Recompute for project {} on {} already pending", project_id, date);
            return None;
        }

        let service = self.recompute_service.clone();
        let pending = Arc::clone(&self.pending);
        Some(tokio::spawn(async move {
            pending
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&key);

            let (project_id, date) = key;
            match service.recompute_date(&project_id, date).await {
                Ok(summary) => debug!(
                    "Background recompute for project {} on {} done, remaining {}",
                    project_id, date, summary.remaining_balance
                ),
                Err(e) => error!(
                    "Background recompute for project {} on {} failed: {}",
                    project_id, date, e
                ),
            }
        }))
    }

    pub fn is_pending(&self, project_id: &str, date: NaiveDate) -> bool {
        self.lock_pending().contains(&(project_id.to_string(), date))
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashSet<RecomputeKey>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::storage::test_utils::*;
    use crate::storage::{DbConnection, SummaryRepository, SummaryStorage, TransactionRepository, TransactionStorage};

    async fn create_test_queue() -> (RecomputeQueue<DbConnection>, DbConnection) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let service = RecomputeService::new(Arc::new(db.clone()), &LedgerConfig::default());
        (RecomputeQueue::new(service), db)
    }

    #[tokio::test]
    async fn test_trigger_persists_summary() {
        let (queue, db) = create_test_queue().await;
        let day = date("2025-03-01");
        TransactionRepository::new(db.clone())
            .store_transaction(&fund_transfer("site-a", day, "250"))
            .await
            .unwrap();

        let handle = queue.trigger("site-a", day).expect("first trigger schedules a task");
        handle.await.unwrap();

        let summary = SummaryRepository::new(db).get_summary("site-a", day).await.unwrap().unwrap();
        assert_eq!(summary.remaining_balance, dec("250"));
    }

    #[tokio::test]
    async fn test_pending_triggers_are_coalesced() {
        let (queue, _db) = create_test_queue().await;
        let day = date("2025-03-01");

        // The current-thread test runtime does not run the task until we yield
        let handle = queue.trigger("site-a", day).unwrap();
        assert!(queue.trigger("site-a", day).is_none());
        assert!(queue.trigger("site-a", day).is_none());
        assert!(queue.is_pending("site-a", day));

        // Other keys are independent
        let other_day = queue.trigger("site-a", date("2025-03-02")).unwrap();
        let other_project = queue.trigger("site-b", day).unwrap();

        handle.await.unwrap();
        other_day.await.unwrap();
        other_project.await.unwrap();

        assert!(!queue.is_pending("site-a", day));
        let again = queue.trigger("site-a", day).expect("finished key can be scheduled again");
        again.await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_stay_inside_the_task() {
        let (queue, db) = create_test_queue().await;
        sqlx::query("DROP TABLE daily_summaries").execute(db.pool()).await.unwrap();

        let handle = queue.trigger("site-a", date("2025-03-01")).unwrap();
        assert!(handle.await.is_ok());
        assert!(!queue.is_pending("site-a", date("2025-03-01")));
    }
}
