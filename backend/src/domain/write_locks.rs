use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// One async mutex per project. Every summary write for a project holds its
/// guard, so a repair never interleaves with a single-day recompute.
///
/// A project's entry lives only while someone holds or waits for its lock.
#[derive(Clone, Default)]
pub struct ProjectWriteLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Held for the duration of a project write. Releasing the last interest in a
/// project removes its entry from the map.
pub struct ProjectWriteGuard {
    project_id: String,
    locks: Arc<Mutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ProjectWriteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, project_id: &str) -> ProjectWriteGuard {
        let lock = {
            let mut locks = lock_map(&self.locks);
            Arc::clone(
                locks
                    .entry(project_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        let guard = lock.lock_owned().await;

        ProjectWriteGuard {
            project_id: project_id.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Projects currently held or waited on
    pub fn tracked_projects(&self) -> usize {
        lock_map(&self.locks).len()
    }
}

impl Drop for ProjectWriteGuard {
    fn drop(&mut self) {
        // Release the project first so the map's reference can be the last one
        self.guard.take();

        let mut locks = lock_map(&self.locks);
        let idle = locks
            .get(&self.project_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.project_id);
        }
    }
}

fn lock_map(locks: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
