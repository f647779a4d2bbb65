//! Global concurrency control for step execution.
//!
//! Three gates, outermost first: a bounded admission queue (reject fast once
//! full rather than growing unbounded), a global concurrency semaphore
//! (default 32 steps running at once across every workflow), and a
//! per-`(AppId, resource name)` FIFO lock so two steps never touch the same
//! declared resource concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pcore_domain::AppId;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, RwLock, Semaphore};

pub const DEFAULT_GLOBAL_CONCURRENCY: usize = 32;
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;
pub const DEFAULT_ADMISSION_TIMEOUT_SECS: u64 = 5 * 60;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("admission queue is full")]
    QueueFull,
    #[error("timed out waiting {0:?} for an execution slot")]
    AdmissionTimeout(Duration),
}

pub struct SchedulerConfig {
    pub global_concurrency: usize,
    pub queue_depth: usize,
    pub admission_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            global_concurrency: DEFAULT_GLOBAL_CONCURRENCY,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            admission_timeout: Duration::from_secs(DEFAULT_ADMISSION_TIMEOUT_SECS),
        }
    }
}

/// Holds a step's global concurrency slot and, if requested, its
/// per-resource lock; releases both on drop.
pub struct ExecutionPermit {
    _global: OwnedSemaphorePermit,
    _resource: Option<OwnedMutexGuard<()>>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    global: Arc<Semaphore>,
    queued: AtomicUsize,
    resource_locks: RwLock<HashMap<(AppId, String), Arc<Mutex<()>>>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let global = Arc::new(Semaphore::new(config.global_concurrency));
        Self { config, global, queued: AtomicUsize::new(0), resource_locks: RwLock::new(HashMap::new()) }
    }

    /// Admits one step for execution, optionally serialized against other
    /// steps touching the same `(app_id, resource_name)`. Fails fast with
    /// `QueueFull` if the admission queue is already at capacity, or with
    /// `AdmissionTimeout` if a slot never frees up in time.
    pub async fn admit(&self, app_id: AppId, resource_name: Option<&str>) -> Result<ExecutionPermit, SchedulerError> {
        if self.queued.fetch_add(1, Ordering::AcqRel) >= self.config.queue_depth {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(SchedulerError::QueueFull);
        }
        let result = tokio::time::timeout(self.config.admission_timeout, Arc::clone(&self.global).acquire_owned()).await;
        self.queued.fetch_sub(1, Ordering::AcqRel);
        let global = match result {
            Ok(permit) => permit.expect("semaphore never closed"),
            Err(_) => return Err(SchedulerError::AdmissionTimeout(self.config.admission_timeout)),
        };

        let resource = match resource_name {
            Some(name) => Some(self.resource_lock(app_id, name).await.lock_owned().await),
            None => None,
        };

        Ok(ExecutionPermit { _global: global, _resource: resource })
    }

    async fn resource_lock(&self, app_id: AppId, name: &str) -> Arc<Mutex<()>> {
        let key = (app_id, name.to_string());
        if let Some(lock) = self.resource_locks.read().await.get(&key) {
            return Arc::clone(lock);
        }
        let mut locks = self.resource_locks.write().await;
        Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_the_concurrency_limit() {
        let scheduler = Scheduler::new(SchedulerConfig { global_concurrency: 2, queue_depth: 8, admission_timeout: Duration::from_millis(50) });
        let app = AppId::new();
        let a = scheduler.admit(app, None).await.unwrap();
        let b = scheduler.admit(app, None).await.unwrap();
        let timed_out = scheduler.admit(app, None).await;
        assert!(matches!(timed_out, Err(SchedulerError::AdmissionTimeout(_))));
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn rejects_admission_once_queue_is_full() {
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig { global_concurrency: 1, queue_depth: 1, admission_timeout: Duration::from_secs(5) }));
        let app = AppId::new();
        let _held = scheduler.admit(app, None).await.unwrap();

        let s2 = Arc::clone(&scheduler);
        let waiter = tokio::spawn(async move { s2.admit(app, None).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let rejected = scheduler.admit(app, None).await;
        assert!(matches!(rejected, Err(SchedulerError::QueueFull)));
        waiter.abort();
    }

    #[tokio::test]
    async fn same_resource_is_serialized() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let app = AppId::new();
        let first = scheduler.admit(app, Some("db")).await.unwrap();
        let s = Arc::new(scheduler);
        let s2 = Arc::clone(&s);
        let handle = tokio::spawn(async move { s2.admit(app, Some("db")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        drop(first);
        handle.await.unwrap().unwrap();
    }
}
