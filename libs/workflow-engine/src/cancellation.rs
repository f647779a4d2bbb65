//! Cooperative cancellation signal threaded through a running workflow.
//!
//! A `WorkflowRun` cancellation does not kill in-flight step executors; it
//! flips a flag that the engine's scheduling loop and long-running
//! executors poll, then waits up to a grace period (10s) before
//! treating anything still running as failed.

use std::collections::HashMap;

use pcore_domain::WorkflowRunId;
use tokio::sync::{watch, RwLock};

#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

#[must_use]
pub fn cancellation_pair() -> (CancellationHandle, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, CancellationToken { rx })
}

impl CancellationHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationToken {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Useful in `tokio::select!`
    /// alongside a step executor's own future.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Keyed store of live [`CancellationHandle`]s for in-flight `WorkflowRun`s.
///
/// Every component that can spawn a run (the reconciler's provisioning/
/// deprovisioning/health-check triggers, and `pcore-core`'s golden-path and
/// manual triggers) registers its handle here so a later cancellation
/// request can always find the run it names, regardless of who started it.
#[derive(Default)]
pub struct CancellationRegistry {
    handles: RwLock<HashMap<WorkflowRunId, CancellationHandle>>,
}

impl CancellationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, run_id: WorkflowRunId, handle: CancellationHandle) {
        self.handles.write().await.insert(run_id, handle);
    }

    /// Requests cancellation of `run_id`. Returns `false` if no handle is
    /// registered for it (already finished, or never tracked).
    pub async fn cancel(&self, run_id: WorkflowRunId) -> bool {
        let handles = self.handles.read().await;
        match handles.get(&run_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Drops the handle for `run_id`; called once its run reaches a
    /// terminal status so the registry doesn't grow unbounded.
    pub async fn remove(&self, run_id: WorkflowRunId) {
        self.handles.write().await.remove(&run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_flips_token() {
        let (handle, token) = cancellation_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let (handle, mut token) = cancellation_pair();
        handle.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn registry_cancel_reaches_a_registered_handle() {
        let registry = CancellationRegistry::new();
        let (handle, token) = cancellation_pair();
        let run_id = WorkflowRunId::new();
        registry.register(run_id, handle).await;

        assert!(registry.cancel(run_id).await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn registry_cancel_on_unknown_run_returns_false() {
        let registry = CancellationRegistry::new();
        assert!(!registry.cancel(WorkflowRunId::new()).await);
    }

    #[tokio::test]
    async fn removed_handle_is_no_longer_reachable() {
        let registry = CancellationRegistry::new();
        let (handle, _token) = cancellation_pair();
        let run_id = WorkflowRunId::new();
        registry.register(run_id, handle).await;
        registry.remove(run_id).await;

        assert!(!registry.cancel(run_id).await);
    }
}
