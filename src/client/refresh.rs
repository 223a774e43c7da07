//! Token refresh coordination.
//!
//! Several requests can hit `401 Unauthorized` at the same moment. Only one
//! refresh call may be made; every caller shares its outcome.
//!
//! # State
//!
//! - an *in progress* flag
//! - a queue of waiters, each a one-shot channel
//!
//! Every caller enqueues a waiter. The first one to find the flag clear sets
//! it and spawns the refresh on its own task; the task takes the whole queue
//! when it finishes, clears the flag and sends the same result (new token or
//! error) to every waiter.
//!
//! # Invariants
//!
//! - at most one refresh is in flight per coordinator
//! - a refresh, once started, runs to completion even if the caller that
//!   started it is dropped
//! - every waiter enqueued during a refresh observes that refresh's outcome
//! - the lock is never held across an `.await`
//!
//! If the refresh task panics or is torn down with the runtime, a guard
//! releases every waiter with a transport error and clears the flag.

use crate::error::{ApiError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<Result<String>>;

#[derive(Debug, Default)]
struct RefreshState {
    in_progress: bool,
    waiters: Vec<Waiter>,
}

/// Serializes concurrent token refreshes.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    /// An idle coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Obtain a fresh access token, spawning `refresh` only if no refresh is
    /// already in flight.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn refresh<F, Fut>(self: &Arc<Self>, refresh: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let (rx, leader) = {
            let mut state = self.state.lock();
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            let leader = !state.in_progress;
            state.in_progress = true;
            (rx, leader)
        };

        if leader {
            let refresh = refresh();
            let guard = ReleaseGuard {
                coordinator: Arc::clone(self),
                settled: false,
            };
            tokio::spawn(async move {
                let mut guard = guard;
                let outcome = refresh.await;
                guard.settle(&outcome);
            });
        } else {
            tracing::debug!("token refresh in flight, queued");
        }

        rx.await.unwrap_or_else(|_| Err(abandoned()))
    }

    /// Whether a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_progress
    }

    /// Number of callers waiting on the in-flight refresh, the one that
    /// started it included.
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Drop all waiters and clear the flag.
    ///
    /// Dropped waiters observe a transport error.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.in_progress = false;
        state.waiters.clear();
    }

    fn release(&self, outcome: &Result<String>) {
        let waiters = {
            let mut state = self.state.lock();
            state.in_progress = false;
            std::mem::take(&mut state.waiters)
        };

        tracing::debug!(waiters = waiters.len(), ok = outcome.is_ok(), "releasing refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

fn abandoned() -> ApiError {
    ApiError::network("token refresh abandoned")
}

struct ReleaseGuard {
    coordinator: Arc<RefreshCoordinator>,
    settled: bool,
}

impl ReleaseGuard {
    fn settle(&mut self, outcome: &Result<String>) {
        self.settled = true;
        self.coordinator.release(outcome);
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.release(&Err(abandoned()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_pending, assert_ready, task};

    async fn wait_for_waiters(coordinator: &RefreshCoordinator, n: usize) {
        while coordinator.pending_waiters() < n {
            tokio::task::yield_now().await;
        }
    }

    /// A refresh future that resolves with whatever is sent on the channel.
    fn gated() -> (
        oneshot::Sender<Result<String>>,
        impl Future<Output = Result<String>> + Send + 'static,
    ) {
        let (tx, rx) = oneshot::channel();
        let refresh = async move {
            rx.await
                .unwrap_or_else(|_| Err(ApiError::network("gate dropped")))
        };
        (tx, refresh)
    }

    fn explode() -> Result<String> {
        panic!("refresh task panicked")
    }

    #[tokio::test]
    async fn test_single_refresh() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let token = coordinator.refresh(|| async { Ok("T2".to_string()) }).await;
        assert_eq!(token.unwrap(), "T2");
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let calls = AtomicU32::new(0);
        let (gate_tx, gate) = gated();
        let gate = Mutex::new(Some(gate));
        let (calls, gate) = (&calls, &gate);

        let callers = join_all((0..4).map(|_| {
            coordinator.refresh(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.lock().take().expect("leader runs once")
            })
        }));

        let opener = async {
            wait_for_waiters(&coordinator, 4).await;
            gate_tx.send(Ok("T2".to_string())).unwrap();
        };

        let (results, ()) = tokio::join!(callers, opener);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_deref() == Ok("T2")));
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_waiter_pending_until_refresh_settles() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let (gate_tx, gate) = gated();

        let mut leader = task::spawn(coordinator.refresh(move || gate));
        assert_pending!(leader.poll());
        assert!(coordinator.is_refreshing());

        let mut waiter = task::spawn(coordinator.refresh(|| async { Ok("unused".to_string()) }));
        assert_pending!(waiter.poll());
        assert_eq!(coordinator.pending_waiters(), 2);

        gate_tx.send(Ok("T2".to_string())).unwrap();
        while coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        assert!(leader.is_woken());
        assert!(waiter.is_woken());
        assert_eq!(assert_ready!(leader.poll()).unwrap(), "T2");
        assert_eq!(assert_ready!(waiter.poll()).unwrap(), "T2");
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let (gate_tx, gate) = gated();
        let gate = Mutex::new(Some(gate));
        let gate = &gate;
        let failure = ApiError::Http {
            status: 401,
            status_text: "Unauthorized".to_string(),
            body: serde_json::Value::Null,
        };

        let callers = join_all((0..3).map(|_| {
            coordinator.refresh(move || gate.lock().take().expect("leader runs once"))
        }));

        let opener = async {
            wait_for_waiters(&coordinator, 3).await;
            gate_tx.send(Err(failure.clone())).unwrap();
        };

        let (results, ()) = tokio::join!(callers, opener);
        assert!(results.iter().all(|r| r.as_ref().unwrap_err() == &failure));
    }

    #[tokio::test]
    async fn test_next_refresh_after_completion_runs_again() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let calls = AtomicU32::new(0);

        for expected in ["T2", "T3"] {
            let token = coordinator
                .refresh(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(expected.to_string()) }
                })
                .await;
            assert_eq!(token.unwrap(), expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_outlives_dropped_leader() {
        let coordinator = Arc::new(RefreshCoordinator::new());
        let (gate_tx, gate) = gated();

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh(move || gate).await })
        };
        wait_for_waiters(&coordinator, 1).await;
        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());
        assert!(coordinator.is_refreshing());

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh(|| async { Ok("unused".to_string()) })
                    .await
            })
        };
        wait_for_waiters(&coordinator, 2).await;

        gate_tx.send(Ok("T2".to_string())).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), "T2");
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_panicking_refresh_releases_waiters() {
        let coordinator = Arc::new(RefreshCoordinator::new());

        let result = coordinator.refresh(|| async { explode() }).await;

        assert_eq!(result.unwrap_err(), ApiError::network("token refresh abandoned"));
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.pending_waiters(), 0);
    }
}
