//! Single-flight coordination of access-token refreshes.
//!
//! The first request to hit an expired token becomes the leader and performs
//! the refresh; every request that hits one while that refresh is in flight
//! is parked as a waiter and released, in arrival order, with the outcome.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use crate::api::ApiError;

type Outcome = Result<String, String>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
}

/// Owns the in-flight flag and the waiter queue. The mutex is never held
/// across an await.
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

/// What a request that hit an expired token should do next.
pub enum Ticket<'a> {
    /// Perform the refresh, then settle the lease.
    Leader(RefreshLease<'a>),
    /// Wait for the leader's outcome.
    Waiter(Waiter),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Number of requests parked behind the current refresh.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Become the leader if no refresh is running, otherwise join the queue.
    pub fn join(&self) -> Ticket<'_> {
        let mut state = self.lock();
        if state.in_flight {
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!(position = state.waiters.len(), "Refresh in progress, queued request");
            Ticket::Waiter(Waiter { rx })
        } else {
            state.in_flight = true;
            Ticket::Leader(RefreshLease {
                coordinator: self,
                settled: false,
            })
        }
    }

    fn settle(&self, outcome: Outcome) {
        let waiters = {
            let mut state = self.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(waiters = waiters.len(), success = outcome.is_ok(), "Releasing queued requests");
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Held by the leader for the duration of one refresh cycle. Dropping it
/// unsettled (the leader's future was cancelled) rejects every waiter so the
/// coordinator never stays in flight.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    /// Release all waiters with the new access token.
    pub fn resolve(mut self, token: &str) {
        self.settled = true;
        self.coordinator.settle(Ok(token.to_string()));
    }

    /// Release all waiters with the refresh failure.
    pub fn reject(mut self, reason: &str) {
        self.settled = true;
        self.coordinator.settle(Err(reason.to_string()));
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .settle(Err("Token refresh was cancelled".to_string()));
        }
    }
}

pub struct Waiter {
    rx: oneshot::Receiver<Outcome>,
}

impl Waiter {
    /// The new access token, or the reason the refresh failed.
    pub async fn wait(self) -> Result<String, ApiError> {
        match self.rx.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(reason)) => Err(ApiError::RefreshFailed(reason)),
            Err(_) => Err(ApiError::RefreshFailed(
                "Token refresh ended without a result".to_string(),
            )),
        }
    }
}
