//! Single-flight access token refresh.
//!
//! Any number of requests may hit a 401 at the same moment. The first one to
//! ask for a refresh starts the network call on its own task; every caller,
//! the first included, is parked on a oneshot channel until that call settles.
//! Parked callers are released front-to-back with a clone of the outcome.
//! Dropping a caller never cancels the refresh it is waiting on.
//!
//! The `Idle -> Refreshing` check-and-set happens under a mutex that is never
//! held across an await point, so at most one refresh call is in flight on a
//! multi-threaded runtime.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::error::RefreshError;


/// Performs one refresh round-trip and returns the new access token.
///
/// In production `SessionRefresher` implements this against
/// `/api/auth/refresh-token`; tests use controllable mocks.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self) -> impl Future<Output = Result<String, RefreshError>> + Send;
}

type Outcome = Result<String, RefreshError>;
type Waiter = oneshot::Sender<Outcome>;

enum State {
    Idle,
    Refreshing(VecDeque<Waiter>),
}

struct Shared {
    state: State,
    /// Number of refresh cycles settled so far.
    generation: u64,
    /// Outcome of the most recently settled cycle.
    last: Option<Outcome>,
}

/// Observable phase of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPhase {
    /// No refresh call in flight.
    Idle,
    /// A refresh call is in flight with `queued` callers waiting on it.
    Refreshing { queued: usize },
}

impl RefreshPhase {
    pub fn label(&self) -> &str {
        match self {
            RefreshPhase::Idle => "Idle",
            RefreshPhase::Refreshing { .. } => "Refreshing...",
        }
    }
}

/// Guarantees at most one refresh call in flight at any time.
pub struct RefreshCoordinator<R> {
    refresher: Arc<R>,
    shared: Arc<Mutex<Shared>>,
}

impl<R: TokenRefresher + 'static> RefreshCoordinator<R> {
    pub fn new(refresher: Arc<R>) -> Self {
        Self {
            refresher,
            shared: Arc::new(Mutex::new(Shared {
                state: State::Idle,
                generation: 0,
                last: None,
            })),
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        match &lock(&self.shared).state {
            State::Idle => RefreshPhase::Idle,
            State::Refreshing(queue) => RefreshPhase::Refreshing {
                queued: queue.len(),
            },
        }
    }

    /// Number of refresh cycles settled so far.
    ///
    /// Read it before sending a request and hand it to `refresh_after` if the
    /// request comes back 401.
    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    /// Obtain a fresh access token, joining the in-flight refresh if there is one.
    pub async fn refresh(&self) -> Outcome {
        self.join(None).await
    }

    /// Like `refresh`, but reuses the outcome of a cycle that settled after
    /// `generation` instead of starting another one.
    ///
    /// `sent_with` is the access token the failed request carried; a settled
    /// cycle that produced that same token is not reused.
    pub async fn refresh_after(&self, generation: u64, sent_with: Option<&str>) -> Outcome {
        self.join(Some((generation, sent_with))).await
    }

    async fn join(&self, seen: Option<(u64, Option<&str>)>) -> Outcome {
        let rx = {
            let mut shared = lock(&self.shared);

            if let (State::Idle, Some((generation, sent_with))) = (&shared.state, seen) {
                if shared.generation > generation {
                    match &shared.last {
                        Some(Ok(token)) if Some(token.as_str()) != sent_with => {
                            log::debug!("Refresh settled since request was sent, reusing token");
                            return Ok(token.clone());
                        }
                        Some(Err(e)) => return Err(e.clone()),
                        _ => {}
                    }
                }
            }

            let (tx, rx) = oneshot::channel();
            match &mut shared.state {
                State::Refreshing(queue) => {
                    queue.push_back(tx);
                    log::debug!("Refresh in flight, queued as waiter #{}", queue.len());
                }
                State::Idle => {
                    shared.state = State::Refreshing(VecDeque::from([tx]));
                    self.start();
                }
            }
            rx
        };

        // A dropped sender means the refresh task vanished without settling.
        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// Spawn the refresh call. Called with the state already set to `Refreshing`.
    fn start(&self) {
        log::debug!("Starting token refresh");
        let refresher = self.refresher.clone();
        let mut in_flight = InFlight {
            shared: self.shared.clone(),
            settled: false,
        };
        tokio::spawn(async move {
            let outcome = refresher.refresh().await;
            in_flight.settle(outcome);
        });
    }
}

/// Owned by the refresh task while its call runs.
///
/// If the task is dropped mid-call (runtime shutdown), waiters are rejected
/// with `RefreshError::Abandoned` and the coordinator returns to `Idle`.
struct InFlight {
    shared: Arc<Mutex<Shared>>,
    settled: bool,
}

impl InFlight {
    fn settle(&mut self, outcome: Outcome) {
        self.settled = true;

        let waiters = {
            let mut shared = lock(&self.shared);
            shared.generation += 1;
            shared.last = Some(outcome.clone());
            match std::mem::replace(&mut shared.state, State::Idle) {
                State::Refreshing(queue) => queue,
                State::Idle => VecDeque::new(),
            }
        };

        match &outcome {
            Ok(_) => log::debug!("Refresh settled, releasing {} waiters", waiters.len()),
            Err(e) => log::debug!(
                "Refresh failed ({}), rejecting {} waiters",
                e,
                waiters.len()
            ),
        }

        for waiter in waiters {
            // The waiter's caller may be gone; nothing to deliver to then.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!("Refresh task dropped before the call settled");
            self.settle(Err(RefreshError::Abandoned));
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
