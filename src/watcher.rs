//! Background session-expiry watcher.
//!
//! Polls the stored expiry at a fixed interval and ends the session as soon as
//! it passes, without waiting for the server to answer 401.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::session::{SessionTeardown, TokenStore};

pub struct SessionWatcher {
    tokens: Arc<TokenStore>,
    teardown: Arc<SessionTeardown>,
    poll_interval: Duration,
    /// Closing or sending on the paired sender stops the watcher.
    shutdown_rx: mpsc::Receiver<()>,
}

impl SessionWatcher {
    pub fn new(
        tokens: Arc<TokenStore>,
        teardown: Arc<SessionTeardown>,
        poll_interval: Duration,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            tokens,
            teardown,
            poll_interval,
            shutdown_rx,
        }
    }

    /// Main run loop. Call from a spawned tokio task.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        log::info!(
            "Session watcher started (interval: {}s)",
            self.poll_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = self.shutdown_rx.recv() => {
                    log::info!("Session watcher stopped");
                    return;
                }
            }
        }
    }

    /// One expiry check. Returns `true` if the session was ended.
    pub async fn check(&self) -> bool {
        if !self.tokens.is_expired(Utc::now()).await {
            return false;
        }
        self.teardown.run("session expired").await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Duration as ChronoDuration;

    use crate::session::storage::MemoryStorage;
    use crate::session::{Session, UserSummary};

    async fn store_with_expiry(offset: ChronoDuration) -> Arc<TokenStore> {
        let tokens = Arc::new(TokenStore::new(Arc::new(MemoryStorage::new())));
        let user = UserSummary {
            id: "u-1".into(),
            email: "ada@example.com".into(),
            first_name: None,
            last_name: None,
            role: None,
        };
        tokens
            .install(Session::new(
                "at1".into(),
                "rt1".into(),
                Some(Utc::now() + offset),
                user,
            ))
            .await
            .unwrap();
        tokens
    }

    fn watcher_for(
        tokens: Arc<TokenStore>,
    ) -> (SessionWatcher, Arc<AtomicU32>, mpsc::Sender<()>) {
        let teardown = Arc::new(SessionTeardown::new(tokens.clone(), "/account/login"));
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        teardown.set_hook(Arc::new(move |route: &str| {
            assert_eq!(route, "/account/login");
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let (tx, rx) = mpsc::channel(1);
        let watcher = SessionWatcher::new(tokens, teardown, Duration::from_millis(10), rx);
        (watcher, fired, tx)
    }

    #[tokio::test]
    async fn test_check_leaves_live_session_alone() {
        let tokens = store_with_expiry(ChronoDuration::hours(1)).await;
        let (watcher, fired, _tx) = watcher_for(tokens.clone());

        assert!(!watcher.check().await);
        assert!(tokens.has_session().await);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_check_ends_expired_session() {
        let tokens = store_with_expiry(ChronoDuration::seconds(-1)).await;
        let (watcher, fired, _tx) = watcher_for(tokens.clone());

        assert!(watcher.check().await);
        assert!(!tokens.has_session().await);
        // Nothing left to expire on the next tick.
        assert!(!watcher.check().await);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let tokens = store_with_expiry(ChronoDuration::seconds(-1)).await;
        let (watcher, fired, tx) = watcher_for(tokens.clone());

        let handle = tokio::spawn(watcher.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).await.unwrap();
        handle.await.unwrap();

        assert!(!tokens.has_session().await);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
