//! Unrecoverable-session handling.
//!
//! When a session cannot be renewed (refresh rejected, no refresh token,
//! replayed request still unauthorized, or the watcher sees it expire) the
//! token store and persisted record are cleared and the session-expired hook
//! is told where to send the user.

use std::sync::{Arc, RwLock};

use super::TokenStore;

/// Callback receiving the login route after a session teardown.
pub type SessionExpiredHook = Arc<dyn Fn(&str) + Send + Sync>;

pub struct SessionTeardown {
    tokens: Arc<TokenStore>,
    login_route: String,
    /// Uses std::sync::RwLock because hooks are installed from sync code.
    hook: RwLock<Option<SessionExpiredHook>>,
}

impl SessionTeardown {
    pub fn new(tokens: Arc<TokenStore>, login_route: &str) -> Self {
        Self {
            tokens,
            login_route: login_route.to_string(),
            hook: RwLock::new(None),
        }
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// Install (or replace) the session-expired hook.
    pub fn set_hook(&self, hook: SessionExpiredHook) {
        let mut slot = self.hook.write().unwrap_or_else(|p| p.into_inner());
        *slot = Some(hook);
    }

    /// Clear the session everywhere and notify the hook.
    pub async fn run(&self, reason: &str) {
        let had_session = self.tokens.clear().await;
        log::info!(
            "Session ended ({}), redirecting to {}{}",
            reason,
            self.login_route,
            if had_session { "" } else { " (no active session)" }
        );

        let hook = self
            .hook
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook(&self.login_route);
        }
    }
}
