//! Client-held session state.
//!
//! `TokenStore` is the single owner of the current access token, refresh token
//! and expiry. It mirrors every change into a `SessionStorage` backend so a
//! later process can pick the session up again. Token strings are zeroed when
//! a session is dropped, replaced or cleared.

pub mod jwt;
pub mod storage;
pub mod teardown;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

use storage::{SessionStorage, StorageError};

pub use teardown::{SessionExpiredHook, SessionTeardown};

/// Marketplace role of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    Admin,
    Client,
    Specialist,
    #[serde(other)]
    Unknown,
}

/// Identity fields returned alongside tokens by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
}

impl UserSummary {
    /// "First Last", falling back to the email address.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

/// Access/refresh token pair as sent to `/api/auth/refresh-token`.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

/// The client-held bundle of tokens, expiry and user identity.
#[derive(Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[zeroize(skip)]
    pub expires_at: Option<DateTime<Utc>>,
    #[zeroize(skip)]
    pub user: UserSummary,
}

impl Session {
    /// Build a session, taking the expiry from the access token's `exp` claim
    /// when the server did not send one.
    pub fn new(
        access_token: String,
        refresh_token: String,
        expires_at: Option<DateTime<Utc>>,
        user: UserSummary,
    ) -> Self {
        let expires_at = expires_at.or_else(|| jwt::expiry(&access_token));
        Self {
            access_token,
            refresh_token,
            expires_at,
            user,
        }
    }

    /// Best-effort expiry check. A session without an expiry never expires client-side.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Thread-safe storage for the current session.
///
/// Pure storage: no network calls and no refresh logic live here.
pub struct TokenStore {
    session: RwLock<Option<Session>>,
    storage: Arc<dyn SessionStorage>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            session: RwLock::new(None),
            storage,
        }
    }

    /// Load the persisted session into memory.
    ///
    /// Returns `true` if a session was found.
    pub async fn restore(&self) -> Result<bool, StorageError> {
        let loaded = self.storage.load()?;
        let found = loaded.is_some();
        *self.session.write().await = loaded;
        Ok(found)
    }

    /// Install a freshly issued session (login, registration, confirmation,
    /// invitation). The previous session, if any, is replaced wholesale.
    pub async fn install(&self, session: Session) -> Result<(), StorageError> {
        let mut guard = self.session.write().await;
        self.storage.save(&session)?;
        *guard = Some(session);
        Ok(())
    }

    /// Swap in refreshed tokens, keeping the user unchanged.
    ///
    /// Returns `false` without storing anything when there is no session
    /// (it was cleared while the refresh was in flight). Persistence failures
    /// are logged but do not undo the in-memory update: the old refresh token
    /// is already spent server-side.
    pub async fn update_tokens(
        &self,
        tokens: TokenPair,
        expires_at: Option<DateTime<Utc>>,
    ) -> bool {
        let mut guard = self.session.write().await;
        let Some(current) = guard.as_ref() else {
            return false;
        };

        let updated = Session::new(
            tokens.access_token.clone(),
            tokens.refresh_token.clone(),
            expires_at,
            current.user.clone(),
        );
        if let Err(e) = self.storage.save(&updated) {
            log::warn!("Failed to persist refreshed session: {}", e);
        }
        *guard = Some(updated);
        true
    }

    /// Drop the session from memory and from persisted storage.
    ///
    /// Returns `true` if there was an in-memory session to clear.
    pub async fn clear(&self) -> bool {
        let mut guard = self.session.write().await;
        let had_session = guard.is_some();
        // Dropping the session zeroes its tokens.
        *guard = None;
        if let Err(e) = self.storage.clear() {
            log::warn!("Failed to clear persisted session: {}", e);
        }
        had_session
    }

    pub async fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.refresh_token.clone())
    }

    /// Both tokens, or `None` when either is missing or empty.
    pub async fn token_pair(&self) -> Option<TokenPair> {
        let guard = self.session.read().await;
        let session = guard.as_ref()?;
        if session.access_token.is_empty() || session.refresh_token.is_empty() {
            return None;
        }
        Some(TokenPair {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
        })
    }

    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.read().await.as_ref().and_then(|s| s.expires_at)
    }

    pub async fn user(&self) -> Option<UserSummary> {
        self.session.read().await.as_ref().map(|s| s.user.clone())
    }

    pub async fn has_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// `true` only when a session exists and its expiry has passed.
    pub async fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.is_expired_at(now))
    }
}
