//! Authenticated HTTP client for the project-marketplace API.
//!
//! Attaches the session's bearer token to every request and renews the
//! session transparently when the server answers 401, with at most one
//! refresh call in flight no matter how many requests fail at once.

pub mod api;
pub mod config;
pub mod error;
pub mod refresh;
pub mod session;
pub mod watcher;

pub use api::{ApiClient, ApiRequest};
pub use config::ClientConfig;
pub use error::{ClientError, RefreshError};
pub use refresh::{RefreshCoordinator, RefreshPhase, TokenRefresher};
pub use session::{Session, TokenStore, UserRole, UserSummary};
pub use watcher::SessionWatcher;
