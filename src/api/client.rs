//! HTTP client with bearer injection and transparent session renewal.
//!
//! Every request carries the current access token. A 401 on a request that
//! opted into renewal triggers one trip through the refresh coordinator and a
//! single replay; callers only see the replayed response.

use std::sync::Arc;

use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::auth;
use crate::config::ClientConfig;
use crate::error::{ClientError, RefreshError};
use crate::refresh::{RefreshCoordinator, RefreshPhase, TokenRefresher};
use crate::session::storage::SessionStorage;
use crate::session::{jwt, SessionTeardown, TokenPair, TokenStore};

/// A replayable request description.
///
/// Kept as plain data (not a `reqwest::Request`) so it can be rebuilt with a
/// different bearer token after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    with_bearer: bool,
    renew_on_unauthorized: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
            with_bearer: true,
            renew_on_unauthorized: true,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Pass a 401 straight back to the caller instead of renewing the session.
    ///
    /// Used for the session endpoints themselves, where 401 means bad credentials.
    pub fn without_renewal(mut self) -> Self {
        self.renew_on_unauthorized = false;
        self
    }

    /// Send without an `Authorization` header. Implies `without_renewal`.
    pub fn anonymous(mut self) -> Self {
        self.with_bearer = false;
        self.without_renewal()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Refreshes the session against `/api/auth/refresh-token`.
///
/// On any failure the session is torn down here, once per refresh cycle,
/// before the error is handed back to the coordinator.
pub struct SessionRefresher {
    http: Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    teardown: Arc<SessionTeardown>,
}

impl TokenRefresher for SessionRefresher {
    async fn refresh(&self) -> Result<String, RefreshError> {
        let Some(pair) = self.tokens.token_pair().await else {
            self.teardown.run("no refresh token").await;
            return Err(RefreshError::NoSession);
        };

        let issued = match auth::request_refresh(&self.http, &self.base_url, &pair).await {
            Ok(issued) => issued,
            Err(e) => {
                log::warn!("Token refresh failed: {}", e);
                self.teardown.run("refresh failed").await;
                return Err(e);
            }
        };

        let access_token = issued.access_token.clone();
        let renewed = TokenPair {
            access_token: issued.access_token.clone(),
            refresh_token: issued.refresh_token.clone(),
        };
        if !self.tokens.update_tokens(renewed, issued.expires_at).await {
            // Logged out while the refresh was in flight; don't resurrect it.
            self.teardown.run("session cleared during refresh").await;
            return Err(RefreshError::NoSession);
        }

        match jwt::subject(&access_token) {
            Some(sub) => log::info!("Access token refreshed for {}", sub),
            None => log::info!("Access token refreshed"),
        }
        Ok(access_token)
    }
}

/// HTTP client wrapper for marketplace API communication.
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    teardown: Arc<SessionTeardown>,
    coordinator: RefreshCoordinator<SessionRefresher>,
}

impl ApiClient {
    /// Create a client for the configured API with the given session storage.
    ///
    /// The persisted session is not loaded until `restore_session` is called.
    pub fn new(
        config: &ClientConfig,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(ClientError::Network)?;
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let tokens = Arc::new(TokenStore::new(storage));
        let teardown = Arc::new(SessionTeardown::new(tokens.clone(), &config.login_route));

        let coordinator = RefreshCoordinator::new(Arc::new(SessionRefresher {
            http: http.clone(),
            base_url: base_url.clone(),
            tokens: tokens.clone(),
            teardown: teardown.clone(),
        }));

        Ok(Self {
            http,
            base_url,
            tokens,
            teardown,
            coordinator,
        })
    }

    /// Register the callback told where to send the user when the session dies.
    pub fn on_session_expired<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.teardown.set_hook(Arc::new(hook));
    }

    /// Load the persisted session, if any. Returns `true` when one was found.
    pub async fn restore_session(&self) -> Result<bool, ClientError> {
        Ok(self.tokens.restore().await?)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn session_teardown(&self) -> &Arc<SessionTeardown> {
        &self.teardown
    }

    pub fn refresh_phase(&self) -> RefreshPhase {
        self.coordinator.phase()
    }

    /// Send a request, renewing the session and replaying once on 401.
    ///
    /// Non-401 responses (including other error statuses) are returned as-is.
    pub async fn request(&self, request: ApiRequest) -> Result<Response, ClientError> {
        let generation = self.coordinator.generation();
        let sent_with = if request.with_bearer {
            self.tokens.access_token().await
        } else {
            None
        };
        let response = self.dispatch(&request, sent_with.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || !request.renew_on_unauthorized {
            return Ok(response);
        }

        log::debug!(
            "401 from {} {}, renewing session",
            request.method,
            request.path
        );

        let current = self.tokens.access_token().await;
        let token = match (sent_with.as_deref(), current) {
            // Someone else already refreshed since this request went out.
            (Some(sent), Some(current)) if sent != current => current,
            // The session ended after this request went out; that teardown already ran.
            (Some(_), None) => {
                log::debug!("Session already ended, not refreshing for {}", request.path);
                return Err(ClientError::SessionExpired(RefreshError::NoSession));
            }
            (sent, _) => self.coordinator.refresh_after(generation, sent).await?,
        };

        let replayed = self.dispatch(&request, Some(&token)).await?;
        if replayed.status() == StatusCode::UNAUTHORIZED {
            let body = replayed.text().await.unwrap_or_default();
            self.teardown.run("replayed request unauthorized").await;
            return Err(ClientError::Unauthorized(body));
        }

        Ok(replayed)
    }

    /// Send an authenticated GET request to a relative API path.
    pub async fn authenticated_get(&self, path: &str) -> Result<Response, ClientError> {
        self.request(ApiRequest::get(path)).await
    }

    /// Send an authenticated POST request with a JSON body to a relative API path.
    pub async fn authenticated_post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ClientError> {
        self.request(ApiRequest::post(path).json(body)?).await
    }

    /// Send an authenticated PUT request with a JSON body to a relative API path.
    pub async fn authenticated_put<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ClientError> {
        self.request(ApiRequest::put(path).json(body)?).await
    }

    /// Send an authenticated DELETE request to a relative API path.
    pub async fn authenticated_delete(&self, path: &str) -> Result<Response, ClientError> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Send an unauthenticated POST request that never triggers session renewal.
    /// Used for login-style endpoints where 401 means bad credentials.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, ClientError> {
        self.request(ApiRequest::post(path).json(body)?.anonymous())
            .await
    }

    /// GET a path and decode a JSON body, turning non-2xx into `ClientError::Api`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.authenticated_get(path).await?;
        decode_json(resp).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await.map_err(|e| {
            log::debug!("{} {} failed: {}", request.method, request.path, e);
            ClientError::from(e)
        })?;
        log::debug!("{} {} -> {}", request.method, request.path, resp.status());
        Ok(resp)
    }
}

/// Decode a JSON body from a successful response; non-2xx becomes `ClientError::Api`.
pub async fn decode_json<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    resp.json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}
