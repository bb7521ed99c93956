//! Session endpoints of the marketplace auth API.
//!
//! Every session-issuing call returns `{accessToken, refreshToken, expiresAt, user}`
//! and installs the resulting session in the client's token store.

use reqwest::Client;
use serde::Serialize;

use super::client::{ApiClient, ApiRequest};
use super::types::{
    AcceptInvitationRequest, AuthResponse, ConfirmEmailRequest, ExternalLoginRequest,
    LoginRequest, RefreshTokenRequest, RegisterRequest, RevokeTokenRequest,
};
use crate::error::{ClientError, RefreshError};
use crate::session::{TokenPair, UserSummary};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const REFRESH_TOKEN_PATH: &str = "/api/auth/refresh-token";
pub const REVOKE_TOKEN_PATH: &str = "/api/auth/revoke-token";
pub const EXTERNAL_LOGIN_PATH: &str = "/api/auth/external-login";
pub const CONFIRM_EMAIL_PATH: &str = "/api/auth/confirm-email";
pub const ACCEPT_INVITATION_PATH: &str = "/api/auth/accept-invitation";

/// POST /api/auth/login
pub async fn login(client: &ApiClient, request: &LoginRequest) -> Result<UserSummary, ClientError> {
    log::info!("Logging in");
    issue_session(client, LOGIN_PATH, request).await
}

/// POST /api/auth/register
pub async fn register(
    client: &ApiClient,
    request: &RegisterRequest,
) -> Result<UserSummary, ClientError> {
    log::info!("Registering new {:?} account", request.role);
    issue_session(client, REGISTER_PATH, request).await
}

/// POST /api/auth/external-login
pub async fn external_login(
    client: &ApiClient,
    request: &ExternalLoginRequest,
) -> Result<UserSummary, ClientError> {
    log::info!("Logging in via {}", request.provider);
    issue_session(client, EXTERNAL_LOGIN_PATH, request).await
}

/// POST /api/auth/confirm-email
pub async fn confirm_email(
    client: &ApiClient,
    request: &ConfirmEmailRequest,
) -> Result<UserSummary, ClientError> {
    issue_session(client, CONFIRM_EMAIL_PATH, request).await
}

/// POST /api/auth/accept-invitation
pub async fn accept_invitation(
    client: &ApiClient,
    request: &AcceptInvitationRequest,
) -> Result<UserSummary, ClientError> {
    issue_session(client, ACCEPT_INVITATION_PATH, request).await
}

/// POST /api/auth/revoke-token with the stored refresh token.
///
/// Sent with the bearer token but never renews: a dead session has nothing
/// left to revoke. No-op when there is no session.
pub async fn revoke_token(client: &ApiClient) -> Result<(), ClientError> {
    let Some(refresh_token) = client.tokens().refresh_token().await else {
        return Ok(());
    };

    let request = ApiRequest::post(REVOKE_TOKEN_PATH)
        .json(&RevokeTokenRequest { refresh_token })?
        .without_renewal();
    let resp = client.request(request).await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    Ok(())
}

/// Logout: revoke the refresh token, then clear the token store and persisted session.
///
/// The revoke call is best-effort; an unreachable server does not block logout.
pub async fn logout(client: &ApiClient) {
    log::info!("Logging out");

    if let Err(e) = revoke_token(client).await {
        log::warn!("Revoke request failed (will continue local cleanup): {}", e);
    }
    client.tokens().clear().await;

    log::info!("Logout complete");
}

async fn issue_session<T: Serialize>(
    client: &ApiClient,
    path: &str,
    request: &T,
) -> Result<UserSummary, ClientError> {
    let resp = client.post(path, request).await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }

    let issued: AuthResponse = resp
        .json()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))?;
    let session = issued
        .into_session()
        .ok_or_else(|| ClientError::Decode("response has no user".to_string()))?;
    let user = session.user.clone();

    client.tokens().install(session).await?;
    log::info!("Session started for user {}", user.id);
    Ok(user)
}

/// Exchange the stored token pair for a new one. Sends no bearer header.
pub(crate) async fn request_refresh(
    http: &Client,
    base_url: &str,
    pair: &TokenPair,
) -> Result<AuthResponse, RefreshError> {
    let url = format!("{}{}", base_url, REFRESH_TOKEN_PATH);
    let body = RefreshTokenRequest {
        access_token: pair.access_token.clone(),
        refresh_token: pair.refresh_token.clone(),
    };

    let resp = http
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| RefreshError::Network(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        return Err(RefreshError::Rejected { status, body });
    }

    resp.json()
        .await
        .map_err(|e| RefreshError::Decode(e.to_string()))
}
