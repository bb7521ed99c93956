//! Request and response types for the marketplace auth API.
//!
//! All structs use camelCase serialization to match the API's JSON format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{Session, UserRole, UserSummary};

/// Login request body sent to POST /api/auth/login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request body sent to POST /api/auth/register.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

/// Third-party identity login sent to POST /api/auth/external-login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLoginRequest {
    /// Identity provider name (e.g. "Google").
    pub provider: String,
    /// ID token issued by the provider.
    pub id_token: String,
}

/// Email confirmation sent to POST /api/auth/confirm-email.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmEmailRequest {
    pub user_id: String,
    pub token: String,
}

/// Invitation acceptance sent to POST /api/auth/accept-invitation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptInvitationRequest {
    pub token: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Refresh request body sent to POST /api/auth/refresh-token.
///
/// The server requires the expired access token alongside the refresh token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub access_token: String,
    pub refresh_token: String,
}

/// Revocation request body sent to POST /api/auth/revoke-token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeTokenRequest {
    pub refresh_token: String,
}

/// Token bundle returned by every session-issuing endpoint.
///
/// `/refresh-token` omits `user`; `expiresAt` may be missing or lack an offset.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, deserialize_with = "expires_at::deserialize")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<UserSummary>,
}

impl AuthResponse {
    /// Turn a login-style response into a `Session`. `None` if the server sent no user.
    pub fn into_session(self) -> Option<Session> {
        let user = self.user?;
        Some(Session::new(
            self.access_token,
            self.refresh_token,
            self.expires_at,
            user,
        ))
    }
}

/// Lenient `expiresAt` parsing: RFC 3339, or a bare timestamp taken as UTC.
mod expires_at {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        parse(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid expiresAt: {}", raw)))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_login_response_into_session() {
        let resp: AuthResponse = serde_json::from_value(serde_json::json!({
            "accessToken": "at1",
            "refreshToken": "rt1",
            "expiresAt": "2030-01-01T00:00:00+02:00",
            "user": { "id": "u-1", "email": "ada@example.com", "role": "Admin" }
        }))
        .unwrap();

        let session = resp.into_session().unwrap();
        assert_eq!(session.access_token, "at1");
        assert_eq!(
            session.expires_at,
            Some(Utc.with_ymd_and_hms(2029, 12, 31, 22, 0, 0).unwrap())
        );
        assert_eq!(session.user.role, Some(UserRole::Admin));
    }

    #[test]
    fn test_refresh_response_without_user() {
        let resp: AuthResponse = serde_json::from_value(serde_json::json!({
            "accessToken": "at2",
            "refreshToken": "rt2"
        }))
        .unwrap();
        assert_eq!(resp.expires_at, None);
        assert!(resp.into_session().is_none());
    }

    #[test]
    fn test_expires_at_without_offset_is_utc() {
        assert_eq!(
            expires_at::parse("2030-01-01T08:30:00.1234567"),
            Some(
                Utc.with_ymd_and_hms(2030, 1, 1, 8, 30, 0).unwrap()
                    + chrono::Duration::nanoseconds(123_456_700)
            )
        );
        assert_eq!(expires_at::parse("next tuesday"), None);
    }

    #[test]
    fn test_refresh_request_shape() {
        let body = serde_json::to_value(RefreshTokenRequest {
            access_token: "at1".into(),
            refresh_token: "rt1".into(),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "accessToken": "at1", "refreshToken": "rt1" })
        );
    }

    #[test]
    fn test_register_request_role_serialization() {
        let body = serde_json::to_value(RegisterRequest {
            email: "c@example.com".into(),
            password: "pw".into(),
            first_name: "C".into(),
            last_name: "D".into(),
            role: UserRole::Client,
        })
        .unwrap();
        assert_eq!(body["role"], "Client");
        assert_eq!(body["firstName"], "C");
    }
}
