use serde::{Deserialize, Serialize};

/// Email/password credentials for `/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recaptcha_token: Option<String>,
}

/// OAuth authorization code handed back to `/auth/exchange`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeTokenRequest {
    pub code: String,
}

/// Body for `/auth/refresh-token` and `/auth/logout`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Profile attached to login and exchange responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub linked_providers: Vec<String>,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

/// Token pair issued by login, exchange, and refresh.
///
/// `expires_in` is optional on the wire; when absent the lifetime is read
/// from the access token's `exp` claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Claims read from the access token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    pub sub: serde_json::Value,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: i64,
}

impl AccessTokenClaims {
    /// Subject as a numeric user id; the backend emits it either as a number
    /// or as a numeric string.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        match &self.sub {
            serde_json::Value::Number(number) => number.as_i64(),
            serde_json::Value::String(text) => text.parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_response_without_expiry() {
        let json = r#"{
            "accessToken": "a.b.c",
            "refreshToken": "r",
            "tokenType": "Bearer",
            "user": {"id": 7, "email": "ann@example.com", "emailVerified": true}
        }"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.expires_in, None);
        assert_eq!(response.user.unwrap().email_verified, Some(true));
    }

    #[test]
    fn refresh_request_uses_camel_case() {
        let body = serde_json::to_string(&RefreshTokenRequest {
            refresh_token: "r-1".into(),
        })
        .unwrap();

        assert_eq!(body, r#"{"refreshToken":"r-1"}"#);
    }

    #[test]
    fn claims_subject_accepts_string_or_number() {
        let numeric: AccessTokenClaims = serde_json::from_str(r#"{"sub":42,"exp":1}"#).unwrap();
        let textual: AccessTokenClaims = serde_json::from_str(r#"{"sub":"42","exp":1}"#).unwrap();
        let opaque: AccessTokenClaims = serde_json::from_str(r#"{"sub":"ann","exp":1}"#).unwrap();

        assert_eq!(numeric.user_id(), Some(42));
        assert_eq!(textual.user_id(), Some(42));
        assert_eq!(opaque.user_id(), None);
    }
}
