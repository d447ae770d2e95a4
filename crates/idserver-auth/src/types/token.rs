//! Issued grants: authorization codes and granted tokens.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::jwt::JwsPayload;
use crate::oauth::pkce::CodeChallengeMethod;

/// A pending authorization code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// The opaque code value.
    pub code: String,

    /// Client the code was issued to.
    pub client_id: String,

    /// Redirect URI from the authorization request; the token request must
    /// repeat it exactly.
    pub redirect_uri: String,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Authenticated resource owner.
    pub subject: String,

    /// ID token claims captured at authorization time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_payload: Option<JwsPayload>,

    /// Userinfo claims captured at authorization time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_payload: Option<JwsPayload>,

    /// PKCE code challenge, if the authorization request carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<CodeChallengeMethod>,

    /// Nonce from the authorization request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// When the code was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AuthorizationCode {
    /// Returns `true` if the code has outlived the given lifetime.
    #[must_use]
    pub fn is_expired(&self, lifetime: std::time::Duration, now: OffsetDateTime) -> bool {
        now - self.created_at > lifetime
    }
}

/// A granted access token with its associated material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantedToken {
    /// Internal identifier.
    pub id: String,

    /// Client the token was granted to.
    pub client_id: String,

    /// The access token value.
    pub access_token: String,

    /// The refresh token value, when the grant produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type; always `Bearer`.
    pub token_type: String,

    /// Lifetime in seconds.
    pub expires_in: u64,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Serialized ID token, for OpenID Connect grants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Claims that went into the ID token; used for reuse matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_payload: Option<JwsPayload>,

    /// Claims backing the userinfo response; used for reuse matching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_payload: Option<JwsPayload>,

    /// When the token was minted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl GrantedToken {
    /// Returns `true` if the token is still within its lifetime.
    #[must_use]
    pub fn is_alive(&self, now: OffsetDateTime) -> bool {
        now - self.created_at < std::time::Duration::from_secs(self.expires_in)
    }

    /// Returns the scope list as a space-delimited string.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_code_expiry() {
        let code = AuthorizationCode {
            code: "abc".to_string(),
            client_id: "c1".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            scopes: vec!["openid".to_string()],
            subject: "user-1".to_string(),
            id_token_payload: None,
            userinfo_payload: None,
            code_challenge: None,
            code_challenge_method: None,
            nonce: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let now = OffsetDateTime::now_utc();
        assert!(!code.is_expired(Duration::from_secs(600), now));
        assert!(code.is_expired(Duration::from_secs(600), now + Duration::from_secs(601)));
    }

    #[test]
    fn test_token_liveness() {
        let token = GrantedToken {
            id: "t1".to_string(),
            client_id: "c1".to_string(),
            access_token: "at".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scopes: vec!["openid".to_string(), "profile".to_string()],
            id_token: None,
            id_token_payload: None,
            userinfo_payload: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let now = OffsetDateTime::now_utc();
        assert!(token.is_alive(now));
        assert!(!token.is_alive(now + Duration::from_secs(3601)));
        assert_eq!(token.scope_string(), "openid profile");
    }
}
