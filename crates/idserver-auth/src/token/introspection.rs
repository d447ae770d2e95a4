//! Token introspection (RFC 7662).
//!
//! Lets resource servers ask whether a token is active and retrieve its
//! metadata. An invalid, expired, or unknown token answers with
//! `active: false` and nothing else; the response never says why.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::TokenStore;
use crate::types::GrantedToken;

/// Hint about the kind of token being introspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    /// The token is an access token.
    AccessToken,
    /// The token is a refresh token.
    RefreshToken,
}

/// Introspection request per RFC 7662.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectionRequest {
    /// The token to introspect.
    pub token: String,

    /// Optional hint; only affects lookup order, a wrong hint still
    /// finds the token.
    #[serde(default)]
    pub token_type_hint: Option<TokenTypeHint>,
}

/// Introspection response per RFC 7662.
///
/// `active` is the only field an inactive token carries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active.
    pub active: bool,

    /// Space-separated scopes granted to the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Client the token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Token type, "Bearer" for tokens minted here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Expiration time as a Unix timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issue time as a Unix timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Subject the grant acts for; absent for client credentials grants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl IntrospectionResponse {
    fn inactive() -> Self {
        Self::default()
    }
}

/// Answers introspection requests from the grant store.
pub struct IntrospectionService {
    store: Arc<TokenStore>,
}

impl IntrospectionService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self { store }
    }

    /// Introspects a token.
    ///
    /// The caller is expected to have authenticated the requesting
    /// client already; this method never fails, it answers
    /// `active: false` for anything it cannot vouch for.
    #[must_use]
    pub fn introspect(&self, request: &IntrospectionRequest) -> IntrospectionResponse {
        let Some(token) = self.lookup(&request.token, request.token_type_hint) else {
            return IntrospectionResponse::inactive();
        };
        if !token.is_alive(OffsetDateTime::now_utc()) {
            return IntrospectionResponse::inactive();
        }

        let iat = token.created_at.unix_timestamp();
        IntrospectionResponse {
            active: true,
            scope: Some(token.scope_string()),
            client_id: Some(token.client_id.clone()),
            token_type: Some(token.token_type.clone()),
            exp: Some(iat + token.expires_in as i64),
            iat: Some(iat),
            sub: subject(&token),
        }
    }

    fn lookup(&self, value: &str, hint: Option<TokenTypeHint>) -> Option<GrantedToken> {
        match hint {
            Some(TokenTypeHint::RefreshToken) => self
                .store
                .get_by_refresh_token(value)
                .or_else(|| self.store.get_by_access_token(value)),
            _ => self
                .store
                .get_by_access_token(value)
                .or_else(|| self.store.get_by_refresh_token(value)),
        }
    }
}

fn subject(token: &GrantedToken) -> Option<String> {
    token
        .id_token_payload
        .as_ref()
        .and_then(|p| p.sub.clone())
        .or_else(|| token.userinfo_payload.as_ref().and_then(|p| p.sub.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwsPayload;
    use std::time::Duration;

    fn granted_token(subject: Option<&str>) -> GrantedToken {
        GrantedToken {
            id: "t1".to_string(),
            client_id: "c1".to_string(),
            access_token: "at-t1".to_string(),
            refresh_token: Some("rt-t1".to_string()),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scopes: vec!["openid".to_string(), "profile".to_string()],
            id_token: None,
            id_token_payload: subject.map(|sub| JwsPayload {
                sub: Some(sub.to_string()),
                ..Default::default()
            }),
            userinfo_payload: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn service_with(token: GrantedToken) -> IntrospectionService {
        let store = Arc::new(TokenStore::new());
        store.add_token(token).unwrap();
        IntrospectionService::new(store)
    }

    #[test]
    fn test_active_token_carries_metadata() {
        let service = service_with(granted_token(Some("user-1")));
        let response = service.introspect(&IntrospectionRequest {
            token: "at-t1".to_string(),
            token_type_hint: None,
        });

        assert!(response.active);
        assert_eq!(response.scope.as_deref(), Some("openid profile"));
        assert_eq!(response.client_id.as_deref(), Some("c1"));
        assert_eq!(response.token_type.as_deref(), Some("Bearer"));
        assert_eq!(response.sub.as_deref(), Some("user-1"));
        assert_eq!(response.exp.unwrap() - response.iat.unwrap(), 3600);
    }

    #[test]
    fn test_unknown_token_is_inactive_without_metadata() {
        let service = service_with(granted_token(None));
        let response = service.introspect(&IntrospectionRequest {
            token: "no-such-token".to_string(),
            token_type_hint: None,
        });

        assert!(!response.active);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({ "active": false }));
    }

    #[test]
    fn test_expired_token_is_inactive() {
        let mut token = granted_token(None);
        token.created_at = OffsetDateTime::now_utc() - Duration::from_secs(7200);
        let service = service_with(token);

        let response = service.introspect(&IntrospectionRequest {
            token: "at-t1".to_string(),
            token_type_hint: None,
        });
        assert!(!response.active);
    }

    #[test]
    fn test_hint_does_not_hide_the_token() {
        let service = service_with(granted_token(None));

        // Refresh token found without a hint
        let response = service.introspect(&IntrospectionRequest {
            token: "rt-t1".to_string(),
            token_type_hint: None,
        });
        assert!(response.active);

        // Access token found despite a refresh hint
        let response = service.introspect(&IntrospectionRequest {
            token: "at-t1".to_string(),
            token_type_hint: Some(TokenTypeHint::RefreshToken),
        });
        assert!(response.active);
    }
}
