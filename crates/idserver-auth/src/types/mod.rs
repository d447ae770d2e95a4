//! Core domain types.

pub mod client;
pub mod token;

pub use client::{
    Client, ClientSecret, GrantType, ResponseType, TokenEndpointAuthMethod,
};
pub use token::{AuthorizationCode, GrantedToken};

use serde::{Deserialize, Serialize};

/// A registered scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    /// Scope name.
    pub name: String,

    /// Description shown on consent screens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Claim names released when the scope is granted.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub claims: Vec<String>,

    /// OpenID Connect scopes contribute claims to ID tokens.
    #[serde(default)]
    pub is_openid_scope: bool,
}

/// A resource owner (end user).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOwner {
    /// Subject identifier.
    pub subject: String,

    /// SHA-256 digest of the password, hex encoded.
    pub password_digest: String,

    /// Profile claims released through scopes.
    #[serde(default)]
    pub claims: std::collections::BTreeMap<String, serde_json::Value>,
}

/// A recorded consent decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consent {
    /// Consent identifier.
    pub id: String,

    /// Resource owner who granted the consent.
    pub subject: String,

    /// Client the consent applies to.
    pub client_id: String,

    /// Scopes the resource owner approved.
    pub granted_scopes: Vec<String>,

    /// Claim names the resource owner approved.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub granted_claims: Vec<String>,
}

impl Consent {
    /// Returns `true` if this consent covers all the requested scopes.
    #[must_use]
    pub fn covers_scopes(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.granted_scopes.contains(s))
    }
}
