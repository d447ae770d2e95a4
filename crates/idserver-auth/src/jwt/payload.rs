//! JWS claim-set model.
//!
//! [`JwsPayload`] keeps the standard JWT/OIDC claims as typed fields and
//! carries every non-standard claim in a flattened extension map, so
//! arbitrary claim sets round-trip losslessly through serialization while
//! the common claims stay statically typed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `aud` claim: a single string or an array of strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience value.
    Single(String),
    /// Multiple audience values.
    Multiple(Vec<String>),
}

impl Audience {
    /// Checks if the audience contains the specified value.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(s) => s == value,
            Self::Multiple(values) => values.iter().any(|s| s == value),
        }
    }

    /// Returns the number of audience values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(values) => values.len(),
        }
    }

    /// Returns `true` if there are no audience values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<String>> for Audience {
    fn from(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Multiple(values)
        }
    }
}

/// Resource-owner claim names used for token-reuse matching.
///
/// Two claim sets are considered equivalent for reuse purposes when they
/// agree on exactly these claims; volatile claims (`exp`, `iat`, `jti`)
/// are deliberately excluded.
pub const STANDARD_RESOURCE_OWNER_CLAIMS: &[&str] = &[
    "sub",
    "name",
    "given_name",
    "family_name",
    "middle_name",
    "nickname",
    "preferred_username",
    "profile",
    "picture",
    "website",
    "email",
    "email_verified",
    "gender",
    "birthdate",
    "zoneinfo",
    "locale",
    "phone_number",
    "phone_number_verified",
    "address",
    "updated_at",
    "role",
];

/// A JWS claim set.
///
/// Standard claims are typed fields; anything else lives in the flattened
/// `claims` map. `None` fields are omitted from serialization, so the
/// serialized form contains exactly the claims that were set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JwsPayload {
    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Expiration time (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Nonce from the authorization request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Time of the end-user authentication (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,

    /// Authentication context class reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,

    /// Authentication methods references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,

    /// Authorized party (present when the audience has multiple values).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Non-standard claims, keyed by claim name.
    #[serde(flatten)]
    pub claims: BTreeMap<String, Value>,
}

impl JwsPayload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a claim by name, whether it is a typed
    /// standard claim or an extension claim.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<Value> {
        match name {
            "iss" => self.iss.as_ref().map(|v| Value::String(v.clone())),
            "sub" => self.sub.as_ref().map(|v| Value::String(v.clone())),
            "aud" => self
                .aud
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            "exp" => self.exp.map(Value::from),
            "iat" => self.iat.map(Value::from),
            "nonce" => self.nonce.as_ref().map(|v| Value::String(v.clone())),
            "auth_time" => self.auth_time.map(Value::from),
            "acr" => self.acr.as_ref().map(|v| Value::String(v.clone())),
            "amr" => self
                .amr
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            "azp" => self.azp.as_ref().map(|v| Value::String(v.clone())),
            other => self.claims.get(other).cloned(),
        }
    }

    /// Sets an extension claim.
    pub fn set_claim(&mut self, name: impl Into<String>, value: Value) {
        self.claims.insert(name.into(), value);
    }

    /// Compares two payloads on the standard resource-owner claims only.
    ///
    /// Used by the token-reuse lookup: repeated grants for the same subject
    /// and profile data can share a still-valid token even though volatile
    /// claims (`exp`, `iat`) differ between mints.
    #[must_use]
    pub fn matches_standard_claims(&self, other: &JwsPayload) -> bool {
        STANDARD_RESOURCE_OWNER_CLAIMS
            .iter()
            .all(|name| self.claim(name) == other.claim(name))
    }
}
