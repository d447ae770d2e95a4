//! UMA resource sets, policies, and permission tickets.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A protected resource registered by a resource server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Resource set identifier.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    /// Resource type URI.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Scopes the resource supports; permission requests may only ask
    /// for these.
    pub scopes: Vec<String>,

    /// Subject of the resource owner.
    pub owner: String,

    /// Icon shown in consent UIs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
}

/// A claim a requesting party must present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredClaim {
    /// Claim name.
    pub name: String,

    /// Expected value.
    pub value: String,
}

/// One rule of an authorization policy.
///
/// A rule grants access when the requested scopes fall inside its scope
/// set, the requesting client is in the allow list, and every required
/// claim is presented with a matching value. An empty allow list denies
/// every client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule identifier.
    pub id: String,

    /// Clients the rule admits. Empty means no client is admitted.
    pub client_ids_allowed: Vec<String>,

    /// Scopes the rule can grant.
    pub scopes: Vec<String>,

    /// Claims the requesting party must present.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub claims: Vec<RequiredClaim>,

    /// Whether the resource owner must approve each request.
    #[serde(default)]
    pub is_resource_owner_consent_needed: bool,
}

/// An authorization policy attached to resource sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier.
    pub id: String,

    /// Resource sets the policy protects.
    pub resource_set_ids: Vec<String>,

    /// Rules; any one granting rule authorizes a request.
    pub rules: Vec<PolicyRule>,
}

/// One requested permission inside a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketLine {
    /// Target resource set.
    pub resource_set_id: String,

    /// Requested scopes.
    pub scopes: Vec<String>,

    /// Set once the resource owner approves the request out of band;
    /// consent-gated rules then grant instead of resubmitting.
    #[serde(default)]
    pub is_authorized_by_ro: bool,
}

/// A permission ticket issued to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket identifier, handed to the client.
    pub id: String,

    /// Client the ticket was issued to.
    pub client_id: String,

    /// Requested permissions.
    pub lines: Vec<TicketLine>,

    /// When the ticket was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the ticket stops being redeemable.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Ticket {
    /// Returns `true` if the ticket is past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of evaluating a ticket against the policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AuthorizationDecision {
    /// Every requested permission is granted.
    Authorized,
    /// At least one permission is denied.
    NotAuthorized,
    /// The requesting party must supply more claims.
    NeedInfo {
        /// Claims still missing or mismatched.
        required_claims: Vec<RequiredClaim>,
        /// Token issuer expected to assert the claims.
        issuer: String,
    },
    /// The resource owner must approve the request.
    RequestSubmitted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ticket_expiry() {
        let now = OffsetDateTime::now_utc();
        let ticket = Ticket {
            id: "t1".to_string(),
            client_id: "c1".to_string(),
            lines: vec![],
            created_at: now,
            expires_at: now + Duration::from_secs(300),
        };
        assert!(!ticket.is_expired(now));
        assert!(ticket.is_expired(now + Duration::from_secs(300)));
    }

    #[test]
    fn test_decision_serialization() {
        let decision = AuthorizationDecision::NeedInfo {
            required_claims: vec![RequiredClaim {
                name: "role".to_string(),
                value: "administrator".to_string(),
            }],
            issuer: "https://auth.example.com".to_string(),
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"result\":\"need_info\""));
        let back: AuthorizationDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decision);
    }
}
