//! Policy decisions for permission tickets.
//!
//! A ticket authorizes when every requested permission line is granted by
//! at least one policy rule. A rule grants when the line's scopes fall
//! inside the rule's, the requesting client is in the allow list, and the
//! claims the rule demands are present in a verified claim token. Missing
//! claims produce `need_info`; a rule that requires resource owner
//! consent produces `request_submitted` until the owner approves the
//! ticket. A line no rule can grant denies the whole ticket.

use std::sync::Arc;

use idserver_auth::jwt::JwsPayload;
use idserver_auth::{AuthError, AuthResult, JsonWebKeyStorage, JwsEngine};
use serde_json::Value;

use crate::config::UmaConfig;
use crate::storage::PolicyStorage;
use crate::types::{AuthorizationDecision, PolicyRule, RequiredClaim, Ticket, TicketLine};

/// Outcome of evaluating one line against the rules.
enum LineOutcome {
    Granted,
    Denied,
    NeedInfo(Vec<RequiredClaim>),
    ConsentPending,
}

/// Evaluates permission tickets against the stored policies.
pub struct PolicyEvaluator {
    policies: Arc<dyn PolicyStorage>,
    keys: Arc<dyn JsonWebKeyStorage>,
    config: Arc<UmaConfig>,
}

impl PolicyEvaluator {
    /// Creates the evaluator.
    ///
    /// `keys` holds the server signing keys; claim tokens must verify
    /// against one of them.
    pub fn new(
        policies: Arc<dyn PolicyStorage>,
        keys: Arc<dyn JsonWebKeyStorage>,
        config: Arc<UmaConfig>,
    ) -> Self {
        Self {
            policies,
            keys,
            config,
        }
    }

    /// Decides whether the ticket's permissions are granted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGrant` for expired tickets and tickets presented
    /// by a client other than the one they were issued to.
    pub async fn evaluate(
        &self,
        ticket: &Ticket,
        client_id: &str,
        claim_token: Option<&str>,
    ) -> AuthResult<AuthorizationDecision> {
        let now = time::OffsetDateTime::now_utc();
        if ticket.is_expired(now) {
            return Err(AuthError::invalid_grant("ticket has expired"));
        }
        if ticket.client_id != client_id {
            tracing::warn!(
                ticket_id = %ticket.id,
                issued_to = %ticket.client_id,
                presented_by = %client_id,
                "ticket presented by the wrong client"
            );
            return Err(AuthError::invalid_grant("ticket is not valid"));
        }

        let claims = match claim_token {
            Some(token) => self.verify_claim_token(token).await,
            None => None,
        };

        let mut missing_claims: Vec<RequiredClaim> = Vec::new();
        let mut consent_pending = false;
        let mut denied = false;

        for line in &ticket.lines {
            match self.evaluate_line(line, client_id, claims.as_ref()).await? {
                LineOutcome::Granted => {}
                LineOutcome::NeedInfo(required) => {
                    for claim in required {
                        if !missing_claims.contains(&claim) {
                            missing_claims.push(claim);
                        }
                    }
                }
                LineOutcome::ConsentPending => consent_pending = true,
                LineOutcome::Denied => denied = true,
            }
        }

        // A flatly denied line cannot be cured by more claims or by
        // consent, so it decides the whole ticket.
        let decision = if denied {
            tracing::warn!(ticket_id = %ticket.id, %client_id, "permission denied by policy");
            AuthorizationDecision::NotAuthorized
        } else if !missing_claims.is_empty() {
            AuthorizationDecision::NeedInfo {
                required_claims: missing_claims,
                issuer: self.config.issuer.clone(),
            }
        } else if consent_pending {
            AuthorizationDecision::RequestSubmitted
        } else {
            AuthorizationDecision::Authorized
        };
        Ok(decision)
    }

    async fn evaluate_line(
        &self,
        line: &TicketLine,
        client_id: &str,
        claims: Option<&JwsPayload>,
    ) -> AuthResult<LineOutcome> {
        let policies = self
            .policies
            .find_by_resource_set(&line.resource_set_id)
            .await?;

        // A resource set nobody attached a policy to is unrestricted.
        if policies.iter().all(|p| p.rules.is_empty()) {
            return Ok(LineOutcome::Granted);
        }

        let mut need_info: Option<Vec<RequiredClaim>> = None;
        let mut consent_pending = false;

        for rule in policies.iter().flat_map(|p| &p.rules) {
            if !line.scopes.iter().all(|s| rule.scopes.contains(s)) {
                continue;
            }
            // An empty allow list admits no client.
            if !rule.client_ids_allowed.iter().any(|c| c == client_id) {
                continue;
            }

            match check_claims(rule, claims) {
                ClaimCheck::Satisfied => {
                    if rule.is_resource_owner_consent_needed && !line.is_authorized_by_ro {
                        consent_pending = true;
                        continue;
                    }
                    return Ok(LineOutcome::Granted);
                }
                ClaimCheck::Missing(required) => {
                    need_info.get_or_insert_with(Vec::new).extend(required);
                }
                ClaimCheck::Mismatched => {}
            }
        }

        if let Some(required) = need_info {
            Ok(LineOutcome::NeedInfo(required))
        } else if consent_pending {
            Ok(LineOutcome::ConsentPending)
        } else {
            Ok(LineOutcome::Denied)
        }
    }

    /// Verifies a claim token against the server signing keys.
    async fn verify_claim_token(&self, token: &str) -> Option<JwsPayload> {
        let keys = self.keys.list_signing_keys().await.ok()?;
        for key in keys {
            if let Ok(payload) = JwsEngine::verify(token, &key) {
                return Some(payload);
            }
        }
        tracing::debug!("claim token did not verify against any signing key");
        None
    }
}

enum ClaimCheck {
    Satisfied,
    Missing(Vec<RequiredClaim>),
    Mismatched,
}

fn check_claims(rule: &PolicyRule, claims: Option<&JwsPayload>) -> ClaimCheck {
    if rule.claims.is_empty() {
        return ClaimCheck::Satisfied;
    }
    let Some(payload) = claims else {
        return ClaimCheck::Missing(rule.claims.clone());
    };

    let mut missing = Vec::new();
    let mut mismatched = false;
    for required in &rule.claims {
        match payload.claim(&required.name) {
            None => missing.push(required.clone()),
            Some(value) => {
                if !claim_value_matches(&required.name, &value, &required.value) {
                    mismatched = true;
                }
            }
        }
    }

    if !missing.is_empty() {
        ClaimCheck::Missing(missing)
    } else if mismatched {
        ClaimCheck::Mismatched
    } else {
        ClaimCheck::Satisfied
    }
}

/// The `role` claim may arrive as a comma-separated string or an array;
/// any element matching the expected value satisfies the requirement.
fn claim_value_matches(name: &str, value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) if name == "role" => s.split(',').any(|part| part.trim() == expected),
        Value::String(s) => s == expected,
        Value::Array(items) => items
            .iter()
            .any(|item| item.as_str() == Some(expected)),
        _ => false,
    }
}
