//! Authorization endpoint logic.
//!
//! Validates authorization requests, applies the consent rules, and
//! produces either a consent prompt or a redirect carrying the requested
//! grant material (code, access token, ID token) in the response mode the
//! requested response types dictate.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::IdServerConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwt::JwsPayload;
use crate::oauth::pkce::CodeChallengeMethod;
use crate::store::TokenStore;
use crate::storage::{ClientStorage, ConsentStorage, ResourceOwnerStorage, ScopeStorage};
use crate::token::IdTokenBuilder;
use crate::types::{AuthorizationCode, Client, Consent, GrantedToken, ResponseType};

/// How grant parameters travel back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Parameters in the redirect URI query string.
    Query,
    /// Parameters in the redirect URI fragment.
    Fragment,
    /// Parameters posted as a form.
    FormPost,
}

/// Maps a response type set to its default response mode.
///
/// `code` alone redirects with query parameters; any combination that
/// issues a token (`token` or `id_token`) uses the fragment. An empty set
/// has no mode and is rejected.
pub fn response_mode_for(response_types: &[ResponseType]) -> AuthResult<ResponseMode> {
    if response_types.is_empty() {
        return Err(AuthError::unsupported_response_type(""));
    }
    let issues_token = response_types
        .iter()
        .any(|rt| matches!(rt, ResponseType::Token | ResponseType::IdToken));
    if issues_token {
        Ok(ResponseMode::Fragment)
    } else {
        Ok(ResponseMode::Query)
    }
}

/// A validated authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Requesting client.
    pub client_id: String,

    /// Redirect URI; must match a registered URI exactly.
    pub redirect_uri: String,

    /// Requested response types.
    pub response_types: Vec<ResponseType>,

    /// Requested scopes.
    pub scopes: Vec<String>,

    /// Opaque state echoed back to the client.
    pub state: Option<String>,

    /// OpenID Connect nonce.
    pub nonce: Option<String>,

    /// PKCE code challenge.
    pub code_challenge: Option<String>,

    /// PKCE challenge method; defaults to `S256` when a challenge is
    /// present without one.
    pub code_challenge_method: Option<CodeChallengeMethod>,

    /// Explicit response mode override.
    pub response_mode: Option<ResponseMode>,
}

/// Outcome of an authorization request.
#[derive(Debug, Clone)]
pub enum AuthorizeDecision {
    /// No stored consent covers the request; the resource owner must be
    /// prompted.
    RequiresConsent {
        /// Scopes awaiting approval.
        scopes: Vec<String>,
    },
    /// Redirect back to the client with grant parameters.
    Redirect(AuthorizeRedirect),
}

/// A redirect carrying grant parameters.
#[derive(Debug, Clone)]
pub struct AuthorizeRedirect {
    /// Destination URI.
    pub redirect_uri: String,

    /// How the parameters are transported.
    pub response_mode: ResponseMode,

    /// Grant parameters in emission order.
    pub parameters: Vec<(String, String)>,
}

impl AuthorizeRedirect {
    /// Returns a parameter value by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Runs the authorization endpoint flow for an authenticated resource
/// owner.
pub struct AuthorizeService {
    clients: Arc<dyn ClientStorage>,
    consents: Arc<dyn ConsentStorage>,
    resource_owners: Arc<dyn ResourceOwnerStorage>,
    scopes: Arc<dyn ScopeStorage>,
    store: Arc<TokenStore>,
    id_tokens: Arc<IdTokenBuilder>,
    config: Arc<IdServerConfig>,
}

impl AuthorizeService {
    /// Creates the service.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clients: Arc<dyn ClientStorage>,
        consents: Arc<dyn ConsentStorage>,
        resource_owners: Arc<dyn ResourceOwnerStorage>,
        scopes: Arc<dyn ScopeStorage>,
        store: Arc<TokenStore>,
        id_tokens: Arc<IdTokenBuilder>,
        config: Arc<IdServerConfig>,
    ) -> Self {
        Self {
            clients,
            consents,
            resource_owners,
            scopes,
            store,
            id_tokens,
            config,
        }
    }

    /// Processes an authorization request for an authenticated subject.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for unknown clients or unregistered
    /// redirect URIs, `UnauthorizedClient` for response types outside the
    /// client's registration, `InvalidScope` for scopes outside the
    /// client's allowed set, and `UnsupportedResponseType` for an empty
    /// response type set.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        subject: &str,
    ) -> AuthResult<AuthorizeDecision> {
        let (client, default_mode) = self.validate_request(request).await?;
        // An explicit request parameter may override the default mode.
        let response_mode = request.response_mode.unwrap_or(default_mode);

        let consents = self
            .consents
            .find_by_subject_and_client(subject, &client.client_id)
            .await?;
        let covered = consents.iter().any(|c| c.covers_scopes(&request.scopes));
        if !covered {
            return Ok(AuthorizeDecision::RequiresConsent {
                scopes: request.scopes.clone(),
            });
        }

        let claims = self.released_claims(subject, &request.scopes).await?;
        let id_token_payload = self
            .id_tokens
            .build_payload(subject, &claims, &client, request.nonce.as_deref())
            .await?;
        let userinfo_payload = userinfo_payload(subject, &claims);

        let mut parameters = Vec::new();

        if request.response_types.contains(&ResponseType::Code) {
            let code = AuthorizationCode {
                code: Uuid::new_v4().to_string(),
                client_id: client.client_id.clone(),
                redirect_uri: request.redirect_uri.clone(),
                scopes: request.scopes.clone(),
                subject: subject.to_string(),
                id_token_payload: Some(id_token_payload.clone()),
                userinfo_payload: Some(userinfo_payload.clone()),
                code_challenge: request.code_challenge.clone(),
                code_challenge_method: request
                    .code_challenge
                    .is_some()
                    .then(|| {
                        request
                            .code_challenge_method
                            .unwrap_or(CodeChallengeMethod::S256)
                    }),
                nonce: request.nonce.clone(),
                created_at: OffsetDateTime::now_utc(),
            };
            parameters.push(("code".to_string(), code.code.clone()));
            self.store.add_code(code)?;
        }

        if request.response_types.contains(&ResponseType::Token) {
            let token = GrantedToken {
                id: Uuid::new_v4().to_string(),
                client_id: client.client_id.clone(),
                access_token: Uuid::new_v4().to_string(),
                refresh_token: None,
                token_type: "Bearer".to_string(),
                expires_in: self.config.oauth.access_token_lifetime.as_secs(),
                scopes: request.scopes.clone(),
                id_token: None,
                id_token_payload: Some(id_token_payload.clone()),
                userinfo_payload: Some(userinfo_payload.clone()),
                created_at: OffsetDateTime::now_utc(),
            };
            parameters.push(("access_token".to_string(), token.access_token.clone()));
            parameters.push(("token_type".to_string(), "Bearer".to_string()));
            parameters.push(("expires_in".to_string(), token.expires_in.to_string()));
            self.store.add_token(token)?;
        }

        if request.response_types.contains(&ResponseType::IdToken) {
            let id_token = self.id_tokens.sign(&id_token_payload, &client).await?;
            parameters.push(("id_token".to_string(), id_token));
        }

        if let Some(state) = &request.state {
            parameters.push(("state".to_string(), state.clone()));
        }

        tracing::info!(
            client_id = %client.client_id,
            %subject,
            response_mode = ?response_mode,
            "authorization granted"
        );

        Ok(AuthorizeDecision::Redirect(AuthorizeRedirect {
            redirect_uri: request.redirect_uri.clone(),
            response_mode,
            parameters,
        }))
    }

    /// Persists the resource owner's approval of the requested scopes
    /// and resumes the flow.
    ///
    /// Called after [`Self::authorize`] answered
    /// [`AuthorizeDecision::RequiresConsent`] and the owner approved.
    /// The stored consent also covers later requests for the same or a
    /// smaller scope set.
    ///
    /// # Errors
    ///
    /// Same validation errors as [`Self::authorize`].
    pub async fn grant_consent(
        &self,
        request: &AuthorizationRequest,
        subject: &str,
    ) -> AuthResult<AuthorizeDecision> {
        let (client, _) = self.validate_request(request).await?;

        let scopes = self.scopes.resolve(&request.scopes).await?;
        let granted_claims: Vec<String> = scopes
            .iter()
            .flat_map(|s| s.claims.iter().cloned())
            .collect();
        self.consents
            .insert(&Consent {
                id: Uuid::new_v4().to_string(),
                subject: subject.to_string(),
                client_id: client.client_id.clone(),
                granted_scopes: request.scopes.clone(),
                granted_claims,
            })
            .await?;
        tracing::info!(client_id = %client.client_id, %subject, "consent recorded");

        self.authorize(request, subject).await
    }

    /// Checks the request against the client registration and returns
    /// the client together with the default response mode.
    async fn validate_request(
        &self,
        request: &AuthorizationRequest,
    ) -> AuthResult<(Client, ResponseMode)> {
        let client = self
            .clients
            .find_by_client_id(&request.client_id)
            .await?
            .ok_or_else(|| {
                AuthError::invalid_request(format!("unknown client '{}'", request.client_id))
            })?;

        if url::Url::parse(&request.redirect_uri).is_err() {
            return Err(AuthError::invalid_request(
                "redirect_uri is not a valid absolute URI",
            ));
        }
        if !client.has_redirect_uri(&request.redirect_uri) {
            return Err(AuthError::invalid_request(format!(
                "redirect_uri '{}' is not registered",
                request.redirect_uri
            )));
        }

        let default_mode = response_mode_for(&request.response_types)?;

        for rt in &request.response_types {
            if !client.supports_response_type(*rt) {
                return Err(AuthError::unauthorized_client(format!(
                    "client '{}' is not registered for this response type",
                    client.client_id
                )));
            }
        }

        if request.scopes.is_empty() {
            return Err(AuthError::invalid_scope("no scope requested"));
        }
        let outside: Vec<&String> = request
            .scopes
            .iter()
            .filter(|s| !client.allowed_scopes.contains(s))
            .collect();
        if !outside.is_empty() {
            return Err(AuthError::invalid_scope(format!(
                "scopes not allowed for this client: {outside:?}"
            )));
        }

        Ok((client, default_mode))
    }

    /// Collects the resource owner claims released by the requested
    /// scopes.
    async fn released_claims(
        &self,
        subject: &str,
        scope_names: &[String],
    ) -> AuthResult<BTreeMap<String, serde_json::Value>> {
        let owner = self
            .resource_owners
            .find_by_subject(subject)
            .await?
            .ok_or_else(|| AuthError::access_denied("resource owner not found"))?;

        let scopes = self.scopes.resolve(scope_names).await?;
        let released: Vec<&str> = scopes
            .iter()
            .flat_map(|s| s.claims.iter().map(String::as_str))
            .collect();

        Ok(owner
            .claims
            .into_iter()
            .filter(|(name, _)| released.contains(&name.as_str()))
            .collect())
    }
}

fn userinfo_payload(subject: &str, claims: &BTreeMap<String, serde_json::Value>) -> JwsPayload {
    let mut payload = JwsPayload {
        sub: Some(subject.to_string()),
        ..Default::default()
    };
    for (name, value) in claims {
        payload.set_claim(name.clone(), value.clone());
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_mode_table() {
        use ResponseType::*;
        assert_eq!(response_mode_for(&[Code]).unwrap(), ResponseMode::Query);
        assert_eq!(response_mode_for(&[Token]).unwrap(), ResponseMode::Fragment);
        assert_eq!(
            response_mode_for(&[IdToken]).unwrap(),
            ResponseMode::Fragment
        );
        assert_eq!(
            response_mode_for(&[Code, IdToken]).unwrap(),
            ResponseMode::Fragment
        );
        assert_eq!(
            response_mode_for(&[Code, Token, IdToken]).unwrap(),
            ResponseMode::Fragment
        );
        assert!(matches!(
            response_mode_for(&[]),
            Err(AuthError::UnsupportedResponseType { .. })
        ));
    }
}
