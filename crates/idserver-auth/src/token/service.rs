//! Token endpoint grant handlers.
//!
//! Every handler runs after client authentication and receives the
//! authenticated [`Client`]. Grant failures surface as `invalid_grant`
//! without distinguishing their cause; an authorization code is consumed
//! the moment it is looked up, so a code that fails later validation is
//! burned rather than retryable.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::IdServerConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwt::JwsPayload;
use crate::oauth::pkce::verify_challenge;
use crate::store::TokenStore;
use crate::storage::{ResourceOwnerStorage, ScopeStorage};
use crate::token::IdTokenBuilder;
use crate::types::{Client, GrantType, GrantedToken};

/// `authorization_code` grant parameters.
#[derive(Debug, Clone)]
pub struct AuthorizationCodeGrant {
    /// The code from the authorization response.
    pub code: String,

    /// Redirect URI; must repeat the authorization request's exactly.
    pub redirect_uri: String,

    /// PKCE verifier, when the authorization request carried a challenge.
    pub code_verifier: Option<String>,
}

/// `client_credentials` grant parameters.
#[derive(Debug, Clone)]
pub struct ClientCredentialsGrant {
    /// Requested scopes.
    pub scopes: Vec<String>,
}

/// `password` grant parameters.
#[derive(Debug, Clone)]
pub struct PasswordGrant {
    /// Resource owner subject.
    pub username: String,

    /// Resource owner password.
    pub password: String,

    /// Requested scopes.
    pub scopes: Vec<String>,
}

/// `refresh_token` grant parameters.
#[derive(Debug, Clone)]
pub struct RefreshTokenGrant {
    /// The refresh token being redeemed.
    pub refresh_token: String,
}

/// Token endpoint response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,

    /// Always `Bearer`.
    pub token_type: String,

    /// Lifetime in seconds.
    pub expires_in: u64,

    /// Refresh token, when the grant produces one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scopes, space-delimited.
    pub scope: String,

    /// ID token, for OpenID Connect grants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Executes token endpoint grants.
pub struct TokenService {
    store: Arc<TokenStore>,
    resource_owners: Arc<dyn ResourceOwnerStorage>,
    scopes: Arc<dyn ScopeStorage>,
    id_tokens: Arc<IdTokenBuilder>,
    config: Arc<IdServerConfig>,
}

impl TokenService {
    /// Creates the service.
    pub fn new(
        store: Arc<TokenStore>,
        resource_owners: Arc<dyn ResourceOwnerStorage>,
        scopes: Arc<dyn ScopeStorage>,
        id_tokens: Arc<IdTokenBuilder>,
        config: Arc<IdServerConfig>,
    ) -> Self {
        Self {
            store,
            resource_owners,
            scopes,
            id_tokens,
            config,
        }
    }

    /// Redeems an authorization code.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedClient` when the client is not registered for
    /// the grant and `InvalidGrant` for every code-level failure: unknown
    /// or already-redeemed code, a code issued to another client, an
    /// expired code, a PKCE mismatch, or a redirect URI mismatch.
    pub async fn execute_authorization_code(
        &self,
        client: &Client,
        grant: &AuthorizationCodeGrant,
    ) -> AuthResult<TokenResponse> {
        self.check_grant_allowed(client, GrantType::AuthorizationCode)?;

        // Consume first: a code that fails any later check is burned.
        let code = self
            .store
            .take_code(&grant.code)
            .ok_or_else(|| AuthError::invalid_grant("authorization code is not valid"))?;

        if code.client_id != client.client_id {
            tracing::warn!(
                client_id = %client.client_id,
                issued_to = %code.client_id,
                "authorization code presented by the wrong client"
            );
            return Err(AuthError::invalid_grant("authorization code is not valid"));
        }

        let now = OffsetDateTime::now_utc();
        if code.is_expired(self.config.oauth.authorization_code_lifetime, now) {
            return Err(AuthError::invalid_grant("authorization code has expired"));
        }

        if let Some(challenge) = &code.code_challenge {
            let verifier = grant
                .code_verifier
                .as_deref()
                .ok_or_else(|| AuthError::invalid_grant("code_verifier is required"))?;
            let method = code
                .code_challenge_method
                .ok_or_else(|| AuthError::invalid_grant("authorization code is not valid"))?;
            if !verify_challenge(verifier, challenge, method) {
                return Err(AuthError::invalid_grant("code_verifier does not match"));
            }
        }

        if code.redirect_uri != grant.redirect_uri {
            return Err(AuthError::invalid_grant("redirect_uri does not match"));
        }

        let token = self.obtain_token(
            client,
            code.scopes.clone(),
            code.id_token_payload.clone(),
            code.userinfo_payload.clone(),
            true,
        )?;

        let id_token = match &code.id_token_payload {
            Some(payload) if code.scopes.iter().any(|s| s == "openid") => {
                let mut payload = payload.clone();
                payload.nonce = code.nonce.clone();
                Some(self.id_tokens.sign(&payload, client).await?)
            }
            _ => None,
        };

        Ok(response(token, id_token))
    }

    /// Executes the client credentials grant.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedClient` when the client is not registered for
    /// the grant and `InvalidScope` when no requested scope survives the
    /// client's allowed set.
    pub async fn execute_client_credentials(
        &self,
        client: &Client,
        grant: &ClientCredentialsGrant,
    ) -> AuthResult<TokenResponse> {
        self.check_grant_allowed(client, GrantType::ClientCredentials)?;

        let scopes = client.filter_scopes(&grant.scopes);
        if scopes.is_empty() {
            return Err(AuthError::invalid_scope(
                "no requested scope is allowed for this client",
            ));
        }

        let token = self.obtain_token(client, scopes, None, None, false)?;
        Ok(response(token, None))
    }

    /// Executes the resource owner password grant.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedClient` when the client is not registered for
    /// the grant, `InvalidGrant` for bad resource owner credentials, and
    /// `InvalidScope` when no requested scope is allowed.
    pub async fn execute_password(
        &self,
        client: &Client,
        grant: &PasswordGrant,
    ) -> AuthResult<TokenResponse> {
        self.check_grant_allowed(client, GrantType::Password)?;

        let owner = self
            .resource_owners
            .find_by_credentials(&grant.username, &grant.password)
            .await?
            .ok_or_else(|| AuthError::invalid_grant("resource owner credentials are not valid"))?;

        let scopes = client.filter_scopes(&grant.scopes);
        if scopes.is_empty() {
            return Err(AuthError::invalid_scope(
                "no requested scope is allowed for this client",
            ));
        }

        let (id_token_payload, id_token) = if scopes.iter().any(|s| s == "openid") {
            let claims = self.released_claims(&owner.claims, &scopes).await?;
            let payload = self
                .id_tokens
                .build_payload(&owner.subject, &claims, client, None)
                .await?;
            let signed = self.id_tokens.sign(&payload, client).await?;
            (Some(payload), Some(signed))
        } else {
            (None, None)
        };

        let token = self.obtain_token(client, scopes, id_token_payload, None, true)?;
        Ok(response(token, id_token))
    }

    /// Redeems a refresh token.
    ///
    /// With rotation enabled (the default), the presented refresh token is
    /// consumed atomically and the new grant carries a fresh one, so each
    /// refresh token redeems at most once.
    ///
    /// # Errors
    ///
    /// Returns `UnauthorizedClient` when the client is not registered for
    /// the grant and `InvalidGrant` for unknown, already-rotated, or
    /// foreign refresh tokens.
    pub async fn execute_refresh_token(
        &self,
        client: &Client,
        grant: &RefreshTokenGrant,
    ) -> AuthResult<TokenResponse> {
        self.check_grant_allowed(client, GrantType::RefreshToken)?;

        let rotation = self.config.oauth.refresh_token_rotation;
        let previous = if rotation {
            self.store.take_by_refresh_token(&grant.refresh_token)
        } else {
            self.store.get_by_refresh_token(&grant.refresh_token)
        }
        .ok_or_else(|| AuthError::invalid_grant("refresh token is not valid"))?;

        if previous.client_id != client.client_id {
            // Under rotation the foreign token is already gone; that is
            // the intended containment for a leaked token.
            tracing::warn!(
                client_id = %client.client_id,
                issued_to = %previous.client_id,
                "refresh token presented by the wrong client"
            );
            return Err(AuthError::invalid_grant("refresh token is not valid"));
        }

        let token = GrantedToken {
            id: Uuid::new_v4().to_string(),
            client_id: client.client_id.clone(),
            access_token: Uuid::new_v4().to_string(),
            // Without rotation the previous grant keeps owning the
            // refresh token index; the response echoes the old value.
            refresh_token: rotation.then(|| Uuid::new_v4().to_string()),
            token_type: "Bearer".to_string(),
            expires_in: self.config.oauth.access_token_lifetime.as_secs(),
            scopes: previous.scopes.clone(),
            id_token: None,
            id_token_payload: previous.id_token_payload.clone(),
            userinfo_payload: previous.userinfo_payload.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.store.add_token(token.clone())?;

        let mut token = token;
        if !rotation {
            token.refresh_token = previous.refresh_token;
        }
        Ok(response(token, None))
    }

    /// Returns a still-valid equivalent token or mints a new one.
    fn obtain_token(
        &self,
        client: &Client,
        scopes: Vec<String>,
        id_token_payload: Option<JwsPayload>,
        userinfo_payload: Option<JwsPayload>,
        with_refresh_token: bool,
    ) -> AuthResult<GrantedToken> {
        let now = OffsetDateTime::now_utc();
        if let Some(existing) = self.store.find_reusable(
            &client.client_id,
            &scopes,
            id_token_payload.as_ref(),
            userinfo_payload.as_ref(),
            now,
        ) {
            tracing::debug!(client_id = %client.client_id, token_id = %existing.id, "reusing granted token");
            return Ok(existing);
        }

        let token = GrantedToken {
            id: Uuid::new_v4().to_string(),
            client_id: client.client_id.clone(),
            access_token: Uuid::new_v4().to_string(),
            refresh_token: with_refresh_token.then(|| Uuid::new_v4().to_string()),
            token_type: "Bearer".to_string(),
            expires_in: self.config.oauth.access_token_lifetime.as_secs(),
            scopes,
            id_token: None,
            id_token_payload,
            userinfo_payload,
            created_at: now,
        };
        self.store.add_token(token.clone())?;
        Ok(token)
    }

    fn check_grant_allowed(&self, client: &Client, grant_type: GrantType) -> AuthResult<()> {
        if client.supports_grant(grant_type) {
            Ok(())
        } else {
            Err(AuthError::unauthorized_client(format!(
                "client '{}' is not registered for this grant type",
                client.client_id
            )))
        }
    }

    async fn released_claims(
        &self,
        owner_claims: &BTreeMap<String, serde_json::Value>,
        scope_names: &[String],
    ) -> AuthResult<BTreeMap<String, serde_json::Value>> {
        let scopes = self.scopes.resolve(scope_names).await?;
        let released: Vec<&str> = scopes
            .iter()
            .flat_map(|s| s.claims.iter().map(String::as_str))
            .collect();
        Ok(owner_claims
            .iter()
            .filter(|(name, _)| released.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect())
    }
}

fn response(token: GrantedToken, id_token: Option<String>) -> TokenResponse {
    TokenResponse {
        access_token: token.access_token.clone(),
        token_type: token.token_type.clone(),
        expires_in: token.expires_in,
        refresh_token: token.refresh_token.clone(),
        scope: token.scope_string(),
        id_token,
    }
}
