//! Token endpoint client authentication.
//!
//! A token request may present credentials through several channels at
//! once: the Authorization header, the request body, a client assertion,
//! or a TLS certificate thumbprint. The client's registration declares
//! exactly one acceptable method; credentials on any other channel do not
//! authenticate it. Every failure maps to the same generic
//! `invalid_client` error so callers cannot probe which client ids exist.

use std::sync::Arc;

use crate::error::{AuthError, AuthResult};
use crate::jwt::{JweEngine, segment_count};
use crate::oauth::client_assertion::{ClientAssertionVerifier, JWT_BEARER_ASSERTION_TYPE};
use crate::storage::{ClientStorage, JsonWebKeyStorage};
use crate::types::{Client, TokenEndpointAuthMethod};

/// Credentials extracted from a token request.
#[derive(Debug, Clone, Default)]
pub struct AuthenticateInstruction {
    /// Client id from the Authorization header.
    pub client_id_from_header: Option<String>,

    /// Client secret from the Authorization header.
    pub client_secret_from_header: Option<String>,

    /// Client id from the request body.
    pub client_id_from_body: Option<String>,

    /// Client secret from the request body.
    pub client_secret_from_body: Option<String>,

    /// `client_assertion` body parameter.
    pub client_assertion: Option<String>,

    /// `client_assertion_type` body parameter.
    pub client_assertion_type: Option<String>,

    /// SHA-1 thumbprint of the presented TLS client certificate.
    pub certificate_thumbprint: Option<String>,
}

/// Authenticates clients at the token endpoint.
pub struct ClientAuthenticator {
    clients: Arc<dyn ClientStorage>,
    keys: Arc<dyn JsonWebKeyStorage>,
    assertions: ClientAssertionVerifier,
}

impl ClientAuthenticator {
    /// Creates an authenticator.
    ///
    /// `issuer` is the server issuer URL, expected as the audience of
    /// client assertions.
    pub fn new(
        clients: Arc<dyn ClientStorage>,
        keys: Arc<dyn JsonWebKeyStorage>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            clients,
            keys,
            assertions: ClientAssertionVerifier::new(issuer),
        }
    }

    /// Authenticates the client described by the instruction.
    ///
    /// # Errors
    ///
    /// Returns a generic `InvalidClient` error whenever the client cannot
    /// be identified or its credentials do not verify.
    pub async fn authenticate(&self, instruction: &AuthenticateInstruction) -> AuthResult<Client> {
        let assertion = self.prepare_assertion(instruction).await?;

        let client_id = self
            .resolve_client_id(instruction, assertion.as_deref())
            .ok_or_else(auth_failed)?;

        let client = self
            .clients
            .find_by_client_id(&client_id)
            .await?
            .ok_or_else(|| {
                tracing::debug!(%client_id, "unknown client");
                auth_failed()
            })?;

        match client.token_endpoint_auth_method {
            TokenEndpointAuthMethod::ClientSecretBasic => {
                self.check_secret(&client, instruction.client_secret_from_header.as_deref())
            }
            TokenEndpointAuthMethod::ClientSecretPost => {
                self.check_secret(&client, instruction.client_secret_from_body.as_deref())
            }
            TokenEndpointAuthMethod::ClientSecretJwt => {
                let assertion = self.require_assertion(instruction, assertion.as_deref())?;
                self.assertions.verify_shared_secret(assertion, &client)?;
                Ok(())
            }
            TokenEndpointAuthMethod::PrivateKeyJwt => {
                let assertion = self.require_assertion(instruction, assertion.as_deref())?;
                self.assertions.verify_private_key(assertion, &client)?;
                Ok(())
            }
            TokenEndpointAuthMethod::TlsClientAuth => {
                let thumbprint = instruction
                    .certificate_thumbprint
                    .as_deref()
                    .ok_or_else(auth_failed)?;
                if client.check_thumbprint(thumbprint) {
                    Ok(())
                } else {
                    tracing::debug!(client_id = %client.client_id, "thumbprint mismatch");
                    Err(auth_failed())
                }
            }
        }?;

        Ok(client)
    }

    /// Decrypts the assertion when it arrives JWE-wrapped.
    async fn prepare_assertion(
        &self,
        instruction: &AuthenticateInstruction,
    ) -> AuthResult<Option<String>> {
        let Some(assertion) = instruction.client_assertion.as_deref() else {
            return Ok(None);
        };
        if segment_count(assertion) != 5 {
            return Ok(Some(assertion.to_string()));
        }
        let key = self
            .keys
            .get_encryption_key()
            .await?
            .ok_or_else(|| {
                tracing::debug!("encrypted assertion received but no encryption key installed");
                auth_failed()
            })?;
        let inner = JweEngine::decrypt(assertion, &key).map_err(|e| {
            tracing::debug!(error = %e, "assertion decryption failed");
            auth_failed()
        })?;
        Ok(Some(inner))
    }

    /// Resolves the client id: the assertion's issuer hint wins, then the
    /// Authorization header, then the request body.
    fn resolve_client_id(
        &self,
        instruction: &AuthenticateInstruction,
        assertion: Option<&str>,
    ) -> Option<String> {
        if let Some(assertion) = assertion
            && let Some(hint) = ClientAssertionVerifier::issuer_hint(assertion)
        {
            return Some(hint);
        }
        instruction
            .client_id_from_header
            .clone()
            .or_else(|| instruction.client_id_from_body.clone())
    }

    fn check_secret(&self, client: &Client, presented: Option<&str>) -> AuthResult<()> {
        let presented = presented.ok_or_else(auth_failed)?;
        if client.check_shared_secret(presented) {
            Ok(())
        } else {
            tracing::debug!(client_id = %client.client_id, "secret mismatch");
            Err(auth_failed())
        }
    }

    fn require_assertion<'a>(
        &self,
        instruction: &AuthenticateInstruction,
        assertion: Option<&'a str>,
    ) -> AuthResult<&'a str> {
        let declared_type = instruction.client_assertion_type.as_deref();
        if declared_type != Some(JWT_BEARER_ASSERTION_TYPE) {
            return Err(auth_failed());
        }
        assertion.ok_or_else(auth_failed)
    }
}

fn auth_failed() -> AuthError {
    AuthError::invalid_client("client authentication failed")
}
