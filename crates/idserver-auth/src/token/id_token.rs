//! ID token construction.
//!
//! The audience of an ID token is every client registered for the
//! `id_token` response type plus the relying client itself; when that set
//! has more than one member, `azp` names the relying client. The signing
//! algorithm comes from the client's registration, falling back to the
//! server default, and the signed token is JWE-wrapped when the client
//! registered encryption preferences.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;

use crate::config::IdServerConfig;
use crate::error::{AuthError, AuthResult};
use crate::jwt::{Audience, JweEngine, JwsEngine, JwsPayload};
use crate::storage::{ClientStorage, JsonWebKeyStorage};
use crate::types::{Client, ResponseType};

/// Builds and signs ID tokens.
pub struct IdTokenBuilder {
    clients: Arc<dyn ClientStorage>,
    keys: Arc<dyn JsonWebKeyStorage>,
    config: Arc<IdServerConfig>,
}

impl IdTokenBuilder {
    /// Creates a builder.
    pub fn new(
        clients: Arc<dyn ClientStorage>,
        keys: Arc<dyn JsonWebKeyStorage>,
        config: Arc<IdServerConfig>,
    ) -> Self {
        Self {
            clients,
            keys,
            config,
        }
    }

    /// Assembles the ID token claim set for a subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the audience lookup fails.
    pub async fn build_payload(
        &self,
        subject: &str,
        claims: &BTreeMap<String, Value>,
        relying_client: &Client,
        nonce: Option<&str>,
    ) -> AuthResult<JwsPayload> {
        let mut audiences: Vec<String> = self
            .clients
            .find_by_response_type(ResponseType::IdToken)
            .await?
            .into_iter()
            .map(|c| c.client_id)
            .collect();
        if !audiences.contains(&relying_client.client_id) {
            audiences.push(relying_client.client_id.clone());
        }
        audiences.sort();

        let azp = (audiences.len() > 1).then(|| relying_client.client_id.clone());

        let now = OffsetDateTime::now_utc();
        let mut payload = JwsPayload {
            iss: Some(self.config.issuer.clone()),
            sub: Some(subject.to_string()),
            aud: Some(Audience::from(audiences)),
            iat: Some(now.unix_timestamp()),
            exp: Some(
                now.unix_timestamp() + self.config.oauth.id_token_lifetime.as_secs() as i64,
            ),
            nonce: nonce.map(str::to_string),
            azp,
            ..Default::default()
        };
        for (name, value) in claims {
            payload.set_claim(name.clone(), value.clone());
        }
        Ok(payload)
    }

    /// Signs a payload for the client, wrapping the result in a JWE when
    /// the client registered encryption preferences.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` when no signing key exists for the selected
    /// algorithm, and `UnsupportedAlgorithm` when the client registered
    /// an encryption pair outside the supported one.
    pub async fn sign(&self, payload: &JwsPayload, client: &Client) -> AuthResult<String> {
        let algorithm = client
            .id_token_signed_response_alg
            .unwrap_or(self.config.signing.default_algorithm);

        let key = self
            .keys
            .get_signing_key(algorithm)
            .await?
            .ok_or_else(|| {
                AuthError::invalid_key(format!("no signing key available for {algorithm}"))
            })?;
        let jws = JwsEngine::sign(payload, &key)?;

        match (
            client.id_token_encrypted_response_alg.as_deref(),
            client.id_token_encrypted_response_enc.as_deref(),
        ) {
            (None, _) => Ok(jws),
            (Some("RSA1_5"), Some("A128CBC-HS256")) => {
                let encryption_key = self
                    .keys
                    .get_encryption_key()
                    .await?
                    .ok_or_else(|| AuthError::invalid_key("no encryption key installed"))?;
                JweEngine::encrypt(&jws, &encryption_key)
            }
            (Some(alg), enc) => Err(AuthError::unsupported_algorithm(format!(
                "{alg}/{}",
                enc.unwrap_or("?")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::SigningAlgorithm;
    use crate::storage::memory::{InMemoryClientStorage, InMemoryJsonWebKeyStorage};
    use crate::types::{GrantType, TokenEndpointAuthMethod};

    fn client(id: &str, response_types: Vec<ResponseType>) -> Client {
        Client {
            client_id: id.to_string(),
            client_name: None,
            secrets: vec![],
            token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
            grant_types: vec![GrantType::AuthorizationCode],
            response_types,
            allowed_scopes: vec!["openid".to_string()],
            redirect_uris: vec![],
            id_token_signed_response_alg: None,
            id_token_encrypted_response_alg: None,
            id_token_encrypted_response_enc: None,
            jwks: None,
        }
    }

    fn builder(clients: Vec<Client>) -> (IdTokenBuilder, Arc<InMemoryJsonWebKeyStorage>) {
        let keys =
            Arc::new(InMemoryJsonWebKeyStorage::bootstrap(SigningAlgorithm::RS256).unwrap());
        let builder = IdTokenBuilder::new(
            Arc::new(InMemoryClientStorage::with_clients(clients)),
            Arc::clone(&keys) as _,
            Arc::new(IdServerConfig::default()),
        );
        (builder, keys)
    }

    #[tokio::test]
    async fn test_audience_includes_id_token_consumers_and_relying_client() {
        let relying = client("relying", vec![ResponseType::Code]);
        let consumer = client("consumer", vec![ResponseType::IdToken]);
        let (builder, _) = builder(vec![relying.clone(), consumer]);

        let payload = builder
            .build_payload("user-1", &BTreeMap::new(), &relying, None)
            .await
            .unwrap();

        let aud = payload.aud.as_ref().unwrap();
        assert!(aud.contains("relying"));
        assert!(aud.contains("consumer"));
        assert_eq!(payload.azp.as_deref(), Some("relying"));
    }

    #[tokio::test]
    async fn test_single_audience_has_no_azp() {
        let relying = client("relying", vec![ResponseType::Code]);
        let (builder, _) = builder(vec![relying.clone()]);

        let payload = builder
            .build_payload("user-1", &BTreeMap::new(), &relying, None)
            .await
            .unwrap();

        assert_eq!(payload.aud, Some(Audience::Single("relying".to_string())));
        assert!(payload.azp.is_none());
    }

    #[tokio::test]
    async fn test_nonce_and_claims_carried() {
        let relying = client("relying", vec![ResponseType::Code]);
        let (builder, _) = builder(vec![relying.clone()]);

        let mut claims = BTreeMap::new();
        claims.insert("email".to_string(), serde_json::json!("a@b.c"));
        let payload = builder
            .build_payload("user-1", &claims, &relying, Some("n-123"))
            .await
            .unwrap();

        assert_eq!(payload.nonce.as_deref(), Some("n-123"));
        assert_eq!(payload.claim("email"), Some(serde_json::json!("a@b.c")));
        assert!(payload.exp.unwrap() > payload.iat.unwrap());
    }

    #[tokio::test]
    async fn test_sign_produces_verifiable_jws() {
        let relying = client("relying", vec![ResponseType::Code]);
        let (builder, keys) = builder(vec![relying.clone()]);

        let payload = builder
            .build_payload("user-1", &BTreeMap::new(), &relying, None)
            .await
            .unwrap();
        let token = builder.sign(&payload, &relying).await.unwrap();

        let key = keys
            .get_signing_key(SigningAlgorithm::RS256)
            .await
            .unwrap()
            .unwrap();
        let verified = JwsEngine::verify(&token, &key).unwrap();
        assert_eq!(verified.sub.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn test_sign_fails_without_matching_key() {
        let mut relying = client("relying", vec![ResponseType::Code]);
        relying.id_token_signed_response_alg = Some(SigningAlgorithm::ES384);
        let (builder, _) = builder(vec![relying.clone()]);

        let payload = builder
            .build_payload("user-1", &BTreeMap::new(), &relying, None)
            .await
            .unwrap();
        assert!(matches!(
            builder.sign(&payload, &relying).await,
            Err(AuthError::InvalidKey { .. })
        ));
    }

    #[tokio::test]
    async fn test_sign_encrypts_for_registered_preferences() {
        let mut relying = client("relying", vec![ResponseType::Code]);
        relying.id_token_encrypted_response_alg = Some("RSA1_5".to_string());
        relying.id_token_encrypted_response_enc = Some("A128CBC-HS256".to_string());
        let (builder, keys) = builder(vec![relying.clone()]);

        let payload = builder
            .build_payload("user-1", &BTreeMap::new(), &relying, None)
            .await
            .unwrap();
        let token = builder.sign(&payload, &relying).await.unwrap();
        assert_eq!(token.split('.').count(), 5);

        let encryption_key = keys.get_encryption_key().await.unwrap().unwrap();
        let inner = JweEngine::decrypt(&token, &encryption_key).unwrap();
        assert_eq!(inner.split('.').count(), 3);
    }

    #[tokio::test]
    async fn test_sign_rejects_unsupported_encryption_pair() {
        let mut relying = client("relying", vec![ResponseType::Code]);
        relying.id_token_encrypted_response_alg = Some("RSA-OAEP".to_string());
        relying.id_token_encrypted_response_enc = Some("A256GCM".to_string());
        let (builder, _) = builder(vec![relying.clone()]);

        let payload = builder
            .build_payload("user-1", &BTreeMap::new(), &relying, None)
            .await
            .unwrap();
        assert!(matches!(
            builder.sign(&payload, &relying).await,
            Err(AuthError::UnsupportedAlgorithm { .. })
        ));
    }
}
