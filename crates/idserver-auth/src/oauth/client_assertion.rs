//! JWT client assertion verification (RFC 7523).
//!
//! Assertions authenticate clients at the token endpoint with either a
//! shared secret (`client_secret_jwt`, HS256) or the client's registered
//! public keys (`private_key_jwt`). The assertion must carry
//! `iss` = `sub` = `client_id`, an audience containing the server issuer,
//! and a future expiration.

use jsonwebtoken::DecodingKey;
use time::OffsetDateTime;

use crate::error::{AuthError, AuthResult};
use crate::jwt::{Jwk, JwsEngine, JwsPayload, SigningAlgorithm};
use crate::types::Client;

/// The only assertion type accepted at the token endpoint.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Verifies client assertion JWTs against a registered client.
pub struct ClientAssertionVerifier {
    /// Expected audience: the server issuer URL.
    expected_audience: String,
}

impl ClientAssertionVerifier {
    /// Creates a verifier expecting assertions addressed to the given
    /// issuer.
    #[must_use]
    pub fn new(expected_audience: impl Into<String>) -> Self {
        Self {
            expected_audience: expected_audience.into(),
        }
    }

    /// Verifies an HS256 assertion signed with the client's shared secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if the client has no shared secret, the
    /// signature does not verify, or the claims are out of policy.
    pub fn verify_shared_secret(
        &self,
        assertion: &str,
        client: &Client,
    ) -> AuthResult<JwsPayload> {
        let secret = client
            .shared_secret()
            .ok_or_else(|| AuthError::invalid_client("client authentication failed"))?;
        let payload = JwsEngine::verify_with_secret(assertion, secret.as_bytes())
            .map_err(|e| {
                tracing::debug!(client_id = %client.client_id, error = %e, "assertion signature rejected");
                AuthError::invalid_client("client authentication failed")
            })?;
        self.check_claims(&payload, &client.client_id)?;
        Ok(payload)
    }

    /// Verifies an asymmetric assertion against the client's JWKS.
    ///
    /// The assertion header's `kid` selects the key when present;
    /// otherwise every registered key of the header's algorithm is tried.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` if no registered key verifies the
    /// signature or the claims are out of policy.
    pub fn verify_private_key(
        &self,
        assertion: &str,
        client: &Client,
    ) -> AuthResult<JwsPayload> {
        let header = JwsEngine::peek_header(assertion)
            .map_err(|_| AuthError::invalid_client("client authentication failed"))?;
        let algorithm = SigningAlgorithm::from_jwt_algorithm(header.alg)?;

        let jwks = client
            .jwks
            .as_ref()
            .ok_or_else(|| AuthError::invalid_client("client authentication failed"))?;

        let candidates: Vec<&Jwk> = jwks
            .iter()
            .filter(|k| header.kid.as_deref().is_none_or(|kid| k.kid == kid))
            .collect();

        for jwk in candidates {
            let Ok(key) = decoding_key_from_jwk(jwk) else {
                continue;
            };
            if let Ok(payload) = JwsEngine::verify_with_key(assertion, &key, algorithm) {
                self.check_claims(&payload, &client.client_id)?;
                return Ok(payload);
            }
        }

        tracing::debug!(client_id = %client.client_id, "no registered key verified the assertion");
        Err(AuthError::invalid_client("client authentication failed"))
    }

    /// Reads the unverified `iss` hint out of an assertion, for client
    /// resolution before the verification key is known.
    #[must_use]
    pub fn issuer_hint(assertion: &str) -> Option<String> {
        let payload = JwsEngine::decode_unverified(assertion).ok()?;
        payload.iss.or(payload.sub)
    }

    fn check_claims(&self, payload: &JwsPayload, client_id: &str) -> AuthResult<()> {
        if payload.iss.as_deref() != Some(client_id) {
            return Err(AuthError::invalid_client("client authentication failed"));
        }
        if payload.sub.as_deref() != Some(client_id) {
            return Err(AuthError::invalid_client("client authentication failed"));
        }
        let audience_ok = payload
            .aud
            .as_ref()
            .is_some_and(|aud| aud.contains(&self.expected_audience));
        if !audience_ok {
            return Err(AuthError::invalid_client("client authentication failed"));
        }
        let now = OffsetDateTime::now_utc().unix_timestamp();
        match payload.exp {
            Some(exp) if exp > now => Ok(()),
            _ => Err(AuthError::invalid_client("client authentication failed")),
        }
    }
}

/// Builds a verification key from a public JWK.
fn decoding_key_from_jwk(jwk: &Jwk) -> AuthResult<DecodingKey> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk
                .n
                .as_deref()
                .ok_or_else(|| AuthError::invalid_key("RSA JWK missing modulus"))?;
            let e = jwk
                .e
                .as_deref()
                .ok_or_else(|| AuthError::invalid_key("RSA JWK missing exponent"))?;
            DecodingKey::from_rsa_components(n, e)
                .map_err(|e| AuthError::invalid_key(e.to_string()))
        }
        "EC" => {
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| AuthError::invalid_key("EC JWK missing x coordinate"))?;
            let y = jwk
                .y
                .as_deref()
                .ok_or_else(|| AuthError::invalid_key("EC JWK missing y coordinate"))?;
            DecodingKey::from_ec_components(x, y)
                .map_err(|e| AuthError::invalid_key(e.to_string()))
        }
        other => Err(AuthError::unsupported_algorithm(other)),
    }
}
