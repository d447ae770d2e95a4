//! JWS signing and verification.
//!
//! Thin layer over `jsonwebtoken` that signs [`JwsPayload`] claim sets with
//! a [`SigningKeyPair`] and verifies compact JWS tokens. Expiry checks are
//! the caller's responsibility; verification here establishes signature
//! validity and nothing more.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, Header, Validation, decode, decode_header, encode};

use crate::error::{AuthError, AuthResult};
use crate::jwt::keys::{SigningAlgorithm, SigningKeyPair};
use crate::jwt::payload::JwsPayload;

/// Signs and verifies compact JWS tokens.
pub struct JwsEngine;

impl JwsEngine {
    /// Signs a payload with the given key pair.
    ///
    /// The JWS header carries the key's algorithm and `kid` so verifiers
    /// can locate the matching public key.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn sign(payload: &JwsPayload, key: &SigningKeyPair) -> AuthResult<String> {
        let mut header = Header::new(key.algorithm.to_jwt_algorithm());
        header.kid = Some(key.kid.clone());
        encode(&header, payload, key.encoding_key())
            .map_err(|e| AuthError::internal(format!("JWS signing failed: {e}")))
    }

    /// Verifies a token against the given key pair and returns its payload.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token is malformed, the signature does
    /// not verify, or the header algorithm differs from the key's.
    pub fn verify(token: &str, key: &SigningKeyPair) -> AuthResult<JwsPayload> {
        Self::verify_with_key(token, key.decoding_key(), key.algorithm)
    }

    /// Verifies an HS256 token signed with a shared secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token is malformed or the signature
    /// does not verify.
    pub fn verify_with_secret(token: &str, secret: &[u8]) -> AuthResult<JwsPayload> {
        let decoding_key = DecodingKey::from_secret(secret);
        Self::verify_with_key(token, &decoding_key, SigningAlgorithm::HS256)
    }

    /// Verifies a token against an arbitrary decoding key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` on malformed input or signature mismatch.
    pub fn verify_with_key(
        token: &str,
        key: &DecodingKey,
        algorithm: SigningAlgorithm,
    ) -> AuthResult<JwsPayload> {
        check_segments(token)?;

        // Signature-only validation; temporal claims are enforced by the
        // callers that know the relevant lifetimes.
        let mut validation = Validation::new(algorithm.to_jwt_algorithm());
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<JwsPayload>(token, key, &validation)
            .map_err(|e| AuthError::invalid_token(format!("JWS verification failed: {e}")))?;
        Ok(data.claims)
    }

    /// Reads the JWS header without verifying the signature.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token is not a 3-segment compact JWS
    /// or the header does not parse.
    pub fn peek_header(token: &str) -> AuthResult<Header> {
        check_segments(token)?;
        decode_header(token)
            .map_err(|e| AuthError::invalid_token(format!("malformed JWS header: {e}")))
    }

    /// Decodes the payload without verifying the signature.
    ///
    /// Used to read the `iss`/`sub` hints out of a client assertion before
    /// the client (and therefore the verification key) is known. Never
    /// trust the result for anything but key lookup.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token is not a 3-segment compact JWS
    /// or the payload does not parse.
    pub fn decode_unverified(token: &str) -> AuthResult<JwsPayload> {
        check_segments(token)?;
        let payload_segment = token
            .split('.')
            .nth(1)
            .ok_or_else(|| AuthError::invalid_token("missing payload segment"))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload_segment)
            .map_err(|e| AuthError::invalid_token(format!("payload is not base64url: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::invalid_token(format!("payload is not valid JSON: {e}")))
    }
}

/// Counts the dot-separated segments of a compact serialization.
#[must_use]
pub fn segment_count(token: &str) -> usize {
    token.split('.').count()
}

fn check_segments(token: &str) -> AuthResult<()> {
    let count = segment_count(token);
    if count != 3 {
        return Err(AuthError::invalid_token(format!(
            "expected 3-segment compact JWS, found {count} segments"
        )));
    }
    Ok(())
}
