//! PKCE (RFC 7636) challenge verification.
//!
//! Both `plain` and `S256` methods are supported; `S256` is the
//! recommended one and the default when the authorization request carries
//! a challenge without a method.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{AuthError, AuthResult};

/// PKCE code challenge methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// The verifier is the challenge.
    #[serde(rename = "plain")]
    Plain,
    /// The challenge is `BASE64URL(SHA256(verifier))`.
    #[serde(rename = "S256")]
    S256,
}

impl CodeChallengeMethod {
    /// Parses a challenge method as it appears in authorization requests.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for unknown method names.
    pub fn parse(value: &str) -> AuthResult<Self> {
        match value {
            "plain" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            other => Err(AuthError::invalid_request(format!(
                "unknown code_challenge_method '{other}'"
            ))),
        }
    }
}

/// Checks a verifier against a stored challenge.
///
/// Comparison is constant-time for both methods.
#[must_use]
pub fn verify_challenge(
    verifier: &str,
    challenge: &str,
    method: CodeChallengeMethod,
) -> bool {
    let derived = match method {
        CodeChallengeMethod::Plain => verifier.to_string(),
        CodeChallengeMethod::S256 => {
            let digest = Sha256::digest(verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(digest)
        }
    };
    derived.as_bytes().ct_eq(challenge.as_bytes()).unwrap_u8() == 1
}
