//! Signing and encryption key material.
//!
//! This module defines the JWK model, key generation (jsonwebtoken does not
//! generate keys, so RSA keys come from the `rsa` crate and EC keys from
//! `p384`), and the rules for selecting the active signing key.

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthError;

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported JWS signing algorithms.
///
/// The enum is exhaustive on purpose: an algorithm string that does not
/// parse into one of these variants is an `UnsupportedAlgorithm` error,
/// never a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 (shared-secret client assertions).
    HS256,
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// RSA with SHA-512.
    RS512,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::RS512 => Algorithm::RS512,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Converts from the `jsonwebtoken` Algorithm type.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` for algorithms outside the
    /// supported set.
    pub fn from_jwt_algorithm(algorithm: Algorithm) -> Result<Self, AuthError> {
        match algorithm {
            Algorithm::HS256 => Ok(Self::HS256),
            Algorithm::RS256 => Ok(Self::RS256),
            Algorithm::RS384 => Ok(Self::RS384),
            Algorithm::RS512 => Ok(Self::RS512),
            Algorithm::ES384 => Ok(Self::ES384),
            other => Err(AuthError::unsupported_algorithm(format!("{other:?}"))),
        }
    }

    /// Parses an algorithm name as used in JWT headers.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` for any name outside the supported set.
    pub fn parse(name: &str) -> Result<Self, AuthError> {
        match name {
            "HS256" => Ok(Self::HS256),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "ES384" => Ok(Self::ES384),
            other => Err(AuthError::unsupported_algorithm(other)),
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384 | Self::RS512)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES384)
    }

    /// Returns `true` if this is a shared-secret (HMAC) algorithm.
    #[must_use]
    pub fn is_hmac(&self) -> bool {
        matches!(self, Self::HS256)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// JWK Model
// ============================================================================

/// Intended key use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    /// Signature keys.
    Sig,
    /// Encryption keys.
    Enc,
}

/// Permitted key operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyOperation {
    /// Compute digital signatures.
    Sign,
    /// Verify digital signatures.
    Verify,
    /// Encrypt content.
    Encrypt,
    /// Decrypt content.
    Decrypt,
}

/// JSON Web Key (public members only, for JWKS export).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" or "enc").
    #[serde(rename = "use")]
    pub use_: KeyUse,

    /// Permitted operations.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub key_ops: Vec<KeyOperation>,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A signing key pair for JWS operations.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    /// Intended use; signing keys carry `KeyUse::Sig`.
    pub use_: KeyUse,

    /// Permitted operations.
    pub key_ops: Vec<KeyOperation>,

    /// Encoding key (private key) for signing.
    encoding_key: EncodingKey,

    /// Decoding key (public key) for verification.
    decoding_key: DecodingKey,

    /// Public key data for JWKS export.
    public_key_data: PublicKeyData,

    /// When the key was created.
    pub created_at: OffsetDateTime,
}

/// Internal representation of public key data for JWKS export.
enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl SigningKeyPair {
    /// Generates a new RSA key pair for the given RSA-based algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails or the algorithm is not
    /// RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, AuthError> {
        if !algorithm.is_rsa() {
            return Err(AuthError::invalid_key(format!(
                "algorithm {algorithm} is not RSA-based"
            )));
        }

        let bits = 2048;
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;

        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm,
            use_: KeyUse::Sig,
            key_ops: vec![KeyOperation::Sign, KeyOperation::Verify],
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Rsa { n, e },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Generates a new EC key pair on the P-384 curve (ES384).
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, AuthError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        let signing_key = EcSigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| AuthError::invalid_key("missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| AuthError::invalid_key("missing y coordinate"))?;

        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            algorithm: SigningAlgorithm::ES384,
            use_: KeyUse::Sig,
            key_ops: vec![KeyOperation::Sign, KeyOperation::Verify],
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                x: x.to_vec(),
                y: y.to_vec(),
            },
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Returns `true` if this key may be used to sign tokens.
    ///
    /// The active-signing-key rule: use must be `sig`, the algorithm must
    /// match, and `key_ops` must include `sign`.
    #[must_use]
    pub fn supports_signing(&self, algorithm: SigningAlgorithm) -> bool {
        self.use_ == KeyUse::Sig
            && self.algorithm == algorithm
            && self.key_ops.contains(&KeyOperation::Sign)
    }

    /// Returns the encoding (private) key.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Returns the decoding (public) key.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Exports the public half as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: self.kid.clone(),
                use_: self.use_,
                key_ops: self.key_ops.clone(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                kid: self.kid.clone(),
                use_: self.use_,
                key_ops: self.key_ops.clone(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }
}

// ============================================================================
// Encryption Key Pair
// ============================================================================

/// An RSA key pair for JWE key wrapping (RSA1_5).
pub struct EncryptionKeyPair {
    /// Key ID.
    pub kid: String,

    /// Private key for unwrapping content-encryption keys.
    private_key: RsaPrivateKey,

    /// Public key for wrapping content-encryption keys.
    public_key: RsaPublicKey,

    /// When the key was created.
    pub created_at: OffsetDateTime,
}

impl EncryptionKeyPair {
    /// Generates a new 2048-bit RSA encryption key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate() -> Result<Self, AuthError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| AuthError::invalid_key(e.to_string()))?;
        let public_key = private_key.to_public_key();

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            private_key,
            public_key,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    /// Wraps a content-encryption key with RSAES-PKCS1-v1_5.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn wrap_key(&self, cek: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.public_key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, cek)
            .map_err(|e| AuthError::internal(format!("RSA key wrap failed: {e}")))
    }

    /// Unwraps a content-encryption key with RSAES-PKCS1-v1_5.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidToken` error if decryption fails; the detail is
    /// deliberately generic.
    pub fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.private_key
            .decrypt(Pkcs1v15Encrypt, wrapped)
            .map_err(|_| AuthError::invalid_token("encrypted key could not be unwrapped"))
    }

    /// Exports the public half as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            use_: KeyUse::Enc,
            key_ops: vec![KeyOperation::Encrypt, KeyOperation::Decrypt],
            alg: "RSA1_5".to_string(),
            n: Some(URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be())),
            e: Some(URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be())),
            crv: None,
            x: None,
            y: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(
            SigningAlgorithm::parse("RS256").unwrap(),
            SigningAlgorithm::RS256
        );
        assert_eq!(
            SigningAlgorithm::parse("RS512").unwrap(),
            SigningAlgorithm::RS512
        );
        assert_eq!(
            SigningAlgorithm::parse("ES384").unwrap(),
            SigningAlgorithm::ES384
        );
        // Unknown names fail loudly, no silent fallthrough
        assert!(matches!(
            SigningAlgorithm::parse("ES512"),
            Err(AuthError::UnsupportedAlgorithm { .. })
        ));
        assert!(matches!(
            SigningAlgorithm::parse("none"),
            Err(AuthError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_algorithm_properties() {
        assert!(SigningAlgorithm::RS256.is_rsa());
        assert!(SigningAlgorithm::RS512.is_rsa());
        assert!(!SigningAlgorithm::ES384.is_rsa());
        assert!(SigningAlgorithm::ES384.is_ec());
        assert!(SigningAlgorithm::HS256.is_hmac());
    }

    #[test]
    fn test_generate_rsa_key_pair() {
        let key = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256).unwrap();
        assert_eq!(key.algorithm, SigningAlgorithm::RS256);
        assert!(!key.kid.is_empty());
        assert!(key.supports_signing(SigningAlgorithm::RS256));
        assert!(!key.supports_signing(SigningAlgorithm::RS384));
    }

    #[test]
    fn test_generate_rsa_rejects_non_rsa_algorithm() {
        assert!(SigningKeyPair::generate_rsa(SigningAlgorithm::ES384).is_err());
        assert!(SigningKeyPair::generate_rsa(SigningAlgorithm::HS256).is_err());
    }

    #[test]
    fn test_generate_ec_key_pair() {
        let key = SigningKeyPair::generate_ec().unwrap();
        assert_eq!(key.algorithm, SigningAlgorithm::ES384);
        assert!(key.supports_signing(SigningAlgorithm::ES384));
    }

    #[test]
    fn test_signing_key_jwk_export() {
        let key = SigningKeyPair::generate_rsa(SigningAlgorithm::RS384).unwrap();
        let jwk = key.to_jwk();
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg, "RS384");
        assert_eq!(jwk.use_, KeyUse::Sig);
        assert!(jwk.key_ops.contains(&KeyOperation::Sign));
        assert!(jwk.n.is_some());
        assert!(jwk.e.is_some());
        assert!(jwk.crv.is_none());

        let json = serde_json::to_string(&jwk).unwrap();
        assert!(json.contains("\"use\":\"sig\""));
        assert!(json.contains("\"key_ops\":[\"sign\",\"verify\"]"));
    }

    #[test]
    fn test_ec_jwk_export() {
        let key = SigningKeyPair::generate_ec().unwrap();
        let jwk = key.to_jwk();
        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv, Some("P-384".to_string()));
        assert!(jwk.x.is_some());
        assert!(jwk.y.is_some());
        assert!(jwk.n.is_none());
    }

    #[test]
    fn test_encryption_key_wrap_round_trip() {
        let key = EncryptionKeyPair::generate().unwrap();
        let cek = [42u8; 32];
        let wrapped = key.wrap_key(&cek).unwrap();
        assert_ne!(wrapped.as_slice(), cek.as_slice());
        let unwrapped = key.unwrap_key(&wrapped).unwrap();
        assert_eq!(unwrapped, cek);
    }

    #[test]
    fn test_encryption_key_unwrap_garbage_fails() {
        let key = EncryptionKeyPair::generate().unwrap();
        let result = key.unwrap_key(&[0u8; 256]);
        assert!(matches!(result, Err(AuthError::InvalidToken { .. })));
    }
}
