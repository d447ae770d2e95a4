//! JWE encryption and decryption.
//!
//! Compact JWE with `RSA1_5` key wrapping and `A128CBC-HS256` content
//! encryption, used to wrap nested JWS tokens (encrypted client assertions
//! and encrypted ID tokens). The content-encryption construction follows
//! RFC 7518 section 5.2.3: the 32-byte content-encryption key splits into a
//! 16-byte HMAC key and a 16-byte AES key, and the authentication tag is
//! the first half of an HMAC-SHA256 over the protected header, IV,
//! ciphertext, and the header bit length.

use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AuthError, AuthResult};
use crate::jwt::keys::EncryptionKeyPair;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

const ALG_RSA1_5: &str = "RSA1_5";
const ENC_A128CBC_HS256: &str = "A128CBC-HS256";

/// JWE protected header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JweHeader {
    /// Key management algorithm.
    pub alg: String,

    /// Content encryption algorithm.
    pub enc: String,

    /// Key ID of the wrapping key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Content type of the plaintext ("JWT" for nested tokens).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,
}

/// Encrypts and decrypts compact JWE tokens.
pub struct JweEngine;

impl JweEngine {
    /// Wraps a compact JWS inside a 5-segment compact JWE.
    ///
    /// # Errors
    ///
    /// Returns an error if key wrapping or content encryption fails.
    pub fn encrypt(inner_jws: &str, key: &EncryptionKeyPair) -> AuthResult<String> {
        let header = JweHeader {
            alg: ALG_RSA1_5.to_string(),
            enc: ENC_A128CBC_HS256.to_string(),
            kid: Some(key.kid.clone()),
            cty: Some("JWT".to_string()),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| AuthError::internal(format!("JWE header serialization failed: {e}")))?;
        let header_b64 = URL_SAFE_NO_PAD.encode(&header_json);

        // 32-byte CEK: first half MACs, second half encrypts.
        let mut cek = [0u8; 32];
        OsRng.fill_bytes(&mut cek);
        let mut iv = [0u8; 16];
        OsRng.fill_bytes(&mut iv);

        let encrypted_key = key.wrap_key(&cek)?;

        let cipher = Aes128CbcEnc::new_from_slices(&cek[16..32], &iv)
            .map_err(|e| AuthError::internal(format!("cipher init failed: {e}")))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(inner_jws.as_bytes());

        let tag = compute_tag(&cek[0..16], header_b64.as_bytes(), &iv, &ciphertext)?;

        Ok(format!(
            "{}.{}.{}.{}.{}",
            header_b64,
            URL_SAFE_NO_PAD.encode(&encrypted_key),
            URL_SAFE_NO_PAD.encode(iv),
            URL_SAFE_NO_PAD.encode(&ciphertext),
            URL_SAFE_NO_PAD.encode(tag),
        ))
    }

    /// Decrypts a 5-segment compact JWE and returns the inner plaintext.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for malformed input, unwrap failures, or tag
    /// mismatch, and `UnsupportedAlgorithm` for `alg`/`enc` values outside
    /// the supported pair.
    pub fn decrypt(token: &str, key: &EncryptionKeyPair) -> AuthResult<String> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 5 {
            return Err(AuthError::invalid_token(format!(
                "expected 5-segment compact JWE, found {} segments",
                parts.len()
            )));
        }

        let header_json = decode_segment(parts[0], "header")?;
        let header: JweHeader = serde_json::from_slice(&header_json)
            .map_err(|e| AuthError::invalid_token(format!("malformed JWE header: {e}")))?;
        if header.alg != ALG_RSA1_5 {
            return Err(AuthError::unsupported_algorithm(&header.alg));
        }
        if header.enc != ENC_A128CBC_HS256 {
            return Err(AuthError::unsupported_algorithm(&header.enc));
        }

        let encrypted_key = decode_segment(parts[1], "encrypted key")?;
        let iv = decode_segment(parts[2], "initialization vector")?;
        let ciphertext = decode_segment(parts[3], "ciphertext")?;
        let tag = decode_segment(parts[4], "authentication tag")?;

        let cek = key.unwrap_key(&encrypted_key)?;
        if cek.len() != 32 {
            return Err(AuthError::invalid_token("unexpected content key length"));
        }
        if iv.len() != 16 {
            return Err(AuthError::invalid_token("unexpected IV length"));
        }

        // Authenticate before decrypting.
        let expected = compute_tag(&cek[0..16], parts[0].as_bytes(), &iv, &ciphertext)?;
        if expected.as_slice().ct_eq(tag.as_slice()).unwrap_u8() != 1 {
            return Err(AuthError::invalid_token("authentication tag mismatch"));
        }

        let cipher = Aes128CbcDec::new_from_slices(&cek[16..32], &iv)
            .map_err(|e| AuthError::internal(format!("cipher init failed: {e}")))?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| AuthError::invalid_token("content decryption failed"))?;

        String::from_utf8(plaintext)
            .map_err(|_| AuthError::invalid_token("decrypted content is not UTF-8"))
    }
}

/// HMAC-SHA256 tag over AAD || IV || ciphertext || AL, truncated to 16
/// bytes. AL is the AAD length in bits as a 64-bit big-endian integer.
fn compute_tag(mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> AuthResult<[u8; 16]> {
    let mut mac = HmacSha256::new_from_slice(mac_key)
        .map_err(|e| AuthError::internal(format!("HMAC init failed: {e}")))?;
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    let al = (aad.len() as u64) * 8;
    mac.update(&al.to_be_bytes());

    let digest = mac.finalize().into_bytes();
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&digest[0..16]);
    Ok(tag)
}

fn decode_segment(segment: &str, what: &str) -> AuthResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::invalid_token(format!("JWE {what} is not base64url: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_JWS: &str = "eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJ1c2VyLTEifQ.c2ln";

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = EncryptionKeyPair::generate().unwrap();
        let jwe = JweEngine::encrypt(SAMPLE_JWS, &key).unwrap();
        assert_eq!(jwe.split('.').count(), 5);

        let plaintext = JweEngine::decrypt(&jwe, &key).unwrap();
        assert_eq!(plaintext, SAMPLE_JWS);
    }

    #[test]
    fn test_header_declares_algorithms() {
        let key = EncryptionKeyPair::generate().unwrap();
        let jwe = JweEngine::encrypt(SAMPLE_JWS, &key).unwrap();
        let header_b64 = jwe.split('.').next().unwrap();
        let header: JweHeader =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).unwrap()).unwrap();
        assert_eq!(header.alg, "RSA1_5");
        assert_eq!(header.enc, "A128CBC-HS256");
        assert_eq!(header.kid.as_deref(), Some(key.kid.as_str()));
        assert_eq!(header.cty.as_deref(), Some("JWT"));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = EncryptionKeyPair::generate().unwrap();
        let other = EncryptionKeyPair::generate().unwrap();
        let jwe = JweEngine::encrypt(SAMPLE_JWS, &key).unwrap();
        assert!(JweEngine::decrypt(&jwe, &other).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key = EncryptionKeyPair::generate().unwrap();
        let jwe = JweEngine::encrypt(SAMPLE_JWS, &key).unwrap();

        let mut parts: Vec<String> = jwe.split('.').map(str::to_string).collect();
        let mut ciphertext = URL_SAFE_NO_PAD.decode(&parts[3]).unwrap();
        ciphertext[0] ^= 0xff;
        parts[3] = URL_SAFE_NO_PAD.encode(&ciphertext);
        let tampered = parts.join(".");

        assert!(matches!(
            JweEngine::decrypt(&tampered, &key),
            Err(AuthError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_unsupported_algorithms_rejected() {
        let key = EncryptionKeyPair::generate().unwrap();
        let jwe = JweEngine::encrypt(SAMPLE_JWS, &key).unwrap();
        let parts: Vec<&str> = jwe.split('.').collect();

        let bad_header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RSA-OAEP","enc":"A128CBC-HS256"}"#);
        let forged = format!(
            "{}.{}.{}.{}.{}",
            bad_header, parts[1], parts[2], parts[3], parts[4]
        );
        assert!(matches!(
            JweEngine::decrypt(&forged, &key),
            Err(AuthError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_wrong_segment_count_rejected() {
        let key = EncryptionKeyPair::generate().unwrap();
        for input in ["", "a.b.c", "a.b.c.d", "a.b.c.d.e.f"] {
            assert!(matches!(
                JweEngine::decrypt(input, &key),
                Err(AuthError::InvalidToken { .. })
            ));
        }
    }
}
