//! JWT primitives: claim sets, JWS signing, JWE wrapping, and key material.

pub mod jwe;
pub mod jws;
pub mod keys;
pub mod payload;

pub use jwe::{JweEngine, JweHeader};
pub use jws::{JwsEngine, segment_count};
pub use keys::{EncryptionKeyPair, Jwk, KeyOperation, KeyUse, SigningAlgorithm, SigningKeyPair};
pub use payload::{Audience, JwsPayload, STANDARD_RESOURCE_OWNER_CLAIMS};
