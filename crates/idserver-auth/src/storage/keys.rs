//! Key storage trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;
use crate::jwt::{EncryptionKeyPair, SigningAlgorithm, SigningKeyPair};

/// Storage operations for server key material.
///
/// Key pairs are handed out as `Arc` so callers can sign without cloning
/// private key material.
#[async_trait]
pub trait JsonWebKeyStorage: Send + Sync {
    /// Returns the active signing key for the given algorithm, if one
    /// exists.
    ///
    /// The active key is the newest stored key whose algorithm matches
    /// and whose `key_ops` permit signing.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_signing_key(
        &self,
        algorithm: SigningAlgorithm,
    ) -> AuthResult<Option<Arc<SigningKeyPair>>>;

    /// Returns every stored signing key, newest first, for JWKS export.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_signing_keys(&self) -> AuthResult<Vec<Arc<SigningKeyPair>>>;

    /// Returns the server encryption key pair, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_encryption_key(&self) -> AuthResult<Option<Arc<EncryptionKeyPair>>>;

    /// Adds a signing key. The newest key for each algorithm becomes the
    /// active one; older keys remain available for verification.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn add_signing_key(&self, key: SigningKeyPair) -> AuthResult<()>;

    /// Installs the server encryption key pair, replacing any previous
    /// one.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn set_encryption_key(&self, key: EncryptionKeyPair) -> AuthResult<()>;
}
