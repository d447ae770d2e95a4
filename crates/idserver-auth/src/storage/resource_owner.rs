//! Resource owner storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::ResourceOwner;

/// Storage operations for resource owners (end users).
#[async_trait]
pub trait ResourceOwnerStorage: Send + Sync {
    /// Finds a resource owner by subject identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_subject(&self, subject: &str) -> AuthResult<Option<ResourceOwner>>;

    /// Finds a resource owner by credentials.
    ///
    /// Returns `None` both for unknown subjects and for wrong passwords,
    /// so callers cannot distinguish the two cases.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_credentials(
        &self,
        subject: &str,
        password: &str,
    ) -> AuthResult<Option<ResourceOwner>>;

    /// Creates a resource owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject already exists or the storage
    /// operation fails.
    async fn create(&self, owner: &ResourceOwner) -> AuthResult<ResourceOwner>;
}
