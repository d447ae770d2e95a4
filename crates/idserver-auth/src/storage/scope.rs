//! Scope storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Scope;

/// Storage operations for registered scopes.
#[async_trait]
pub trait ScopeStorage: Send + Sync {
    /// Finds a scope by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_name(&self, name: &str) -> AuthResult<Option<Scope>>;

    /// Resolves a list of scope names, dropping names that are not
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn resolve(&self, names: &[String]) -> AuthResult<Vec<Scope>>;

    /// Registers a scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, scope: &Scope) -> AuthResult<Scope>;
}
