//! Client storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Client, ResponseType};

/// Storage operations for registered clients.
///
/// Implementations handle the actual persistence; the in-memory backend
/// in [`crate::storage::memory`] is suitable for tests and embedding.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by its `client_id`.
    ///
    /// Returns `None` if the client does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Lists every registered client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list(&self) -> AuthResult<Vec<Client>>;

    /// Registers a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if a client with the same `client_id` already
    /// exists or the storage operation fails.
    async fn create(&self, client: &Client) -> AuthResult<Client>;

    /// Lists the clients that may receive the given response type.
    ///
    /// Used to build ID token audiences: every client registered for the
    /// `id_token` response type is a legitimate consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_response_type(&self, response_type: ResponseType) -> AuthResult<Vec<Client>> {
        let clients = self.list().await?;
        Ok(clients
            .into_iter()
            .filter(|c| c.supports_response_type(response_type))
            .collect())
    }
}
