//! Consent storage trait.
//!
//! Consent records let repeat authorizations skip the consent screen: a
//! stored consent whose scopes are a superset of the request covers it.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Consent;

/// Storage operations for consent records.
#[async_trait]
pub trait ConsentStorage: Send + Sync {
    /// Finds the consents a resource owner granted to a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_subject_and_client(
        &self,
        subject: &str,
        client_id: &str,
    ) -> AuthResult<Vec<Consent>>;

    /// Records a consent decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn insert(&self, consent: &Consent) -> AuthResult<Consent>;
}
