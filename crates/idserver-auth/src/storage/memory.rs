//! In-memory storage backends.
//!
//! Suitable for tests and for embedding the server without an external
//! database. Every backend is a `RwLock`-guarded map keyed the way the
//! corresponding trait looks things up.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::error::AuthError;
use crate::jwt::{EncryptionKeyPair, SigningAlgorithm, SigningKeyPair};
use crate::storage::{
    ClientStorage, ConsentStorage, JsonWebKeyStorage, ResourceOwnerStorage, ScopeStorage,
};
use crate::types::{Client, Consent, ResourceOwner, Scope};

/// Hex-encoded SHA-256 digest of a password.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ============================================================================
// Clients
// ============================================================================

/// In-memory client registry.
#[derive(Default)]
pub struct InMemoryClientStorage {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientStorage {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the given clients.
    #[must_use]
    pub fn with_clients(clients: impl IntoIterator<Item = Client>) -> Self {
        let map = clients
            .into_iter()
            .map(|c| (c.client_id.clone(), c))
            .collect();
        Self {
            clients: RwLock::new(map),
        }
    }
}

#[async_trait]
impl ClientStorage for InMemoryClientStorage {
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn list(&self) -> AuthResult<Vec<Client>> {
        Ok(self.clients.read().await.values().cloned().collect())
    }

    async fn create(&self, client: &Client) -> AuthResult<Client> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.client_id) {
            return Err(AuthError::invalid_request(format!(
                "client '{}' already exists",
                client.client_id
            )));
        }
        clients.insert(client.client_id.clone(), client.clone());
        Ok(client.clone())
    }
}

// ============================================================================
// Resource owners
// ============================================================================

/// In-memory resource owner registry.
#[derive(Default)]
pub struct InMemoryResourceOwnerStorage {
    owners: RwLock<HashMap<String, ResourceOwner>>,
}

impl InMemoryResourceOwnerStorage {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the given resource owners.
    #[must_use]
    pub fn with_owners(owners: impl IntoIterator<Item = ResourceOwner>) -> Self {
        let map = owners
            .into_iter()
            .map(|o| (o.subject.clone(), o))
            .collect();
        Self {
            owners: RwLock::new(map),
        }
    }
}

#[async_trait]
impl ResourceOwnerStorage for InMemoryResourceOwnerStorage {
    async fn find_by_subject(&self, subject: &str) -> AuthResult<Option<ResourceOwner>> {
        Ok(self.owners.read().await.get(subject).cloned())
    }

    async fn find_by_credentials(
        &self,
        subject: &str,
        password: &str,
    ) -> AuthResult<Option<ResourceOwner>> {
        let owners = self.owners.read().await;
        let Some(owner) = owners.get(subject) else {
            return Ok(None);
        };
        let presented = hash_password(password);
        let matches = presented
            .as_bytes()
            .ct_eq(owner.password_digest.as_bytes())
            .unwrap_u8()
            == 1;
        Ok(matches.then(|| owner.clone()))
    }

    async fn create(&self, owner: &ResourceOwner) -> AuthResult<ResourceOwner> {
        let mut owners = self.owners.write().await;
        if owners.contains_key(&owner.subject) {
            return Err(AuthError::invalid_request(format!(
                "resource owner '{}' already exists",
                owner.subject
            )));
        }
        owners.insert(owner.subject.clone(), owner.clone());
        Ok(owner.clone())
    }
}

// ============================================================================
// Scopes
// ============================================================================

/// In-memory scope registry.
#[derive(Default)]
pub struct InMemoryScopeStorage {
    scopes: RwLock<HashMap<String, Scope>>,
}

impl InMemoryScopeStorage {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the given scopes.
    #[must_use]
    pub fn with_scopes(scopes: impl IntoIterator<Item = Scope>) -> Self {
        let map = scopes.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            scopes: RwLock::new(map),
        }
    }
}

#[async_trait]
impl ScopeStorage for InMemoryScopeStorage {
    async fn find_by_name(&self, name: &str) -> AuthResult<Option<Scope>> {
        Ok(self.scopes.read().await.get(name).cloned())
    }

    async fn resolve(&self, names: &[String]) -> AuthResult<Vec<Scope>> {
        let scopes = self.scopes.read().await;
        Ok(names.iter().filter_map(|n| scopes.get(n).cloned()).collect())
    }

    async fn create(&self, scope: &Scope) -> AuthResult<Scope> {
        self.scopes
            .write()
            .await
            .insert(scope.name.clone(), scope.clone());
        Ok(scope.clone())
    }
}

// ============================================================================
// Consents
// ============================================================================

/// In-memory consent store.
#[derive(Default)]
pub struct InMemoryConsentStorage {
    consents: RwLock<Vec<Consent>>,
}

impl InMemoryConsentStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentStorage for InMemoryConsentStorage {
    async fn find_by_subject_and_client(
        &self,
        subject: &str,
        client_id: &str,
    ) -> AuthResult<Vec<Consent>> {
        Ok(self
            .consents
            .read()
            .await
            .iter()
            .filter(|c| c.subject == subject && c.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, consent: &Consent) -> AuthResult<Consent> {
        self.consents.write().await.push(consent.clone());
        Ok(consent.clone())
    }
}

// ============================================================================
// Keys
// ============================================================================

/// In-memory key store.
///
/// Signing keys are kept in insertion order; the newest key for an
/// algorithm is the active one.
#[derive(Default)]
pub struct InMemoryJsonWebKeyStorage {
    signing_keys: RwLock<Vec<Arc<SigningKeyPair>>>,
    encryption_key: RwLock<Option<Arc<EncryptionKeyPair>>>,
}

impl InMemoryJsonWebKeyStorage {
    /// Creates an empty key store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a key store with a fresh RSA signing key for the given
    /// algorithm and a fresh encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn bootstrap(algorithm: SigningAlgorithm) -> AuthResult<Self> {
        let signing = if algorithm.is_ec() {
            SigningKeyPair::generate_ec()?
        } else {
            SigningKeyPair::generate_rsa(algorithm)?
        };
        Ok(Self {
            signing_keys: RwLock::new(vec![Arc::new(signing)]),
            encryption_key: RwLock::new(Some(Arc::new(EncryptionKeyPair::generate()?))),
        })
    }
}

#[async_trait]
impl JsonWebKeyStorage for InMemoryJsonWebKeyStorage {
    async fn get_signing_key(
        &self,
        algorithm: SigningAlgorithm,
    ) -> AuthResult<Option<Arc<SigningKeyPair>>> {
        let keys = self.signing_keys.read().await;
        Ok(keys
            .iter()
            .rev()
            .find(|k| k.supports_signing(algorithm))
            .cloned())
    }

    async fn list_signing_keys(&self) -> AuthResult<Vec<Arc<SigningKeyPair>>> {
        let keys = self.signing_keys.read().await;
        Ok(keys.iter().rev().cloned().collect())
    }

    async fn get_encryption_key(&self) -> AuthResult<Option<Arc<EncryptionKeyPair>>> {
        Ok(self.encryption_key.read().await.clone())
    }

    async fn add_signing_key(&self, key: SigningKeyPair) -> AuthResult<()> {
        self.signing_keys.write().await.push(Arc::new(key));
        Ok(())
    }

    async fn set_encryption_key(&self, key: EncryptionKeyPair) -> AuthResult<()> {
        *self.encryption_key.write().await = Some(Arc::new(key));
        Ok(())
    }
}
