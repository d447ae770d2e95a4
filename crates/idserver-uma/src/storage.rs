//! Storage traits and in-memory backends for UMA data.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use idserver_auth::{AuthError, AuthResult};
use time::OffsetDateTime;

use crate::types::{Policy, ResourceSet, Ticket};

// ============================================================================
// Resource sets
// ============================================================================

/// Storage operations for registered resource sets.
#[async_trait]
pub trait ResourceSetStorage: Send + Sync {
    /// Finds a resource set by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<ResourceSet>>;

    /// Registers a resource set.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already taken or the storage
    /// operation fails.
    async fn create(&self, resource_set: &ResourceSet) -> AuthResult<ResourceSet>;
}

/// In-memory resource set registry.
#[derive(Default)]
pub struct InMemoryResourceSetStorage {
    resource_sets: tokio::sync::RwLock<HashMap<String, ResourceSet>>,
}

impl InMemoryResourceSetStorage {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the given resource sets.
    #[must_use]
    pub fn with_resource_sets(sets: impl IntoIterator<Item = ResourceSet>) -> Self {
        let map = sets.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            resource_sets: tokio::sync::RwLock::new(map),
        }
    }
}

#[async_trait]
impl ResourceSetStorage for InMemoryResourceSetStorage {
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<ResourceSet>> {
        Ok(self.resource_sets.read().await.get(id).cloned())
    }

    async fn create(&self, resource_set: &ResourceSet) -> AuthResult<ResourceSet> {
        let mut sets = self.resource_sets.write().await;
        if sets.contains_key(&resource_set.id) {
            return Err(AuthError::invalid_request(format!(
                "resource set '{}' already exists",
                resource_set.id
            )));
        }
        sets.insert(resource_set.id.clone(), resource_set.clone());
        Ok(resource_set.clone())
    }
}

// ============================================================================
// Policies
// ============================================================================

/// Storage operations for authorization policies.
#[async_trait]
pub trait PolicyStorage: Send + Sync {
    /// Finds a policy by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<Policy>>;

    /// Finds every policy protecting a resource set.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_resource_set(&self, resource_set_id: &str) -> AuthResult<Vec<Policy>>;

    /// Stores a policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, policy: &Policy) -> AuthResult<Policy>;
}

/// In-memory policy store.
#[derive(Default)]
pub struct InMemoryPolicyStorage {
    policies: tokio::sync::RwLock<HashMap<String, Policy>>,
}

impl InMemoryPolicyStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStorage for InMemoryPolicyStorage {
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<Policy>> {
        Ok(self.policies.read().await.get(id).cloned())
    }

    async fn find_by_resource_set(&self, resource_set_id: &str) -> AuthResult<Vec<Policy>> {
        Ok(self
            .policies
            .read()
            .await
            .values()
            .filter(|p| p.resource_set_ids.iter().any(|id| id == resource_set_id))
            .cloned()
            .collect())
    }

    async fn create(&self, policy: &Policy) -> AuthResult<Policy> {
        self.policies
            .write()
            .await
            .insert(policy.id.clone(), policy.clone());
        Ok(policy.clone())
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Thread-safe store for permission tickets.
///
/// Redeeming a ticket is a check-and-remove under a single write lock, so
/// each ticket redeems at most once.
#[derive(Default)]
pub struct TicketStore {
    inner: RwLock<HashMap<String, Ticket>>,
}

impl TicketStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Ticket>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Ticket>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stores a ticket.
    pub fn add(&self, ticket: Ticket) {
        self.write().insert(ticket.id.clone(), ticket);
    }

    /// Looks up a ticket without consuming it.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Ticket> {
        self.read().get(id).cloned()
    }

    /// Removes and returns a ticket.
    #[must_use]
    pub fn take(&self, id: &str) -> Option<Ticket> {
        self.write().remove(id)
    }

    /// Marks every line of a ticket as approved by the resource owner
    /// and returns the updated ticket.
    #[must_use]
    pub fn approve(&self, id: &str) -> Option<Ticket> {
        let mut guard = self.write();
        let ticket = guard.get_mut(id)?;
        for line in &mut ticket.lines {
            line.is_authorized_by_ro = true;
        }
        Some(ticket.clone())
    }

    /// Drops every ticket past its expiry.
    pub fn purge_expired(&self, now: OffsetDateTime) {
        self.write().retain(|_, t| !t.is_expired(now));
    }
}
