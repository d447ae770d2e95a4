//! Permission ticket issuance.

use std::sync::Arc;

use idserver_auth::{AuthError, AuthResult};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::UmaConfig;
use crate::storage::{ResourceSetStorage, TicketStore};
use crate::types::{Ticket, TicketLine};

/// One permission a resource server requests on behalf of a client.
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    /// Target resource set.
    pub resource_set_id: String,

    /// Requested scopes.
    pub scopes: Vec<String>,
}

/// Issues permission tickets.
pub struct TicketService {
    resource_sets: Arc<dyn ResourceSetStorage>,
    store: Arc<TicketStore>,
    config: Arc<UmaConfig>,
}

impl TicketService {
    /// Creates the service.
    pub fn new(
        resource_sets: Arc<dyn ResourceSetStorage>,
        store: Arc<TicketStore>,
        config: Arc<UmaConfig>,
    ) -> Self {
        Self {
            resource_sets,
            store,
            config,
        }
    }

    /// Issues a ticket covering the requested permissions.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when the request is empty or names an
    /// unknown resource set, and `InvalidScope` when a requested scope is
    /// outside the resource set's registered scopes.
    pub async fn create(
        &self,
        client_id: &str,
        requests: &[PermissionRequest],
    ) -> AuthResult<Ticket> {
        if requests.is_empty() {
            return Err(AuthError::invalid_request("no permission requested"));
        }

        let mut lines = Vec::with_capacity(requests.len());
        for request in requests {
            let resource_set = self
                .resource_sets
                .find_by_id(&request.resource_set_id)
                .await?
                .ok_or_else(|| {
                    AuthError::invalid_request(format!(
                        "resource set '{}' does not exist",
                        request.resource_set_id
                    ))
                })?;

            let outside: Vec<&String> = request
                .scopes
                .iter()
                .filter(|s| !resource_set.scopes.contains(s))
                .collect();
            if !outside.is_empty() {
                return Err(AuthError::invalid_scope(format!(
                    "scopes not registered for resource set '{}': {outside:?}",
                    resource_set.id
                )));
            }

            lines.push(TicketLine {
                resource_set_id: request.resource_set_id.clone(),
                scopes: request.scopes.clone(),
                is_authorized_by_ro: false,
            });
        }

        let now = OffsetDateTime::now_utc();
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            lines,
            created_at: now,
            expires_at: now + self.config.ticket_lifetime,
        };
        self.store.add(ticket.clone());

        tracing::debug!(ticket_id = %ticket.id, %client_id, "permission ticket issued");
        Ok(ticket)
    }

    /// Records the resource owner's approval of a pending ticket.
    ///
    /// Re-evaluating the ticket afterwards grants the permissions that
    /// were only waiting on consent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when no pending ticket has the given id.
    pub fn approve(&self, ticket_id: &str) -> AuthResult<Ticket> {
        let ticket = self.store.approve(ticket_id).ok_or_else(|| {
            AuthError::invalid_request(format!("ticket '{ticket_id}' does not exist"))
        })?;
        tracing::debug!(%ticket_id, "ticket approved by resource owner");
        Ok(ticket)
    }
}
