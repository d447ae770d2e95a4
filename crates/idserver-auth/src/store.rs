//! In-memory grant store.
//!
//! [`TokenStore`] holds pending authorization codes and granted tokens
//! behind a single lock, so every multi-index mutation is atomic. The
//! store is plain shared state handed to the services that need it; there
//! is no process-global instance.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use time::OffsetDateTime;

use crate::error::{AuthError, AuthResult};
use crate::jwt::JwsPayload;
use crate::types::{AuthorizationCode, GrantedToken};

#[derive(Default)]
struct StoreInner {
    codes: HashMap<String, AuthorizationCode>,
    tokens: HashMap<String, GrantedToken>,
    by_access: HashMap<String, String>,
    by_refresh: HashMap<String, String>,
}

/// Thread-safe store for authorization codes and granted tokens.
#[derive(Default)]
pub struct TokenStore {
    inner: RwLock<StoreInner>,
}

impl TokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ========================================================================
    // Authorization codes
    // ========================================================================

    /// Stores a pending authorization code.
    ///
    /// # Errors
    ///
    /// Returns an error if a code with the same value is already pending.
    pub fn add_code(&self, code: AuthorizationCode) -> AuthResult<()> {
        let mut inner = self.write();
        if inner.codes.contains_key(&code.code) {
            return Err(AuthError::internal("authorization code collision"));
        }
        inner.codes.insert(code.code.clone(), code);
        Ok(())
    }

    /// Looks up a pending code without consuming it.
    #[must_use]
    pub fn get_code(&self, code: &str) -> Option<AuthorizationCode> {
        self.read().codes.get(code).cloned()
    }

    /// Removes and returns a pending code.
    ///
    /// The check-and-remove happens under a single write lock, so a code
    /// redeems at most once even under concurrent token requests.
    #[must_use]
    pub fn take_code(&self, code: &str) -> Option<AuthorizationCode> {
        self.write().codes.remove(code)
    }

    /// Removes a pending code.
    pub fn remove_code(&self, code: &str) {
        self.write().codes.remove(code);
    }

    // ========================================================================
    // Granted tokens
    // ========================================================================

    /// Stores a granted token and indexes it by access and refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token id, access token, or refresh token
    /// value is already taken. The checks and the index updates happen
    /// under one write lock, so a rejected insert leaves every index
    /// untouched.
    pub fn add_token(&self, token: GrantedToken) -> AuthResult<()> {
        let mut inner = self.write();
        if inner.tokens.contains_key(&token.id)
            || inner.by_access.contains_key(&token.access_token)
        {
            return Err(AuthError::internal("granted token collision"));
        }
        if let Some(refresh) = &token.refresh_token {
            if inner.by_refresh.contains_key(refresh) {
                return Err(AuthError::internal("granted token collision"));
            }
        }
        inner
            .by_access
            .insert(token.access_token.clone(), token.id.clone());
        if let Some(refresh) = &token.refresh_token {
            inner.by_refresh.insert(refresh.clone(), token.id.clone());
        }
        inner.tokens.insert(token.id.clone(), token);
        Ok(())
    }

    /// Looks up a granted token by access token value.
    #[must_use]
    pub fn get_by_access_token(&self, access_token: &str) -> Option<GrantedToken> {
        let inner = self.read();
        let id = inner.by_access.get(access_token)?;
        inner.tokens.get(id).cloned()
    }

    /// Looks up a granted token by refresh token value.
    #[must_use]
    pub fn get_by_refresh_token(&self, refresh_token: &str) -> Option<GrantedToken> {
        let inner = self.read();
        let id = inner.by_refresh.get(refresh_token)?;
        inner.tokens.get(id).cloned()
    }

    /// Removes and returns the token owning the given refresh token.
    ///
    /// Used for refresh token rotation: the old grant disappears in the
    /// same critical section that observes it, so each refresh token
    /// redeems at most once.
    #[must_use]
    pub fn take_by_refresh_token(&self, refresh_token: &str) -> Option<GrantedToken> {
        let mut inner = self.write();
        let id = inner.by_refresh.remove(refresh_token)?;
        let token = inner.tokens.remove(&id)?;
        inner.by_access.remove(&token.access_token);
        Some(token)
    }

    /// Removes a granted token and its indices.
    pub fn remove_token(&self, id: &str) {
        let mut inner = self.write();
        if let Some(token) = inner.tokens.remove(id) {
            inner.by_access.remove(&token.access_token);
            if let Some(refresh) = &token.refresh_token {
                inner.by_refresh.remove(refresh);
            }
        }
    }

    /// Finds a still-valid token that an equivalent grant can reuse.
    ///
    /// A candidate must belong to the same client, carry exactly the same
    /// scope set, be within its lifetime, and agree with the given claim
    /// sets on the standard resource-owner claims. The most recently
    /// minted candidate wins.
    #[must_use]
    pub fn find_reusable(
        &self,
        client_id: &str,
        scopes: &[String],
        id_token_payload: Option<&JwsPayload>,
        userinfo_payload: Option<&JwsPayload>,
        now: OffsetDateTime,
    ) -> Option<GrantedToken> {
        let inner = self.read();
        inner
            .tokens
            .values()
            .filter(|t| t.client_id == client_id)
            .filter(|t| scopes_equal(&t.scopes, scopes))
            .filter(|t| t.is_alive(now))
            .filter(|t| payloads_match(t.id_token_payload.as_ref(), id_token_payload))
            .filter(|t| payloads_match(t.userinfo_payload.as_ref(), userinfo_payload))
            .max_by_key(|t| t.created_at)
            .cloned()
    }

    /// Number of live granted tokens, for diagnostics.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.read().tokens.len()
    }
}

fn scopes_equal(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().all(|s| b.contains(s))
}

fn payloads_match(stored: Option<&JwsPayload>, requested: Option<&JwsPayload>) -> bool {
    match (stored, requested) {
        (None, None) => true,
        (Some(s), Some(r)) => s.matches_standard_claims(r),
        _ => false,
    }
}
