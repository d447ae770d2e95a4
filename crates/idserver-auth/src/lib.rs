//! # idserver-auth
//!
//! OAuth 2.0 / OpenID Connect authorization server core.
//!
//! This crate provides:
//! - JWS signing and verification, with JWE wrapping for nested tokens
//! - Token endpoint client authentication across five declared methods
//! - Authorization endpoint logic with consent tracking and PKCE
//! - Grant handlers for code, client credentials, password, and refresh
//! - Token introspection for resource servers
//! - ID token construction with multi-audience rules
//! - An in-memory grant store with exactly-once code redemption
//!
//! ## Modules
//!
//! - [`config`] - Server configuration
//! - [`jwt`] - JWS/JWE engines and key material
//! - [`oauth`] - Authorization endpoint and client authentication
//! - [`token`] - Token endpoint grant handlers and ID tokens
//! - [`store`] - Authorization code and granted token store
//! - [`storage`] - Storage traits and in-memory backends
//! - [`types`] - Clients, scopes, resource owners, grants

pub mod config;
pub mod error;
pub mod jwt;
pub mod oauth;
pub mod storage;
pub mod store;
pub mod token;
pub mod types;

pub use config::{IdServerConfig, OAuthConfig, SigningConfig};
pub use error::{AuthError, AuthResult, ErrorCategory};
pub use jwt::{
    Audience, EncryptionKeyPair, Jwk, JweEngine, JwsEngine, JwsPayload, KeyOperation, KeyUse,
    SigningAlgorithm, SigningKeyPair,
};
pub use oauth::{
    AuthenticateInstruction, AuthorizationRequest, AuthorizeDecision, AuthorizeRedirect,
    AuthorizeService, ClientAuthenticator, CodeChallengeMethod, ResponseMode,
};
pub use storage::{
    ClientStorage, ConsentStorage, JsonWebKeyStorage, ResourceOwnerStorage, ScopeStorage,
};
pub use store::TokenStore;
pub use token::{
    IdTokenBuilder, IntrospectionRequest, IntrospectionResponse, IntrospectionService,
    TokenResponse, TokenService,
};
pub use types::{
    AuthorizationCode, Client, ClientSecret, Consent, GrantType, GrantedToken, ResourceOwner,
    ResponseType, Scope, TokenEndpointAuthMethod,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::jwt::{JwsEngine, JwsPayload, SigningAlgorithm, SigningKeyPair};
    pub use crate::oauth::{AuthenticateInstruction, ClientAuthenticator};
    pub use crate::storage::{
        ClientStorage, ConsentStorage, JsonWebKeyStorage, ResourceOwnerStorage, ScopeStorage,
    };
    pub use crate::store::TokenStore;
    pub use crate::token::{TokenResponse, TokenService};
    pub use crate::types::{Client, GrantType, GrantedToken, ResponseType};
    pub use crate::{AuthResult, IdServerConfig};
}
