//! Token endpoint services.

pub mod id_token;
pub mod introspection;
pub mod service;

pub use id_token::IdTokenBuilder;
pub use introspection::{
    IntrospectionRequest, IntrospectionResponse, IntrospectionService, TokenTypeHint,
};
pub use service::{
    AuthorizationCodeGrant, ClientCredentialsGrant, PasswordGrant, RefreshTokenGrant,
    TokenResponse, TokenService,
};
