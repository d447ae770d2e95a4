//! OAuth 2.0 / OpenID Connect endpoint logic.

pub mod authorize;
pub mod client_assertion;
pub mod client_auth;
pub mod pkce;

pub use authorize::{
    AuthorizationRequest, AuthorizeDecision, AuthorizeRedirect, AuthorizeService, ResponseMode,
    response_mode_for,
};
pub use client_assertion::{ClientAssertionVerifier, JWT_BEARER_ASSERTION_TYPE};
pub use client_auth::{AuthenticateInstruction, ClientAuthenticator};
pub use pkce::{CodeChallengeMethod, verify_challenge};
