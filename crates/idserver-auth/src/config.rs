//! Authorization server configuration.
//!
//! Configuration for token lifetimes, the issuer identity, and signing
//! defaults. All durations deserialize from humantime strings
//! (`"10m"`, `"1h"`, `"90d"`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::jwt::SigningAlgorithm;

/// Root authorization server configuration.
///
/// # Example (TOML)
///
/// ```toml
/// issuer = "https://auth.example.com"
///
/// [oauth]
/// authorization_code_lifetime = "10m"
/// access_token_lifetime = "1h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdServerConfig {
    /// Server issuer URL (used in token `iss` claims and as the expected
    /// audience of client assertions).
    pub issuer: String,

    /// OAuth 2.0 configuration.
    pub oauth: OAuthConfig,

    /// Token signing configuration.
    pub signing: SigningConfig,
}

impl Default for IdServerConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            oauth: OAuthConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

/// OAuth 2.0 configuration.
///
/// Controls token lifetimes and refresh token behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Authorization code lifetime.
    /// Codes should be short-lived for security.
    #[serde(with = "humantime_serde")]
    pub authorization_code_lifetime: Duration,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_lifetime: Duration,

    /// Rotate refresh tokens on use.
    /// When enabled, a new refresh token is issued with each refresh and
    /// the previous one is invalidated.
    pub refresh_token_rotation: bool,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorization_code_lifetime: Duration::from_secs(600), // 10 minutes
            access_token_lifetime: Duration::from_secs(3600),      // 1 hour
            id_token_lifetime: Duration::from_secs(3600),          // 1 hour
            refresh_token_rotation: true,
        }
    }
}

/// Token signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm used when a client declares no preference.
    pub default_algorithm: SigningAlgorithm,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            default_algorithm: SigningAlgorithm::RS256,
        }
    }
}
