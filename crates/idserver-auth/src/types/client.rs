//! Registered OAuth 2.0 / OpenID Connect client model.

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::jwt::{Jwk, SigningAlgorithm};

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code grant.
    AuthorizationCode,
    /// Implicit grant.
    Implicit,
    /// Client credentials grant.
    ClientCredentials,
    /// Resource owner password credentials grant.
    Password,
    /// Refresh token grant.
    RefreshToken,
    /// UMA ticket grant.
    #[serde(rename = "urn:ietf:params:oauth:grant-type:uma-ticket")]
    UmaTicket,
}

impl GrantType {
    /// Parses a grant type as it appears in token requests.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "implicit" => Some(Self::Implicit),
            "client_credentials" => Some(Self::ClientCredentials),
            "password" => Some(Self::Password),
            "refresh_token" => Some(Self::RefreshToken),
            "urn:ietf:params:oauth:grant-type:uma-ticket" => Some(Self::UmaTicket),
            _ => None,
        }
    }
}

/// OAuth 2.0 / OpenID Connect response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Authorization code.
    Code,
    /// Access token (implicit).
    Token,
    /// ID token.
    IdToken,
}

impl ResponseType {
    /// Parses a single response type value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "code" => Some(Self::Code),
            "token" => Some(Self::Token),
            "id_token" => Some(Self::IdToken),
            _ => None,
        }
    }
}

/// Token endpoint authentication methods.
///
/// Every client declares exactly one method; credentials presented through
/// a different channel than the declared one do not authenticate the
/// client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// HTTP Basic authentication with the shared secret.
    ClientSecretBasic,
    /// Secret in the request body.
    ClientSecretPost,
    /// HS256 client assertion signed with the shared secret.
    ClientSecretJwt,
    /// Asymmetric client assertion verified against the client's JWKS.
    PrivateKeyJwt,
    /// Mutual-TLS certificate thumbprint.
    TlsClientAuth,
}

/// A client credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ClientSecret {
    /// Shared secret for basic/post/secret-jwt authentication.
    SharedSecret(String),
    /// SHA-1 thumbprint of the client's TLS certificate.
    X509Thumbprint(String),
}

/// A registered client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier.
    pub client_id: String,

    /// Human-readable client name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Registered credentials.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub secrets: Vec<ClientSecret>,

    /// Declared token endpoint authentication method.
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,

    /// Grant types the client may use.
    pub grant_types: Vec<GrantType>,

    /// Response types the client may request.
    pub response_types: Vec<ResponseType>,

    /// Scopes the client may be granted.
    pub allowed_scopes: Vec<String>,

    /// Registered redirect URIs (exact-match comparison).
    pub redirect_uris: Vec<String>,

    /// Preferred ID token signing algorithm; the server default applies
    /// when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<SigningAlgorithm>,

    /// ID token key management algorithm; when set together with
    /// `id_token_encrypted_response_enc`, ID tokens are JWE-wrapped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_alg: Option<String>,

    /// ID token content encryption algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_enc: Option<String>,

    /// Client public keys, for `private_key_jwt` assertion verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<Vec<Jwk>>,
}

impl Client {
    /// Returns the first shared secret, if any.
    #[must_use]
    pub fn shared_secret(&self) -> Option<&str> {
        self.secrets.iter().find_map(|s| match s {
            ClientSecret::SharedSecret(value) => Some(value.as_str()),
            ClientSecret::X509Thumbprint(_) => None,
        })
    }

    /// Compares a presented secret against the registered shared secrets.
    ///
    /// Case-sensitive, constant-time comparison.
    #[must_use]
    pub fn check_shared_secret(&self, presented: &str) -> bool {
        let mut matched = false;
        for secret in &self.secrets {
            if let ClientSecret::SharedSecret(value) = secret {
                matched |= value.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1;
            }
        }
        matched
    }

    /// Compares a presented certificate thumbprint against the registered
    /// thumbprints.
    #[must_use]
    pub fn check_thumbprint(&self, presented: &str) -> bool {
        let mut matched = false;
        for secret in &self.secrets {
            if let ClientSecret::X509Thumbprint(value) = secret {
                matched |= value.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1;
            }
        }
        matched
    }

    /// Returns `true` if the client may use the given grant type.
    #[must_use]
    pub fn supports_grant(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Returns `true` if the client may request the given response type.
    #[must_use]
    pub fn supports_response_type(&self, response_type: ResponseType) -> bool {
        self.response_types.contains(&response_type)
    }

    /// Returns `true` if the URI is registered (exact match).
    #[must_use]
    pub fn has_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == uri)
    }

    /// Restricts the requested scopes to the client's allowed set.
    #[must_use]
    pub fn filter_scopes(&self, requested: &[String]) -> Vec<String> {
        requested
            .iter()
            .filter(|s| self.allowed_scopes.contains(s))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_client() -> Client {
        Client {
            client_id: "c1".to_string(),
            client_name: Some("Test client".to_string()),
            secrets: vec![ClientSecret::SharedSecret("s3cret".to_string())],
            token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            response_types: vec![ResponseType::Code],
            allowed_scopes: vec!["openid".to_string(), "profile".to_string()],
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            id_token_signed_response_alg: None,
            id_token_encrypted_response_alg: None,
            id_token_encrypted_response_enc: None,
            jwks: None,
        }
    }

    #[test]
    fn test_secret_comparison_is_case_sensitive() {
        let client = sample_client();
        assert!(client.check_shared_secret("s3cret"));
        assert!(!client.check_shared_secret("S3CRET"));
        assert!(!client.check_shared_secret("s3cret "));
        assert!(!client.check_shared_secret(""));
    }

    #[test]
    fn test_thumbprint_does_not_match_as_shared_secret() {
        let mut client = sample_client();
        client.secrets = vec![ClientSecret::X509Thumbprint("abc123".to_string())];
        assert!(!client.check_shared_secret("abc123"));
        assert!(client.check_thumbprint("abc123"));
    }

    #[test]
    fn test_grant_type_parse() {
        assert_eq!(
            GrantType::parse("authorization_code"),
            Some(GrantType::AuthorizationCode)
        );
        assert_eq!(
            GrantType::parse("urn:ietf:params:oauth:grant-type:uma-ticket"),
            Some(GrantType::UmaTicket)
        );
        assert_eq!(GrantType::parse("device_code"), None);
    }

    #[test]
    fn test_scope_filtering() {
        let client = sample_client();
        let filtered = client.filter_scopes(&[
            "openid".to_string(),
            "admin".to_string(),
            "profile".to_string(),
        ]);
        assert_eq!(filtered, vec!["openid".to_string(), "profile".to_string()]);
    }

    #[test]
    fn test_redirect_uri_exact_match() {
        let client = sample_client();
        assert!(client.has_redirect_uri("https://app.example.com/cb"));
        assert!(!client.has_redirect_uri("https://app.example.com/cb/"));
        assert!(!client.has_redirect_uri("https://app.example.com/CB"));
    }
}
