//! End-to-end flows through the authorization and token services.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use idserver_auth::oauth::{
    AuthorizationRequest, AuthorizeDecision, AuthorizeService, ResponseMode,
};
use idserver_auth::storage::memory::{
    InMemoryClientStorage, InMemoryConsentStorage, InMemoryJsonWebKeyStorage,
    InMemoryResourceOwnerStorage, InMemoryScopeStorage, hash_password,
};
use idserver_auth::token::service::{
    AuthorizationCodeGrant, ClientCredentialsGrant, PasswordGrant, RefreshTokenGrant,
};
use idserver_auth::{
    AuthError, Client, ClientSecret, CodeChallengeMethod, Consent, ConsentStorage, GrantType,
    IdServerConfig,
    IdTokenBuilder, JsonWebKeyStorage, JwsEngine, ResourceOwner, ResponseType, Scope,
    SigningAlgorithm, TokenEndpointAuthMethod, TokenService, TokenStore,
};

const REDIRECT_URI: &str = "https://app.example.com/cb";

struct TestServer {
    authorize: AuthorizeService,
    tokens: TokenService,
    store: Arc<TokenStore>,
    keys: Arc<InMemoryJsonWebKeyStorage>,
    client: Client,
}

fn web_client() -> Client {
    Client {
        client_id: "web-app".to_string(),
        client_name: Some("Web app".to_string()),
        secrets: vec![ClientSecret::SharedSecret("s3cret".to_string())],
        token_endpoint_auth_method: TokenEndpointAuthMethod::ClientSecretBasic,
        grant_types: vec![
            GrantType::AuthorizationCode,
            GrantType::Implicit,
            GrantType::ClientCredentials,
            GrantType::Password,
            GrantType::RefreshToken,
        ],
        response_types: vec![ResponseType::Code, ResponseType::Token, ResponseType::IdToken],
        allowed_scopes: vec![
            "openid".to_string(),
            "profile".to_string(),
            "email".to_string(),
        ],
        redirect_uris: vec![REDIRECT_URI.to_string()],
        id_token_signed_response_alg: None,
        id_token_encrypted_response_alg: None,
        id_token_encrypted_response_enc: None,
        jwks: None,
    }
}

async fn server_with(client: Client, consented: bool) -> TestServer {
    let clients = Arc::new(InMemoryClientStorage::with_clients([client.clone()]));
    let consents = Arc::new(InMemoryConsentStorage::new());
    if consented {
        consents
            .insert(&Consent {
                id: "consent-1".to_string(),
                subject: "user-1".to_string(),
                client_id: client.client_id.clone(),
                granted_scopes: client.allowed_scopes.clone(),
                granted_claims: vec![],
            })
            .await
            .unwrap();
    }

    let mut claims = BTreeMap::new();
    claims.insert("email".to_string(), serde_json::json!("user@example.com"));
    claims.insert("name".to_string(), serde_json::json!("Test User"));
    let owners = Arc::new(InMemoryResourceOwnerStorage::with_owners([ResourceOwner {
        subject: "user-1".to_string(),
        password_digest: hash_password("hunter2"),
        claims,
    }]));

    let scopes = Arc::new(InMemoryScopeStorage::with_scopes([
        Scope {
            name: "openid".to_string(),
            description: None,
            claims: vec!["sub".to_string()],
            is_openid_scope: true,
        },
        Scope {
            name: "profile".to_string(),
            description: None,
            claims: vec!["name".to_string()],
            is_openid_scope: true,
        },
        Scope {
            name: "email".to_string(),
            description: None,
            claims: vec!["email".to_string()],
            is_openid_scope: true,
        },
    ]));

    let keys = Arc::new(InMemoryJsonWebKeyStorage::bootstrap(SigningAlgorithm::RS256).unwrap());
    let config = Arc::new(IdServerConfig::default());
    let store = Arc::new(TokenStore::new());

    let id_tokens = Arc::new(IdTokenBuilder::new(
        Arc::clone(&clients) as _,
        Arc::clone(&keys) as _,
        Arc::clone(&config),
    ));

    let authorize = AuthorizeService::new(
        Arc::clone(&clients) as _,
        consents,
        Arc::clone(&owners) as _,
        Arc::clone(&scopes) as _,
        Arc::clone(&store),
        Arc::clone(&id_tokens),
        Arc::clone(&config),
    );
    let tokens = TokenService::new(
        Arc::clone(&store),
        owners,
        scopes,
        id_tokens,
        Arc::clone(&config),
    );

    TestServer {
        authorize,
        tokens,
        store,
        keys,
        client,
    }
}

fn code_request() -> AuthorizationRequest {
    AuthorizationRequest {
        client_id: "web-app".to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
        response_types: vec![ResponseType::Code],
        scopes: vec!["openid".to_string(), "email".to_string()],
        state: Some("xyz".to_string()),
        nonce: Some("n-0S6".to_string()),
        code_challenge: None,
        code_challenge_method: None,
        response_mode: None,
    }
}

fn redirect(decision: AuthorizeDecision) -> idserver_auth::AuthorizeRedirect {
    match decision {
        AuthorizeDecision::Redirect(r) => r,
        AuthorizeDecision::RequiresConsent { .. } => panic!("expected a redirect"),
    }
}

#[tokio::test]
async fn authorization_code_flow_end_to_end() {
    let server = server_with(web_client(), true).await;

    let decision = server
        .authorize
        .authorize(&code_request(), "user-1")
        .await
        .unwrap();
    let redirect = redirect(decision);
    assert_eq!(redirect.response_mode, ResponseMode::Query);
    assert_eq!(redirect.parameter("state"), Some("xyz"));
    let code = redirect.parameter("code").unwrap().to_string();

    let response = server
        .tokens
        .execute_authorization_code(
            &server.client,
            &AuthorizationCodeGrant {
                code,
                redirect_uri: REDIRECT_URI.to_string(),
                code_verifier: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(response.token_type, "Bearer");
    assert!(response.refresh_token.is_some());
    assert_eq!(response.scope, "openid email");

    // The ID token verifies against the server's active signing key and
    // carries the subject and nonce from the authorization request.
    let id_token = response.id_token.expect("openid scope produces an ID token");
    let key = server
        .keys
        .get_signing_key(SigningAlgorithm::RS256)
        .await
        .unwrap()
        .unwrap();
    let payload = JwsEngine::verify(&id_token, &key).unwrap();
    assert_eq!(payload.sub.as_deref(), Some("user-1"));
    assert_eq!(payload.nonce.as_deref(), Some("n-0S6"));
    assert_eq!(payload.claim("email"), Some(serde_json::json!("user@example.com")));
}

#[tokio::test]
async fn missing_consent_prompts_instead_of_redirecting() {
    let server = server_with(web_client(), false).await;
    let decision = server
        .authorize
        .authorize(&code_request(), "user-1")
        .await
        .unwrap();
    assert!(matches!(
        decision,
        AuthorizeDecision::RequiresConsent { .. }
    ));
}

#[tokio::test]
async fn granting_consent_persists_and_issues_the_code() {
    let server = server_with(web_client(), false).await;
    let request = code_request();

    let decision = server.authorize.authorize(&request, "user-1").await.unwrap();
    assert!(matches!(
        decision,
        AuthorizeDecision::RequiresConsent { .. }
    ));

    // The owner approves; the flow resumes and issues a code.
    let decision = server
        .authorize
        .grant_consent(&request, "user-1")
        .await
        .unwrap();
    let granted = redirect(decision);
    let code = granted.parameter("code").unwrap().to_string();
    let response = server
        .tokens
        .execute_authorization_code(
            &server.client,
            &AuthorizationCodeGrant {
                code,
                redirect_uri: REDIRECT_URI.to_string(),
                code_verifier: None,
            },
        )
        .await
        .unwrap();
    assert!(!response.access_token.is_empty());

    // The stored consent covers the next authorization without a prompt.
    let decision = server.authorize.authorize(&request, "user-1").await.unwrap();
    assert!(matches!(decision, AuthorizeDecision::Redirect(_)));
}

#[tokio::test]
async fn authorization_code_redeems_exactly_once() {
    let server = server_with(web_client(), true).await;
    let decision = server
        .authorize
        .authorize(&code_request(), "user-1")
        .await
        .unwrap();
    let code = redirect(decision).parameter("code").unwrap().to_string();

    let grant = AuthorizationCodeGrant {
        code,
        redirect_uri: REDIRECT_URI.to_string(),
        code_verifier: None,
    };
    assert!(
        server
            .tokens
            .execute_authorization_code(&server.client, &grant)
            .await
            .is_ok()
    );
    assert!(matches!(
        server
            .tokens
            .execute_authorization_code(&server.client, &grant)
            .await,
        Err(AuthError::InvalidGrant { .. })
    ));
}

#[tokio::test]
async fn code_with_wrong_redirect_uri_is_burned() {
    let server = server_with(web_client(), true).await;
    let decision = server
        .authorize
        .authorize(&code_request(), "user-1")
        .await
        .unwrap();
    let code = redirect(decision).parameter("code").unwrap().to_string();

    let wrong = AuthorizationCodeGrant {
        code: code.clone(),
        redirect_uri: "https://evil.example.com/cb".to_string(),
        code_verifier: None,
    };
    assert!(matches!(
        server
            .tokens
            .execute_authorization_code(&server.client, &wrong)
            .await,
        Err(AuthError::InvalidGrant { .. })
    ));

    // The failed attempt consumed the code; replaying with the right URI
    // also fails.
    let right = AuthorizationCodeGrant {
        code,
        redirect_uri: REDIRECT_URI.to_string(),
        code_verifier: None,
    };
    assert!(
        server
            .tokens
            .execute_authorization_code(&server.client, &right)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn pkce_verifier_enforced_when_challenge_present() {
    let server = server_with(web_client(), true).await;

    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

    let mut request = code_request();
    request.code_challenge = Some(challenge);
    request.code_challenge_method = Some(CodeChallengeMethod::S256);

    // Missing verifier fails
    let decision = server.authorize.authorize(&request, "user-1").await.unwrap();
    let code = redirect(decision).parameter("code").unwrap().to_string();
    assert!(
        server
            .tokens
            .execute_authorization_code(
                &server.client,
                &AuthorizationCodeGrant {
                    code,
                    redirect_uri: REDIRECT_URI.to_string(),
                    code_verifier: None,
                },
            )
            .await
            .is_err()
    );

    // Correct verifier succeeds
    let decision = server.authorize.authorize(&request, "user-1").await.unwrap();
    let code = redirect(decision).parameter("code").unwrap().to_string();
    assert!(
        server
            .tokens
            .execute_authorization_code(
                &server.client,
                &AuthorizationCodeGrant {
                    code,
                    redirect_uri: REDIRECT_URI.to_string(),
                    code_verifier: Some(verifier.to_string()),
                },
            )
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn implicit_flow_uses_fragment_and_issues_tokens_directly() {
    let server = server_with(web_client(), true).await;

    let mut request = code_request();
    request.response_types = vec![ResponseType::Token, ResponseType::IdToken];

    let decision = server.authorize.authorize(&request, "user-1").await.unwrap();
    let redirect = redirect(decision);
    assert_eq!(redirect.response_mode, ResponseMode::Fragment);
    assert!(redirect.parameter("code").is_none());
    assert!(redirect.parameter("id_token").is_some());

    let access_token = redirect.parameter("access_token").unwrap();
    let granted = server.store.get_by_access_token(access_token).unwrap();
    assert_eq!(granted.client_id, "web-app");
}

#[tokio::test]
async fn client_credentials_reuses_live_token() {
    let server = server_with(web_client(), true).await;
    let grant = ClientCredentialsGrant {
        scopes: vec!["profile".to_string()],
    };

    let first = server
        .tokens
        .execute_client_credentials(&server.client, &grant)
        .await
        .unwrap();
    let second = server
        .tokens
        .execute_client_credentials(&server.client, &grant)
        .await
        .unwrap();
    assert_eq!(first.access_token, second.access_token);

    // A different scope set mints a fresh token
    let other = server
        .tokens
        .execute_client_credentials(
            &server.client,
            &ClientCredentialsGrant {
                scopes: vec!["email".to_string()],
            },
        )
        .await
        .unwrap();
    assert_ne!(first.access_token, other.access_token);
}

#[tokio::test]
async fn client_credentials_rejects_disallowed_scopes() {
    let server = server_with(web_client(), true).await;
    let result = server
        .tokens
        .execute_client_credentials(
            &server.client,
            &ClientCredentialsGrant {
                scopes: vec!["admin".to_string()],
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::InvalidScope { .. })));
}

#[tokio::test]
async fn password_grant_authenticates_resource_owner() {
    let server = server_with(web_client(), true).await;

    let ok = server
        .tokens
        .execute_password(
            &server.client,
            &PasswordGrant {
                username: "user-1".to_string(),
                password: "hunter2".to_string(),
                scopes: vec!["openid".to_string(), "email".to_string()],
            },
        )
        .await
        .unwrap();
    assert!(ok.id_token.is_some());

    let bad = server
        .tokens
        .execute_password(
            &server.client,
            &PasswordGrant {
                username: "user-1".to_string(),
                password: "wrong".to_string(),
                scopes: vec!["openid".to_string()],
            },
        )
        .await;
    assert!(matches!(bad, Err(AuthError::InvalidGrant { .. })));
}

#[tokio::test]
async fn refresh_token_rotation_invalidates_previous_token() {
    let server = server_with(web_client(), true).await;
    let initial = server
        .tokens
        .execute_password(
            &server.client,
            &PasswordGrant {
                username: "user-1".to_string(),
                password: "hunter2".to_string(),
                scopes: vec!["email".to_string()],
            },
        )
        .await
        .unwrap();
    let refresh = initial.refresh_token.unwrap();

    let refreshed = server
        .tokens
        .execute_refresh_token(
            &server.client,
            &RefreshTokenGrant {
                refresh_token: refresh.clone(),
            },
        )
        .await
        .unwrap();
    assert_ne!(refreshed.access_token, initial.access_token);
    assert_ne!(refreshed.refresh_token.as_deref(), Some(refresh.as_str()));
    assert_eq!(refreshed.scope, "email");

    // The rotated-out token no longer redeems
    assert!(matches!(
        server
            .tokens
            .execute_refresh_token(&server.client, &RefreshTokenGrant { refresh_token: refresh })
            .await,
        Err(AuthError::InvalidGrant { .. })
    ));
}

#[tokio::test]
async fn grant_type_must_be_registered() {
    let mut client = web_client();
    client.grant_types = vec![GrantType::AuthorizationCode];
    let server = server_with(client.clone(), true).await;

    let result = server
        .tokens
        .execute_client_credentials(
            &client,
            &ClientCredentialsGrant {
                scopes: vec!["profile".to_string()],
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::UnauthorizedClient { .. })));
}

#[tokio::test]
async fn unregistered_redirect_uri_rejected() {
    let server = server_with(web_client(), true).await;
    let mut request = code_request();
    request.redirect_uri = "https://evil.example.com/cb".to_string();
    assert!(matches!(
        server.authorize.authorize(&request, "user-1").await,
        Err(AuthError::InvalidRequest { .. })
    ));
}
