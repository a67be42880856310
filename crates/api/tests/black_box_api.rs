use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use bankapi_api::config::ApiConfig;
use bankapi_auth::{
    AccountStore, ActivationNotifier, AuthMode, InMemoryAccountStore, JwtClaims, Token, User,
    permissions,
};
use bankapi_core::UserId;

const JWT_SECRET: &str = "black-box-secret";
const ISSUER: &str = "bankapi-test";

/// Keeps every activation token instead of delivering it.
#[derive(Default)]
struct CapturingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl CapturingNotifier {
    fn token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl ActivationNotifier for CapturingNotifier {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((user.email.clone(), token.plaintext.clone()));
        Ok(())
    }
}

fn test_config(mode: AuthMode) -> ApiConfig {
    ApiConfig {
        jwt_secret: JWT_SECRET.to_string(),
        jwt_issuer: ISSUER.to_string(),
        auth_mode: mode,
        bcrypt_cost: 4,
        ..ApiConfig::default()
    }
}

/// Serve `app` on an ephemeral port.
async fn serve(app: axum::Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    store: Arc<InMemoryAccountStore>,
    notifier: Arc<CapturingNotifier>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(mode: AuthMode) -> Self {
        let config = test_config(mode);
        let store = Arc::new(InMemoryAccountStore::new());
        let notifier = Arc::new(CapturingNotifier::default());

        let app = bankapi_api::app::build_app_with(&config, store.clone(), notifier.clone())
            .expect("failed to build app");
        let (base_url, handle) = serve(app).await;

        Self {
            base_url,
            client: reqwest::Client::new(),
            store,
            notifier,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Value {
        let res = self
            .client
            .post(self.url("/v1/users"))
            .json(&json!({ "name": name, "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }

    /// The notifier runs in the background; poll until it has seen `email`.
    async fn activation_token(&self, email: &str) -> String {
        for _ in 0..50 {
            if let Some(token) = self.notifier.token_for(email) {
                return token;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("no activation token was sent to {email}");
    }

    async fn activate(&self, token: &str) -> reqwest::Response {
        self.client
            .put(self.url("/v1/users/activated"))
            .json(&json!({ "token": token }))
            .send()
            .await
            .unwrap()
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/v1/tokens/authentication"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Register, activate and log in; returns the user id and a bearer token.
    async fn active_session(&self, name: &str, email: &str, password: &str) -> (i64, String) {
        let body = self.register(name, email, password).await;
        let id = body["user"]["id"].as_i64().unwrap();
        let token = self.activation_token(email).await;
        assert_eq!(self.activate(&token).await.status(), StatusCode::OK);

        let res = self.login(email, password).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        let bearer = body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string();
        (id, bearer)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(secret: &str, user_id: i64, issued: chrono::DateTime<Utc>, ttl: ChronoDuration) -> String {
    let claims = JwtClaims::new(UserId::new(user_id), ISSUER, issued, ttl);
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn registration_then_single_use_activation() {
    let server = TestServer::spawn(AuthMode::Opaque).await;

    let body = server
        .register("alice", "alice@example.com", "pa55word-alice")
        .await;
    assert_eq!(body["user"]["name"], "alice");
    assert_eq!(body["user"]["activated"], false);
    assert!(body["user"].get("password").is_none());

    let returned = body["activation_token"].as_object().unwrap();
    assert_eq!(returned.len(), 2);
    assert!(returned.contains_key("expiry"));

    let token = server.activation_token("alice@example.com").await;
    assert_eq!(returned["token"], token.as_str());
    let res = server.activate(&token).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["activated"], true);
    assert_eq!(body["user"]["version"], 2);

    let res = server.activate(&token).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["fields"]["token"], "invalid or expired activation token");
}

#[tokio::test]
async fn duplicate_email_is_a_validation_error() {
    let server = TestServer::spawn(AuthMode::Opaque).await;
    server.register("alice", "alice@example.com", "pa55word-alice").await;

    let res = server
        .client
        .post(server.url("/v1/users"))
        .json(&json!({ "name": "alice2", "email": "ALICE@example.com", "password": "pa55word-other" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert!(body["fields"]["email"].is_string());
}

#[tokio::test]
async fn missing_permission_is_forbidden() {
    let server = TestServer::spawn(AuthMode::Opaque).await;
    let (id, bearer) = server
        .active_session("bob", "bob@example.com", "pa55word-bob")
        .await;

    let res = server
        .client
        .get(server.url(&format!("/v1/users/{id}")))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_permitted");

    server
        .store
        .grant_permissions(UserId::new(id), &[permissions::USERS_READ])
        .await
        .unwrap();

    let res = server
        .client
        .get(server.url(&format!("/v1/users/{id}")))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .client
        .get(server.url("/v1/users/not-a-number"))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_requests_reach_only_open_routes() {
    let server = TestServer::spawn(AuthMode::Opaque).await;

    let res = server
        .client
        .get(server.url("/v1/healthcheck"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["vary"], "Authorization");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "available");

    let res = server
        .client
        .get(server.url("/v1/users/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["vary"], "Authorization");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "authentication_required");
}

#[tokio::test]
async fn malformed_and_unknown_bearers_are_distinguished() {
    let server = TestServer::spawn(AuthMode::Opaque).await;

    let res = server
        .client
        .get(server.url("/v1/healthcheck"))
        .header("Authorization", "Token abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credentials");

    let res = server
        .client
        .get(server.url("/v1/healthcheck"))
        .bearer_auth("ABCDEFGHIJKLMNOPQRSTUVWXYZ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers()["www-authenticate"], "Bearer");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn inactive_users_cannot_use_activated_routes() {
    let server = TestServer::spawn(AuthMode::Opaque).await;
    server.register("carol", "carol@example.com", "pa55word-carol").await;

    let res = server.login("carol@example.com", "pa55word-carol").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let bearer = body["authentication_token"]["token"].as_str().unwrap();

    let res = server
        .client
        .get(server.url("/v1/users/me"))
        .bearer_auth(bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "inactive_account");

    // The activation token is not an authentication token.
    let activation = server.activation_token("carol@example.com").await;
    let res = server
        .client
        .get(server.url("/v1/users/me"))
        .bearer_auth(&activation)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let server = TestServer::spawn(AuthMode::Opaque).await;
    server.register("dave", "dave@example.com", "pa55word-dave").await;

    let res = server.login("dave@example.com", "not-the-password").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credentials");

    let res = server.login("nobody@example.com", "pa55word-dave").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn stale_profile_update_conflicts() {
    let server = TestServer::spawn(AuthMode::Opaque).await;
    let (_, bearer) = server
        .active_session("erin", "erin@example.com", "pa55word-erin")
        .await;

    let res = server
        .client
        .patch(server.url("/v1/users/me"))
        .bearer_auth(&bearer)
        .json(&json!({ "name": "erin b", "version": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["name"], "erin b");
    assert_eq!(body["user"]["version"], 3);

    let res = server
        .client
        .patch(server.url("/v1/users/me"))
        .bearer_auth(&bearer)
        .json(&json!({ "name": "erin c", "version": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn revoked_tokens_stop_authenticating() {
    let server = TestServer::spawn(AuthMode::Opaque).await;
    let (_, bearer) = server
        .active_session("frank", "frank@example.com", "pa55word-frank")
        .await;

    let res = server
        .client
        .get(server.url("/v1/users/me"))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["permissions"], json!(["accounts:read"]));

    let res = server
        .client
        .delete(server.url("/v1/tokens/authentication"))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["revoked"], 1);

    let res = server
        .client
        .get(server.url("/v1/users/me"))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn granting_requires_users_write() {
    let server = TestServer::spawn(AuthMode::Opaque).await;
    let (admin_id, admin) = server
        .active_session("admin", "admin@example.com", "pa55word-admin")
        .await;
    let body = server.register("gina", "gina@example.com", "pa55word-gina").await;
    let gina_id = body["user"]["id"].as_i64().unwrap();

    let grant = |bearer: String| {
        let client = server.client.clone();
        let url = server.url(&format!("/v1/users/{gina_id}/permissions"));
        async move {
            client
                .post(url)
                .bearer_auth(bearer)
                .json(&json!({ "codes": ["users:read"] }))
                .send()
                .await
                .unwrap()
        }
    };

    assert_eq!(grant(admin.clone()).await.status(), StatusCode::FORBIDDEN);

    server
        .store
        .grant_permissions(UserId::new(admin_id), &[permissions::USERS_WRITE])
        .await
        .unwrap();

    let res = grant(admin).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["permissions"], json!(["accounts:read", "users:read"]));
}

#[tokio::test]
async fn signed_claims_mode_authenticates_with_jwts() {
    let server = TestServer::spawn(AuthMode::SignedClaims).await;
    let body = server
        .register("hank", "hank@example.com", "pa55word-hank")
        .await;
    let id = body["user"]["id"].as_i64().unwrap();
    let activation = server.activation_token("hank@example.com").await;
    assert_eq!(server.activate(&activation).await.status(), StatusCode::OK);

    let res = server
        .client
        .post(server.url("/v1/tokens/jwt"))
        .json(&json!({ "email": "hank@example.com", "password": "pa55word-hank" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let jwt = body["authentication_token"]["token"].as_str().unwrap();

    let res = server
        .client
        .get(server.url("/v1/users/me"))
        .bearer_auth(jwt)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["id"], id);

    let now = Utc::now();
    let forged = mint_jwt("some-other-secret", id, now, ChronoDuration::minutes(10));
    let expired = mint_jwt(
        JWT_SECRET,
        id,
        now - ChronoDuration::hours(2),
        ChronoDuration::hours(1),
    );
    for bearer in [forged, expired] {
        let res = server
            .client
            .get(server.url("/v1/users/me"))
            .bearer_auth(&bearer)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "invalid_token");
    }

    let fresh = mint_jwt(JWT_SECRET, id, now, ChronoDuration::minutes(10));
    let res = server
        .client
        .get(server.url("/v1/users/me"))
        .bearer_auth(&fresh)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn production_wiring_returns_the_activation_token_to_the_registrant() {
    let app = bankapi_api::app::build_app(&test_config(AuthMode::Opaque))
        .await
        .expect("failed to build app");
    let (base_url, handle) = serve(app).await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{base_url}/v1/users"))
        .json(&json!({ "name": "ivy", "email": "ivy@example.com", "password": "pa55word-ivy" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let token = body["activation_token"]["token"].as_str().unwrap().to_string();

    let res = client
        .put(format!("{base_url}/v1/users/activated"))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["user"]["activated"], true);

    let res = client
        .put(format!("{base_url}/v1/users/activated"))
        .json(&json!({ "token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    handle.abort();
}

#[tokio::test]
async fn activation_token_can_be_reissued_with_credentials() {
    let server = TestServer::spawn(AuthMode::Opaque).await;
    let body = server.register("jane", "jane@example.com", "pa55word-jane").await;
    let first = body["activation_token"]["token"].as_str().unwrap().to_string();

    let reissue = |password: &'static str| {
        let client = server.client.clone();
        let url = server.url("/v1/tokens/activation");
        async move {
            client
                .post(url)
                .json(&json!({ "email": "jane@example.com", "password": password }))
                .send()
                .await
                .unwrap()
        }
    };

    assert_eq!(
        reissue("not-the-password").await.status(),
        StatusCode::UNAUTHORIZED
    );

    let res = reissue("pa55word-jane").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let second = body["activation_token"]["token"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    assert_eq!(
        server.activate(&first).await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(server.activate(&second).await.status(), StatusCode::OK);

    let res = reissue("pa55word-jane").await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn token_routes_follow_the_authentication_mode() {
    let credentials = json!({ "email": "kim@example.com", "password": "pa55word-kim" });

    let opaque = TestServer::spawn(AuthMode::Opaque).await;
    let res = opaque
        .client
        .post(opaque.url("/v1/tokens/jwt"))
        .json(&credentials)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let signed = TestServer::spawn(AuthMode::SignedClaims).await;
    for res in [
        signed
            .client
            .post(signed.url("/v1/tokens/authentication"))
            .json(&credentials)
            .send()
            .await
            .unwrap(),
        signed
            .client
            .delete(signed.url("/v1/tokens/authentication"))
            .send()
            .await
            .unwrap(),
    ] {
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
