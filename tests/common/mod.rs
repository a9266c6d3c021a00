//! Shared harness: a dev-mode server on an ephemeral port and a `reqwest`
//! client that talks to it.

#![allow(dead_code)]

use clap::Parser;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use wicket::audit::{AuditLogger, TracingSink};
use wicket::auth::{hash_password, Argon2Hasher};
use wicket::store::seed::SeedData;
use wicket::store::{CredentialStore, MemoryStore, Principal};
use wicket::{AppState, Args};

pub const ADMIN_EMAIL: &str = "admin@test.az";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const DEMO_EMAIL: &str = "demo@test.az";
pub const DEMO_PASSWORD: &str = "demo1234";
/// Seeded with no role assignments
pub const GUEST_EMAIL: &str = "guest@test.az";
pub const GUEST_PASSWORD: &str = "guest1234";

pub fn dev_args(extra: &[&str]) -> Args {
    let mut argv = vec!["wicket", "--dev-mode"];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).unwrap()
}

/// Seeded state plus a principal that holds no roles
pub async fn seeded_state(extra: &[&str]) -> Arc<AppState> {
    state_over(Arc::new(MemoryStore::new()), extra).await
}

/// Seed `store` and build dev-mode state over it
pub async fn state_over(store: Arc<MemoryStore>, extra: &[&str]) -> Arc<AppState> {
    SeedData::build(&Argon2Hasher, || uuid::Uuid::new_v4().to_string())
        .unwrap()
        .load_into(&store)
        .await
        .unwrap();
    store
        .put_principal(Principal::new(
            "guest-1",
            GUEST_EMAIL,
            hash_password(GUEST_PASSWORD).unwrap(),
        ))
        .unwrap();

    let (audit, _writer) = AuditLogger::spawn(Arc::new(TracingSink));
    let state = AppState::new(
        dev_args(extra),
        Arc::clone(&store) as Arc<dyn CredentialStore>,
        store,
        Arc::new(Argon2Hasher),
        audit,
    )
    .unwrap();
    Arc::new(state)
}

pub async fn start() -> (SocketAddr, Arc<AppState>) {
    start_with(&[]).await
}

pub async fn start_with(extra: &[&str]) -> (SocketAddr, Arc<AppState>) {
    serve_state(seeded_state(extra).await).await
}

pub async fn serve_state(state: Arc<AppState>) -> (SocketAddr, Arc<AppState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(wicket::serve(listener, Arc::clone(&state)));
    (addr, state)
}

pub struct TestResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the refresh cookie set by this response, if any
    pub fn refresh_cookie(&self) -> Option<String> {
        let cookie = self.header("set-cookie")?;
        let value = cookie.strip_prefix("refreshToken=")?.split(';').next()?;
        Some(value.to_string())
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub async fn request(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> TestResponse {
    let method = Method::from_bytes(method.as_bytes()).unwrap();
    let mut builder = client().request(method, format!("http://{addr}{path}"));
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    if let Some(body) = body {
        builder = builder
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string());
    }

    let response = builder.send().await.unwrap();
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let bytes = response.bytes().await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn login(addr: SocketAddr, email: &str, password: &str, remember_me: bool) -> TestResponse {
    let body = serde_json::json!({
        "email": email,
        "password": password,
        "rememberMe": remember_me,
    })
    .to_string();
    request(addr, "POST", "/api/v1/auth/login", &[], Some(&body)).await
}

/// Log in and return the access token
pub async fn access_token(addr: SocketAddr, email: &str, password: &str) -> String {
    let response = login(addr, email, password, false).await;
    assert_eq!(response.status, 200, "login failed: {}", response.body);
    response.body["accessToken"].as_str().unwrap().to_string()
}
