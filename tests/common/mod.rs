#![allow(dead_code)]
/// Shared helpers: a local JWKS endpoint and fixture-signed identity tokens

use axum::{extract::State, http::StatusCode, routing::get, Router};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const SIGNING_PEM: &str = include_str!("../fixtures/signing.pem");
pub const OTHER_PEM: &str = include_str!("../fixtures/other.pem");
pub const JWKS: &str = include_str!("../fixtures/jwks.json");
pub const CLIENT_ID: &str = "com.yachtlife.app";
pub const ISSUER: &str = "https://appleid.apple.com";
pub const JWT_SECRET: &str = "integration-secret-with-enough-bytes-0123";

/// Request counters per route
#[derive(Default)]
pub struct Hits {
    pub keys: AtomicUsize,
    pub broken: AtomicUsize,
    pub down: AtomicUsize,
}

impl Hits {
    pub fn keys(&self) -> usize {
        self.keys.load(Ordering::SeqCst)
    }
}

pub struct JwksServer {
    pub addr: SocketAddr,
    pub hits: Arc<Hits>,
}

impl JwksServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn keys(State(hits): State<Arc<Hits>>) -> (StatusCode, String) {
    hits.keys.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, JWKS.to_string())
}

async fn broken(State(hits): State<Arc<Hits>>) -> (StatusCode, String) {
    hits.broken.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, "{\"keys\": [".to_string())
}

async fn down(State(hits): State<Arc<Hits>>) -> StatusCode {
    hits.down.fetch_add(1, Ordering::SeqCst);
    StatusCode::SERVICE_UNAVAILABLE
}

async fn slow() -> String {
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    JWKS.to_string()
}

/// Serve Apple-shaped key endpoints on an ephemeral local port
pub async fn spawn_jwks_server() -> JwksServer {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/auth/keys", get(keys))
        .route("/broken", get(broken))
        .route("/down", get(down))
        .route("/slow", get(slow))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    JwksServer { addr, hits }
}

pub fn identity_claims(sub: &str, email: Option<&str>, now: DateTime<Utc>) -> Value {
    json!({
        "iss": ISSUER,
        "aud": CLIENT_ID,
        "sub": sub,
        "email": email,
        "email_verified": "true",
        "is_private_email": false,
        "auth_time": now.timestamp(),
        "iat": now.timestamp(),
        "exp": (now + Duration::minutes(10)).timestamp(),
    })
}

pub fn sign_token(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}
