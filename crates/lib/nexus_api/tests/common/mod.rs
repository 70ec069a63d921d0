//! Shared fixtures for router-level tests against the in-memory store.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, Response};
use chrono::Utc;
use nexus_api::AppState;
use nexus_api::config::{ApiConfig, RawConfig};
use nexus_core::auth::password::hash_password_with_cost;
use nexus_core::models::apps::Application;
use nexus_core::models::audit::{AuditAction, AuditQuery, ClientMeta};
use nexus_core::models::auth::User;
use nexus_core::store::{AppStore, MemoryStore, UserStore};
use nexus_core::uuid::new_id;
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-signing-secret-0123456789";

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub fn config() -> ApiConfig {
    ApiConfig::new(RawConfig {
        jwt_secret: Some(SECRET.to_string()),
        environment: Some("test".to_string()),
        bcrypt_cost: Some(4),
        ..RawConfig::default()
    })
    .unwrap()
}

pub fn app() -> TestApp {
    app_with_config(config())
}

pub fn app_with_config(config: ApiConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), config).unwrap();
    TestApp { state, store }
}

impl TestApp {
    pub fn router(&self) -> Router {
        nexus_api::router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.unwrap()
    }

    pub async fn add_user(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
        must_change_password: bool,
    ) -> User {
        let hash = hash_password_with_cost(password, 4).unwrap();
        let mut user = User::new(new_id(), username, None, hash, is_admin, None);
        user.must_change_password = must_change_password;
        self.store.insert_user(&user).await.unwrap();
        user
    }

    pub async fn add_app(&self, slug: &str, is_active: bool, uses_auth: bool) -> Application {
        let now = Utc::now();
        let app = Application {
            id: new_id(),
            name: slug.to_uppercase(),
            slug: slug.to_string(),
            description: None,
            base_url: format!("https://{slug}.example.test"),
            icon: None,
            color: None,
            is_active,
            uses_auth,
            sort_order: self.store.next_sort_order().await.unwrap(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_app(&app).await.unwrap();
        app
    }

    pub async fn grant(&self, user: &User, app: &Application) {
        self.state
            .grants
            .grant(&user.id, &app.id, "seed", &ClientMeta::default())
            .await
            .unwrap();
    }

    pub async fn login(&self, username: &str, password: &str, ip: &str) -> Response<Body> {
        self.send(post_json(
            "/api/auth/login",
            serde_json::json!({ "username": username, "password": password }),
            None,
            ip,
        ))
        .await
    }

    /// Log in and return the `name=value` cookie pair.
    pub async fn login_cookie(&self, username: &str, password: &str) -> String {
        let response = self.login(username, password, "198.51.100.1").await;
        assert_eq!(response.status(), 200, "login as {username}");
        session_cookie(&response).unwrap()
    }

    pub async fn audit_count(&self, action: AuditAction) -> i64 {
        let mut query = AuditQuery::default();
        query.action = Some(action);
        self.state.audit.list(&query).await.unwrap().total
    }
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn send_json(
    method: &str,
    uri: &str,
    body: Value,
    cookie: Option<&str>,
    ip: &str,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header("user-agent", "nexus-tests")
        .extension(peer(ip));
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Socket peer as the server sees it with connect info enabled.
pub fn peer(ip: &str) -> ConnectInfo<SocketAddr> {
    let ip: IpAddr = ip.parse().unwrap();
    ConnectInfo(SocketAddr::new(ip, 49152))
}

/// Login request from `peer_ip` claiming to forward for `forwarded`.
pub fn forwarded_login(username: &str, password: &str, peer_ip: &str, forwarded: &str) -> Request<Body> {
    let mut request = post_json(
        "/api/auth/login",
        serde_json::json!({ "username": username, "password": password }),
        None,
        peer_ip,
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", forwarded.parse().unwrap());
    request
}

pub fn post_json(uri: &str, body: Value, cookie: Option<&str>, ip: &str) -> Request<Body> {
    send_json("POST", uri, body, cookie, ip)
}

/// Raw `Set-Cookie` header for the session cookie, if any.
pub fn set_cookie_header(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("nexus_token="))
        .map(str::to_string)
}

/// `nexus_token=<token>` pair from a non-empty session cookie.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    let header = set_cookie_header(response)?;
    let pair = header.split(';').next()?.trim().to_string();
    (pair.len() > "nexus_token=".len()).then_some(pair)
}

pub fn token_of(cookie: &str) -> &str {
    cookie.trim_start_matches("nexus_token=")
}

pub async fn json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
