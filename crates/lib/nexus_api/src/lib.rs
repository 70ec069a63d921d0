//! # nexus_api
//!
//! HTTP API library for Nexus: the request gate, login/logout/password
//! flows and the admin endpoints.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use nexus_core::access::AccessGrants;
use nexus_core::audit::AuditRecorder;
use nexus_core::auth::AuthError;
use nexus_core::auth::jwt::TokenService;
use nexus_core::auth::password::hash_password_with_cost;
use nexus_core::auth::rate_limit::RateLimiter;
use nexus_core::store::Store;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{access, apps, audit, auth, settings, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: ApiConfig,
    pub tokens: Arc<TokenService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub grants: Arc<AccessGrants>,
    pub audit: AuditRecorder,
    /// Hash verified against when the username is unknown, so that path
    /// costs the same as a wrong password.
    pub dummy_hash: Arc<str>,
}

impl AppState {
    /// Wire the services together. Fails only if the timing-equalizer hash
    /// cannot be computed at the configured cost.
    pub fn new(store: Arc<dyn Store>, config: ApiConfig) -> Result<Self, AuthError> {
        let audit = AuditRecorder::new(store.clone());
        let grants = Arc::new(AccessGrants::new(store.clone(), audit.clone()));
        let tokens = Arc::new(TokenService::new(
            config.jwt_secret.as_bytes(),
            config.token_ttl,
        ));
        let dummy_hash: Arc<str> =
            hash_password_with_cost("nexus-timing-equalizer", config.bcrypt_cost)?.into();
        Ok(Self {
            store,
            config,
            tokens,
            rate_limiter: Arc::new(RateLimiter::new()),
            grants,
            audit,
            dummy_hash,
        })
    }
}

/// Run embedded database migrations.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    nexus_core::migrate::migrate(pool).await
}

/// Builds the router with every route behind the request gate.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route(
            "/api/auth/change-password",
            post(auth::change_password_handler),
        )
        .route("/api/auth/session", get(auth::session_handler))
        .route(
            "/api/users",
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route(
            "/api/users/{id}",
            get(users::get_user_handler)
                .put(users::update_user_handler)
                .delete(users::delete_user_handler),
        )
        .route(
            "/api/apps",
            get(apps::list_apps_handler).post(apps::create_app_handler),
        )
        .route(
            "/api/apps/{id}",
            get(apps::get_app_handler)
                .put(apps::update_app_handler)
                .delete(apps::delete_app_handler),
        )
        .route(
            "/api/access",
            get(access::matrix_handler)
                .post(access::toggle_handler)
                .put(access::reconcile_handler),
        )
        .route("/api/audit", get(audit::list_audit_handler))
        .route(
            "/api/settings",
            get(settings::get_settings_handler).put(settings::update_settings_handler),
        )
        .fallback(handlers::not_found_handler)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::gate::gate,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
