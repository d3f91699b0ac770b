//! HTTP interface
//!
//! Account endpoints (rate-limited strictly) and status/update endpoints
//! (rate-limited for polling), behind session loading, CSRF checks, CORS and
//! request tracing.

/// JSON error responses
pub mod error;
/// Route handlers
pub mod handlers;
/// Per-client rate limiting
pub mod rate_limit;
/// Sessions and CSRF
pub mod session;

use crate::config::AppConfig;
use crate::core::users::PasswordHasher;
use crate::errors::{Error, Result};
use crate::update::UpdateService;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use handlers::{auth, updates};
use rate_limit::RateLimiter;
use sea_orm::DatabaseConnection;
use session::{SessionStore, SessionUser};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const MAX_BODY_BYTES: usize = 10 * 1024;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Account and bookkeeping store
    pub db: DatabaseConnection,
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// Live sessions
    pub sessions: SessionStore,
    /// Password hasher keyed by the session secret
    pub hasher: Arc<PasswordHasher>,
    /// Self-update state and cache
    pub updates: Arc<UpdateService>,
}

impl AppState {
    /// Whether `user` is the designated admin account
    #[must_use]
    pub fn is_admin(&self, user: &SessionUser) -> bool {
        self.config.admin_username.as_deref() == Some(user.username.as_str())
    }
}

/// Builds the application router.
///
/// # Errors
/// Returns `Error::Config` if the configured CORS origin is not a valid header value.
pub fn router(state: AppState) -> Result<Router> {
    let trust_proxy = state.config.production;

    let auth_routes = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route_layer(middleware::from_fn_with_state(
            RateLimiter::auth().with_trust_proxy(trust_proxy),
            rate_limit::limit,
        ));

    let api_routes = Router::new()
        .route("/api/csrf-token", get(auth::csrf_token))
        .route("/api/status", get(auth::status))
        .route("/api/update-status", get(updates::update_status))
        .route("/api/changelogs", get(updates::changelogs))
        .route_layer(middleware::from_fn_with_state(
            RateLimiter::api().with_trust_proxy(trust_proxy),
            rate_limit::limit,
        ));

    let origin = HeaderValue::from_str(&state.config.cors_origin).map_err(|e| Error::Config {
        message: format!("Invalid CORS_ORIGIN '{}': {e}", state.config.cors_origin),
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(session::CSRF_HEADER),
        ]);

    Ok(auth_routes
        .merge(api_routes)
        .layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            session::session_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
