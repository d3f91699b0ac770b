//! In-memory sessions and CSRF protection.
//!
//! A session is identified by a random UUID carried in the `local_llm_sid`
//! cookie. Every access pushes its expiry forward by the session lifetime;
//! expired sessions are dropped on access and by a periodic pruner.
//!
//! Each session owns a CSRF token. Requests with side effects must echo it in
//! the `X-CSRF-Token` header.

use super::error::ApiError;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "local_llm_sid";
/// Header carrying the CSRF token
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Idle lifetime of a session
pub const SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);
/// Time between pruning passes
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// The account bound to a logged-in session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// User id
    pub id: i32,
    /// Username at login time
    pub username: String,
}

/// One client session
#[derive(Debug, Clone)]
pub struct Session {
    /// Random id sent in the cookie
    pub id: String,
    /// Token expected in `X-CSRF-Token`
    pub csrf_token: String,
    /// Logged-in account, `None` for anonymous sessions
    pub user: Option<SessionUser>,
    expires_at: Instant,
}

/// The session attached to the current request, if any.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<Session>);

impl CurrentSession {
    /// The logged-in user, if any
    #[must_use]
    pub fn user(&self) -> Option<&SessionUser> {
        self.0.as_ref().and_then(|s| s.user.as_ref())
    }

    /// The session id, if any
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.0.as_ref().map(|s| s.id.as_str())
    }
}

/// Shared session store
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
    secure_cookies: bool,
}

impl SessionStore {
    /// Creates an empty store. `secure_cookies` adds the `Secure` attribute.
    #[must_use]
    pub fn new(ttl: Duration, secure_cookies: bool) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            secure_cookies,
        }
    }

    /// Looks up a live session and extends its expiry.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        match sessions.get_mut(id) {
            Some(session) if session.expires_at > now => {
                session.expires_at = now + self.ttl;
                Some(session.clone())
            }
            Some(_) => {
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    /// Starts a new anonymous session.
    pub async fn create(&self) -> Session {
        self.insert(None).await
    }

    /// Replaces `old` with a fresh session bound to `user`.
    ///
    /// The new session has a new id and a new CSRF token.
    pub async fn regenerate(&self, old: Option<&str>, user: Option<SessionUser>) -> Session {
        if let Some(old) = old {
            self.sessions.write().await.remove(old);
        }
        self.insert(user).await
    }

    async fn insert(&self, user: Option<SessionUser>) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            csrf_token: Uuid::new_v4().simple().to_string(),
            user,
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Drops expired sessions. Returns how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }

    /// Number of stored sessions, expired or not
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store holds no sessions
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Prunes expired sessions every `interval`.
    pub fn spawn_pruner(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = store.prune_expired().await;
                if removed > 0 {
                    debug!("Pruned {} expired sessions", removed);
                }
            }
        })
    }

    /// `Set-Cookie` value for session `id`.
    #[must_use]
    pub fn cookie(&self, id: &str) -> String {
        let secure = if self.secure_cookies { "; Secure" } else { "" };
        format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax{secure}")
    }

    /// Adds the cookie for `session` to `response`.
    pub fn attach_cookie(&self, session: &Session, mut response: Response) -> Response {
        match HeaderValue::from_str(&self.cookie(&session.id)) {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Could not encode session cookie: {}", e),
        }
        response
    }
}

/// Session id from the request's `Cookie` headers.
#[must_use]
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, id)| id.to_string())
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Middleware: attaches the [`CurrentSession`] and enforces CSRF tokens on
/// state-changing methods.
pub async fn session_middleware(
    State(store): State<SessionStore>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = match session_id(req.headers()) {
        Some(id) => store.get(&id).await,
        None => None,
    };

    if !is_safe_method(req.method()) {
        let provided = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok());
        let expected = session.as_ref().map(|s| s.csrf_token.as_str());
        if provided.is_none() || provided != expected {
            debug!("Rejected {} {} without a valid CSRF token", req.method(), req.uri());
            return ApiError::Forbidden("Invalid CSRF token".to_string()).into_response();
        }
    }

    let current = CurrentSession(session);
    let refreshed = current.0.clone();
    req.extensions_mut().insert(current);
    let mut response = next.run(req).await;

    // Rolling cookie: re-send it unless the handler issued a new session
    if let Some(session) = refreshed {
        if !response.headers().contains_key(header::SET_COOKIE) {
            response = store.attach_cookie(&session, response);
        }
    }
    response
}
