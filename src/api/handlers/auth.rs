//! Registration, login, logout and session status.

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::session::{CurrentSession, SessionUser};
use crate::core::users::{self, MAX_PASSWORD_LEN};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

/// Login and registration body. Fields are untyped so that missing and
/// non-string values get distinct messages.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    username: Option<Value>,
    password: Option<Value>,
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Bool(b)) => !b,
        Some(_) => false,
    }
}

impl Credentials {
    fn into_strings(self) -> ApiResult<(String, String)> {
        if is_blank(self.username.as_ref()) || is_blank(self.password.as_ref()) {
            return Err(ApiError::BadRequest(
                "Username and password required".to_string(),
            ));
        }
        match (self.username, self.password) {
            (Some(Value::String(username)), Some(Value::String(password))) => {
                Ok((username, password))
            }
            _ => Err(ApiError::BadRequest(
                "Username and password must be strings".to_string(),
            )),
        }
    }
}

fn parse_body(body: Result<Json<Credentials>, JsonRejection>) -> ApiResult<(String, String)> {
    let Json(credentials) =
        body.map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))?;
    credentials.into_strings()
}

/// `GET /api/csrf-token`: the CSRF token of the current session, starting
/// one if needed.
pub async fn csrf_token(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> Response {
    if let Some(session) = current.0 {
        return Json(json!({ "csrfToken": session.csrf_token })).into_response();
    }

    let session = state.sessions.create().await;
    let response = Json(json!({ "csrfToken": session.csrf_token })).into_response();
    state.sessions.attach_cookie(&session, response)
}

/// `POST /api/register`
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Response> {
    let (username, password) = parse_body(body)?;

    users::validate_registration(&username, &password, state.config.admin_username.as_deref())
        .map_err(|rejection| match rejection {
            users::RegistrationRejection::ReservedUsername => {
                ApiError::Forbidden(rejection.message().to_string())
            }
            _ => ApiError::BadRequest(rejection.message().to_string()),
        })?;

    let Some(user) = users::create_user(&state.db, &state.hasher, &username, &password).await?
    else {
        return Err(ApiError::Conflict("Username already exists".to_string()));
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": user.id, "username": user.username })),
    )
        .into_response())
}

/// `POST /api/login`: verifies credentials and starts a fresh session.
pub async fn login(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Response> {
    let (username, password) = parse_body(body)?;
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    if password.chars().count() > MAX_PASSWORD_LEN {
        return Err(invalid());
    }

    let user = users::authenticate(&state.db, &state.hasher, &username, &password)
        .await?
        .ok_or_else(invalid)?;

    let session = state
        .sessions
        .regenerate(
            current.id(),
            Some(SessionUser {
                id: user.id,
                username: user.username.clone(),
            }),
        )
        .await;
    info!("User '{}' logged in", user.username);

    let response = Json(json!({ "id": user.id, "username": user.username })).into_response();
    Ok(state.sessions.attach_cookie(&session, response))
}

/// `POST /api/logout`: replaces the session with an anonymous one.
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> Response {
    let session = state.sessions.regenerate(current.id(), None).await;
    let response = Json(json!({ "message": "Logged out" })).into_response();
    state.sessions.attach_cookie(&session, response)
}

/// `GET /api/status`
pub async fn status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> Json<Value> {
    match current.user() {
        Some(user) => Json(json!({
            "authenticated": true,
            "user": {
                "id": user.id,
                "username": user.username,
                "isAdmin": state.is_admin(user),
            },
        })),
        None => Json(json!({ "authenticated": false })),
    }
}
