//! Update status and changelog endpoints.

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::api::session::CurrentSession;
use crate::update::UpdateStatus;
use axum::{Extension, Json, extract::State};
use serde_json::{Value, json};

/// `GET /api/update-status`: pending update and installed version.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> ApiResult<Json<UpdateStatus>> {
    if current.user().is_none() {
        return Err(ApiError::unauthorized());
    }
    Ok(Json(state.updates.status().await))
}

/// `GET /api/changelogs`: the changelog document, hidden from non-admins
/// when changelogs are switched off.
pub async fn changelogs(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> ApiResult<Json<Value>> {
    let user = current.user().ok_or_else(ApiError::unauthorized)?;

    if !state.updates.settings().show_changelogs && !state.is_admin(user) {
        return Err(ApiError::Forbidden("Access denied".to_string()));
    }

    let snapshot = state.updates.cache().snapshot().await;
    Ok(Json(json!({
        "content": snapshot.changelog_text,
        "lastUpdateAt": snapshot.last_update_at,
    })))
}
