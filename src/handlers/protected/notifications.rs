// handlers/protected/notifications.rs - the caller's inbox and request resolution
use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::path_params;
use crate::app::AppState;
use crate::database::models::{EntityId, NotificationView};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::Resolution;

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub notification_id: EntityId,
    pub accept: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub marked: u64,
}

#[derive(Debug, Serialize)]
pub struct Withdrawn {
    pub id: EntityId,
    pub withdrawn: bool,
}

/// GET /api/notifications - newest first
pub async fn list(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<Vec<NotificationView>> {
    let notifications = state.engine.list_notifications(auth.user_id).await?;
    Ok(ApiResponse::success(notifications))
}

/// POST /api/notifications/mark-read
pub async fn mark_read(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<MarkedRead> {
    let marked = state.engine.mark_all_read(auth.user_id).await?;
    Ok(ApiResponse::success(MarkedRead { marked }))
}

/// POST /api/notifications/action - accept or reject a pending request
pub async fn action(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> ApiResult<Resolution> {
    let Json(body) = payload?;
    let resolution = state
        .engine
        .resolve_notification(auth.user_id, body.notification_id, body.accept)
        .await?;
    Ok(ApiResponse::success(resolution))
}

/// DELETE /api/notifications/:id - sender withdraws a pending request
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    path: Result<Path<EntityId>, PathRejection>,
) -> ApiResult<Withdrawn> {
    let id = path_params(path)?;
    state.engine.withdraw_notification(auth.user_id, id).await?;
    Ok(ApiResponse::success(Withdrawn { id, withdrawn: true }))
}
