// handlers/protected/property.rs - floor-scoped workflow actions
use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::path_params;
use crate::app::AppState;
use crate::database::models::{EntityId, Floor, Notification, UserId};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

type FloorPath = Result<Path<(EntityId, EntityId)>, PathRejection>;

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct RemovedTenant {
    pub floor_id: EntityId,
    pub removed_tenant: UserId,
}

#[derive(Debug, Serialize)]
pub struct ManagerStatus {
    pub property_id: EntityId,
    pub is_manager: bool,
}

/// POST /api/property/:id/floor/:floor_id/request - propose a tenant
pub async fn tenant_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    path: FloorPath,
    payload: Result<Json<PhoneRequest>, JsonRejection>,
) -> ApiResult<Notification> {
    let (property_id, floor_id) = path_params(path)?;
    let Json(body) = payload?;
    let notification = state
        .engine
        .create_tenant_request(auth.user_id, property_id, floor_id, &body.phone_number)
        .await?;
    Ok(ApiResponse::created(notification))
}

/// POST /api/property/:id/floor/:floor_id/tenant - assign directly
pub async fn assign_tenant(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    path: FloorPath,
    payload: Result<Json<PhoneRequest>, JsonRejection>,
) -> ApiResult<Floor> {
    let (property_id, floor_id) = path_params(path)?;
    let Json(body) = payload?;
    let floor = state
        .engine
        .assign_tenant(auth.user_id, property_id, floor_id, &body.phone_number)
        .await?;
    Ok(ApiResponse::success(floor))
}

/// DELETE /api/property/:id/floor/:floor_id/tenant
pub async fn remove_tenant(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    path: FloorPath,
) -> ApiResult<RemovedTenant> {
    let (property_id, floor_id) = path_params(path)?;
    let removed_tenant = state.engine.remove_tenant(auth.user_id, property_id, floor_id).await?;
    Ok(ApiResponse::success(RemovedTenant {
        floor_id,
        removed_tenant,
    }))
}

/// POST /api/property/:id/floor/:floor_id/payment-notification
pub async fn payment_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    path: FloorPath,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> ApiResult<Notification> {
    let (property_id, floor_id) = path_params(path)?;
    let Json(body) = payload?;
    let notification = state
        .engine
        .create_payment_submission(auth.user_id, property_id, floor_id, body.amount)
        .await?;
    Ok(ApiResponse::created(notification))
}

/// GET /api/property/:id/floor/:floor_id/pending-payments
pub async fn pending_payments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    path: FloorPath,
) -> ApiResult<Vec<Notification>> {
    let (property_id, floor_id) = path_params(path)?;
    let payments = state
        .engine
        .list_pending_payments(auth.user_id, property_id, floor_id)
        .await?;
    Ok(ApiResponse::success(payments))
}

/// GET /api/property/:id/manager
pub async fn manager(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    path: Result<Path<EntityId>, PathRejection>,
) -> ApiResult<ManagerStatus> {
    let property_id = path_params(path)?;
    let is_manager = state.engine.is_manager(auth.user_id, property_id).await?;
    Ok(ApiResponse::success(ManagerStatus {
        property_id,
        is_manager,
    }))
}
