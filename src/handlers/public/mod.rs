// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Route Prefix: none (`/`, `/health`)
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::app::AppState;

pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Rent API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Landlord/tenant rental management with a notification-driven workflow",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "notifications": "/api/notifications[/mark-read|/action|/:id] (protected)",
                "property": "/api/property/:id/floor/:floor_id/{request,tenant,payment-notification,pending-payments} (protected)",
                "manager": "/api/property/:id/manager (protected)",
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let store = state.engine.store();

    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": store.backend_name()
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "database": store.backend_name()
                    }
                })),
            )
        }
    }
}
