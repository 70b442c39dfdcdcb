use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SecurityConfig;
use crate::handlers::{protected, public};
use crate::middleware::jwt_auth_middleware;
use crate::services::WorkflowEngine;

/// Shared by every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: WorkflowEngine,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(engine: WorkflowEngine, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self {
            engine,
            jwt_secret: jwt_secret.into(),
        }
    }
}

pub fn app(state: AppState, security: &SecurityConfig) -> Router {
    let protected = Router::new()
        .merge(notification_routes())
        .merge(property_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_middleware));

    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Protected
        .merge(protected)
        // Global middleware
        .layer(cors_layer(security))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn notification_routes() -> Router<AppState> {
    use protected::notifications;

    Router::new()
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/mark-read", post(notifications::mark_read))
        .route("/api/notifications/action", post(notifications::action))
        .route("/api/notifications/:id", delete(notifications::withdraw))
}

fn property_routes() -> Router<AppState> {
    use protected::property;

    Router::new()
        .route("/api/property/:id/manager", get(property::manager))
        .route("/api/property/:id/floor/:floor_id/request", post(property::tenant_request))
        .route(
            "/api/property/:id/floor/:floor_id/tenant",
            post(property::assign_tenant).delete(property::remove_tenant),
        )
        .route(
            "/api/property/:id/floor/:floor_id/payment-notification",
            post(property::payment_notification),
        )
        .route(
            "/api/property/:id/floor/:floor_id/pending-payments",
            get(property::pending_payments),
        )
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
