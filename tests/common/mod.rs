#![allow(dead_code)]

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use rent_api::app::{app, AppState};
use rent_api::auth::{generate_jwt, Claims};
use rent_api::config::SecurityConfig;
use rent_api::database::models::{EntityId, UserId};
use rent_api::database::store::InMemoryStore;
use rent_api::services::{SequentialIdGenerator, WorkflowEngine};

pub const SECRET: &str = "integration-secret";

pub const MANAGER: UserId = 1;
pub const TENANT: UserId = 2;
pub const OTHER: UserId = 3;

pub const TENANT_PHONE: &str = "01700000002";
pub const OTHER_PHONE: &str = "01700000003";

pub const PROPERTY: EntityId = 100;
pub const FLOOR: EntityId = 200;
pub const SECOND_FLOOR: EntityId = 201;

/// In-process router over a seeded in-memory store
pub struct TestApp {
    pub store: InMemoryStore,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = InMemoryStore::new();
        store.add_user(MANAGER, "01700000001", Some("Manager")).await;
        store.add_user(TENANT, TENANT_PHONE, Some("Tenant")).await;
        store.add_user(OTHER, OTHER_PHONE, None).await;
        store.add_property(PROPERTY, "Rose Villa", MANAGER).await;
        store.add_floor(FLOOR, PROPERTY, "2F", 12000).await;
        store.add_floor(SECOND_FLOOR, PROPERTY, "3F", 15000).await;

        let engine = WorkflowEngine::new(Arc::new(store.clone()), Arc::new(SequentialIdGenerator::new(1_000)));
        let security = SecurityConfig {
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            jwt_secret: SECRET.to_string(),
        };
        let router = app(AppState::new(engine, SECRET), &security);

        Self { store, router }
    }

    pub fn token(user_id: UserId) -> String {
        generate_jwt(&Claims::new(user_id, 1), SECRET).expect("sign test token")
    }

    /// Send a request as `user` (unauthenticated when `None`) and decode the JSON body.
    pub async fn send(&self, method: Method, uri: &str, user: Option<UserId>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", Self::token(user_id)));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };
        self.dispatch(request).await
    }

    pub async fn dispatch(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, json))
    }

    pub async fn get(&self, uri: &str, user: UserId) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: UserId, body: Value) -> Result<(StatusCode, Value)> {
        self.send(Method::POST, uri, Some(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: UserId) -> Result<(StatusCode, Value)> {
        self.send(Method::DELETE, uri, Some(user), None).await
    }
}

pub fn floor_uri(floor_id: EntityId, action: &str) -> String {
    format!("/api/property/{}/floor/{}/{}", PROPERTY, floor_id, action)
}
