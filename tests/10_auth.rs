mod common;

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::{TestApp, TENANT};

#[tokio::test]
async fn health_and_root_are_public() -> Result<()> {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "memory");

    let (status, body) = app.send(Method::GET, "/", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/api/notifications", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], true);
    assert_eq!(body["code"], "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn forged_tokens_are_rejected() -> Result<()> {
    let app = TestApp::new().await;
    let forged = rent_api::auth::generate_jwt(&rent_api::auth::Claims::new(TENANT, 1), "someone-else")
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/notifications")
        .header(header::AUTHORIZATION, format!("Bearer {}", forged))
        .body(Body::empty())?;
    let (status, _) = app.dispatch(request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn session_cookie_is_accepted() -> Result<()> {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/notifications")
        .header(header::COOKIE, format!("sessiontoken={}", TestApp::token(TENANT)))
        .body(Body::empty())?;
    let (status, body) = app.dispatch(request).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_array());
    Ok(())
}

#[tokio::test]
async fn unknown_routes_are_not_found_rather_than_unauthorized() -> Result<()> {
    let app = TestApp::new().await;
    let (status, _) = app.send(Method::GET, "/api/nowhere", None, None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
