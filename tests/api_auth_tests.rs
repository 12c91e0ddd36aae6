// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. Protected routes accept tokens from the cookie or the bearer header
//! 3. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tower::ServiceExt;

mod common;

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    role: String,
    name: String,
    exp: usize,
    iat: usize,
}

/// Create a test JWT token with an explicit expiry offset.
fn create_test_jwt(user_id: &str, signing_key: &[u8], exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = TestClaims {
        sub: user_id.to_string(),
        role: "user".to_string(),
        name: "Test User".to_string(),
        exp: (now + exp_offset) as usize,
        iat: now as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

#[tokio::test]
async fn test_protected_route_without_token() {
    let app = common::create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(get("/api/session").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let app = common::create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            get("/api/profile")
                .header(header::AUTHORIZATION, "Bearer invalid.token.here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = common::body_json(response).await;
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_protected_route_with_expired_token() {
    let app = common::create_test_app();
    let token = create_test_jwt("user-1", &app.state.config.jwt_signing_key, -3600);

    let response = app
        .router
        .clone()
        .oneshot(
            get("/api/session")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_wrong_key() {
    let app = common::create_test_app();
    let token = create_test_jwt("user-1", b"some_other_signing_key", 3600);

    let response = app
        .router
        .clone()
        .oneshot(
            get("/api/session")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_with_bearer_token() {
    let app = common::create_test_app();
    let token = create_test_jwt("user-1", &app.state.config.jwt_signing_key, 3600);

    let response = app
        .router
        .clone()
        .oneshot(
            get("/api/session")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let body = common::body_json(response).await;
    assert_eq!(body["id"], "user-1");
    assert_eq!(body["name"], "Test User");
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn test_session_cookie_takes_precedence() {
    let app = common::create_test_app();
    let user = common::seed_credentials_user(&app, "cookie@example.com").await;
    let token = common::session_token(&app, &user);

    let response = app
        .router
        .clone()
        .oneshot(
            get("/api/session")
                .header(header::COOKIE, format!("webinit_session={}", token))
                .header(header::AUTHORIZATION, "Bearer invalid.token.here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["id"], user.id);
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = common::create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/profile")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3000"
    );
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_public_route_no_auth_required() {
    let app = common::create_test_app();

    let response = app
        .router
        .clone()
        .oneshot(get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["status"], "ok");
}
