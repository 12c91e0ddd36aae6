// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT session middleware and cookie helpers.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Role, User};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "webinit_session";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub role: Role,
    /// Display name at sign-in time
    pub name: String,
    /// Avatar URL at sign-in time
    #[serde(default)]
    pub image: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

/// Authenticated user extracted from JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Role,
    pub name: String,
    pub image: Option<String>,
}

/// Middleware that requires a valid session.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = if let Some(cookie) = jar.get(SESSION_COOKIE) {
        cookie.value().to_string()
    } else {
        let auth_header = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token.to_string(),
            None => return Err(AppError::Unauthorized),
        }
    };

    let key = DecodingKey::from_secret(&state.config.jwt_signing_key);
    let validation = Validation::new(Algorithm::HS256);

    let claims = decode::<Claims>(&token, &key, &validation)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected session token");
            AppError::InvalidToken
        })?
        .claims;

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        role: claims.role,
        name: claims.name,
        image: claims.image,
    });

    Ok(next.run(request).await)
}

/// Create a JWT for a user session.
pub fn create_session_token(
    user: &User,
    signing_key: &[u8],
    max_age_secs: u64,
) -> anyhow::Result<String> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as usize;

    let claims = Claims {
        sub: user.id.clone(),
        role: user.role,
        name: user.name.clone(),
        image: user.image.as_ref().map(|i| i.url.clone()),
        iat: now,
        exp: now + max_age_secs as usize,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )?)
}

fn base_cookie(value: String, config: &Config) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookies())
        .path("/")
        .build()
}

/// Session cookie carrying `token`.
pub fn session_cookie(token: String, config: &Config) -> Cookie<'static> {
    let mut cookie = base_cookie(token, config);
    cookie.set_max_age(time::Duration::seconds(config.session_max_age_secs as i64));
    cookie
}

/// Expired cookie with the same attributes, used to sign out.
pub fn clear_session_cookie(config: &Config) -> Cookie<'static> {
    let mut cookie = base_cookie(String::new(), config);
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}
