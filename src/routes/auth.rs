// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: credentials, registration, recovery, OAuth and
//! logout.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::middleware::auth::{clear_session_cookie, create_session_token, session_cookie};
use crate::models::{RecoveryForm, RegisterForm, SignInForm, User};
use crate::routes::api::SessionResponse;
use crate::services::oauth::{encode_state, verify_state, OAuthProvider};
use crate::time_utils::now_millis;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signin", post(sign_in))
        .route("/auth/register", post(register))
        .route("/auth/recovery", post(request_recovery))
        .route("/auth/logout", post(logout))
        .route("/auth/{provider}", get(oauth_start))
        .route("/auth/{provider}/callback", get(oauth_callback))
}

/// Issue a session token for `user` and attach it to the jar.
fn start_session(state: &AppState, jar: CookieJar, user: &User) -> Result<CookieJar> {
    let token = create_session_token(
        user,
        &state.config.jwt_signing_key,
        state.config.session_max_age_secs,
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    Ok(jar.add(session_cookie(token, &state.config)))
}

/// Credentials sign-in.
async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<SignInForm>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    let user = state.auth_service.sign_in_with_credentials(&form).await?;
    let jar = start_session(&state, jar, &user)?;
    Ok((jar, Json(SessionResponse::from(&user))))
}

/// Newly created account.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RegisterResponse {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Create a credentials account. The user signs in separately.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(form): Json<RegisterForm>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let user = state.auth_service.register(form).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            name: user.name,
            email: user.email,
        }),
    ))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RecoveryResponse {
    pub message: String,
}

/// Password recovery request. The recovery id is only ever logged.
async fn request_recovery(
    State(state): State<Arc<AppState>>,
    Json(form): Json<RecoveryForm>,
) -> Result<(StatusCode, Json<RecoveryResponse>)> {
    state.auth_service.request_password_recovery(&form).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RecoveryResponse {
            message: "Recovery instructions sent.".to_string(),
        }),
    ))
}

/// Logout - expire the session cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    (
        jar.add(clear_session_cookie(&state.config)),
        StatusCode::NO_CONTENT,
    )
}

/// Callback URL on this server, derived from the Host header.
fn callback_url(headers: &HeaderMap, provider: OAuthProvider) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}/auth/{}/callback", scheme, host, provider)
}

/// Start OAuth flow - redirect to the provider's consent page.
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> Result<Redirect> {
    let provider: OAuthProvider = provider.parse()?;
    let oauth_state = encode_state(provider, now_millis(), &state.config.oauth_state_key)?;
    let auth_url = state.oauth_client.authorize_url(
        provider,
        &callback_url(&headers, provider),
        &oauth_state,
    )?;

    tracing::info!(provider = %provider, "Starting OAuth flow");
    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn sign_in_page_with_error(frontend_url: &str, error: &str) -> Redirect {
    Redirect::temporary(&format!(
        "{}/entrar?error={}",
        frontend_url,
        urlencoding::encode(error)
    ))
}

/// OAuth callback - exchange code, provision the account, start a session.
///
/// Failures after the provider is resolved send the browser back to the
/// sign-in page with an error code instead of a JSON error.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    let provider: OAuthProvider = provider.parse()?;
    if !state.oauth_client.is_enabled(provider) {
        return Err(AppError::NotFound(format!(
            "Provider {} is not enabled",
            provider
        )));
    }
    let frontend_url = state.config.frontend_url.as_str();

    if let Some(error) = params.error {
        tracing::warn!(provider = %provider, error = %error, "OAuth error from provider");
        return Ok((jar, sign_in_page_with_error(frontend_url, &error)));
    }

    let state_provider = params
        .state
        .as_deref()
        .and_then(|s| verify_state(s, &state.config.oauth_state_key, now_millis()));
    if state_provider != Some(provider) {
        tracing::warn!(provider = %provider, "Invalid or tampered OAuth state");
        return Ok((jar, sign_in_page_with_error(frontend_url, "invalid_state")));
    }

    let Some(code) = params.code else {
        return Ok((jar, sign_in_page_with_error(frontend_url, "missing_code")));
    };

    let redirect_uri = callback_url(&headers, provider);
    let profile = match state
        .oauth_client
        .exchange_code(provider, &code, &redirect_uri)
        .await
    {
        Ok(access_token) => state.oauth_client.fetch_profile(provider, &access_token).await,
        Err(e) => Err(e),
    };
    let profile = match profile {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "OAuth exchange failed");
            return Ok((jar, sign_in_page_with_error(frontend_url, "oauth_error")));
        }
    };

    let user = match state
        .auth_service
        .sign_in_with_oauth(provider.auth_provider(), profile)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "OAuth sign-in refused");
            return Ok((jar, sign_in_page_with_error(frontend_url, "account_error")));
        }
    };

    let jar = start_session(&state, jar, &user)?;
    Ok((
        jar,
        Redirect::temporary(&format!("{}/dashboard", frontend_url)),
    ))
}
