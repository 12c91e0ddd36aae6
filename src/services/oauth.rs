// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth2 authorization-code client for Google and GitHub.
//!
//! Handles:
//! - Authorization URL construction
//! - Code exchange for an access token
//! - Profile lookup (email, name, picture)
//! - Signed, time-stamped `state` values

use crate::config::OAuthCredentials;
use crate::error::AppError;
use crate::models::AuthProvider;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How long a `state` value is accepted after it was issued (10 minutes).
pub const STATE_VALIDITY_MS: i64 = 10 * 60 * 1000;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";

/// GitHub rejects API calls without a User-Agent.
const USER_AGENT: &str = concat!("web-init/", env!("CARGO_PKG_VERSION"));

/// Supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    /// Path segment used in `/auth/{provider}`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }

    /// Provider tag stored on the account.
    pub fn auth_provider(&self) -> AuthProvider {
        match self {
            OAuthProvider::Google => AuthProvider::Google,
            OAuthProvider::Github => AuthProvider::Github,
        }
    }

    fn scope(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "openid email profile",
            OAuthProvider::Github => "read:user user:email",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            other => Err(AppError::NotFound(format!("Unknown provider: {}", other))),
        }
    }
}

/// Identity returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub email: Option<String>,
    pub name: String,
    /// Avatar URL (Google only)
    pub picture: Option<String>,
}

/// Token endpoint response. GitHub reports failures with a 200 and an
/// `error` field, so both shapes are accepted.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// OAuth client for the configured providers.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    google: Option<OAuthCredentials>,
    github: Option<OAuthCredentials>,
}

impl OAuthClient {
    pub fn new(google: Option<OAuthCredentials>, github: Option<OAuthCredentials>) -> Self {
        Self {
            http: reqwest::Client::new(),
            google,
            github,
        }
    }

    /// Credentials for `provider`, or `NotFound` when it is not configured.
    fn credentials(&self, provider: OAuthProvider) -> Result<&OAuthCredentials, AppError> {
        let creds = match provider {
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::Github => self.github.as_ref(),
        };
        creds.ok_or_else(|| AppError::NotFound(format!("Provider {} is not enabled", provider)))
    }

    pub fn is_enabled(&self, provider: OAuthProvider) -> bool {
        self.credentials(provider).is_ok()
    }

    /// Build the provider's authorization URL.
    pub fn authorize_url(
        &self,
        provider: OAuthProvider,
        callback_url: &str,
        state: &str,
    ) -> Result<String, AppError> {
        let creds = self.credentials(provider)?;
        let base = match provider {
            OAuthProvider::Google => GOOGLE_AUTH_URL,
            OAuthProvider::Github => GITHUB_AUTH_URL,
        };

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            base,
            urlencoding::encode(&creds.client_id),
            urlencoding::encode(callback_url),
            urlencoding::encode(provider.scope()),
            state
        ))
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
        callback_url: &str,
    ) -> Result<String, AppError> {
        let creds = self.credentials(provider)?;
        let token_url = match provider {
            OAuthProvider::Google => GOOGLE_TOKEN_URL,
            OAuthProvider::Github => GITHUB_TOKEN_URL,
        };

        let response = self
            .http
            .post(token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", callback_url),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::OAuthProvider(format!("Token request failed: {}", e)))?;

        let token: TokenResponse = check_response_json(response).await?;

        if let Some(error) = token.error {
            return Err(AppError::OAuthProvider(format!(
                "{}: {}",
                error,
                token.error_description.unwrap_or_default()
            )));
        }

        token
            .access_token
            .ok_or_else(|| AppError::OAuthProvider("Token response missing access_token".into()))
    }

    /// Fetch the signed-in user's profile.
    pub async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> Result<OAuthProfile, AppError> {
        match provider {
            OAuthProvider::Google => {
                let info: GoogleUserInfo = self.get_json(GOOGLE_USERINFO_URL, access_token).await?;
                let email = info.email.filter(|_| info.email_verified.unwrap_or(true));
                Ok(OAuthProfile {
                    name: info
                        .name
                        .or_else(|| email.clone())
                        .unwrap_or_default(),
                    email,
                    picture: info.picture,
                })
            }
            OAuthProvider::Github => {
                let user: GithubUser = self
                    .get_json(&format!("{}/user", GITHUB_API_URL), access_token)
                    .await?;

                // The public email is often hidden; fall back to the primary
                // verified address.
                let email = match user.email {
                    Some(email) => Some(email),
                    None => {
                        let emails: Vec<GithubEmail> = self
                            .get_json(&format!("{}/user/emails", GITHUB_API_URL), access_token)
                            .await?;
                        primary_verified_email(emails)
                    }
                };

                Ok(OAuthProfile {
                    email,
                    name: user.name.unwrap_or(user.login),
                    picture: None,
                })
            }
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AppError::OAuthProvider(e.to_string()))?;

        check_response_json(response).await
    }
}

async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::OAuthProvider(format!("HTTP {}: {}", status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::OAuthProvider(format!("Failed to parse response: {}", e)))
}

fn primary_verified_email(emails: Vec<GithubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

fn sign(payload: &str, secret: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a signed `state` value: base64 of `provider|timestamp_hex|signature_hex`.
pub fn encode_state(
    provider: OAuthProvider,
    now_ms: i64,
    secret: &[u8],
) -> Result<String, AppError> {
    let payload = format!("{}|{:x}", provider, now_ms);
    let signature = sign(&payload, secret)?;
    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify a `state` value and return the provider it was issued for.
///
/// Returns `None` for malformed, tampered or expired values.
pub fn verify_state(state: &str, secret: &[u8], now_ms: i64) -> Option<OAuthProvider> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    let mut parts = state_str.splitn(3, '|');
    let (provider, timestamp_hex, signature_hex) = (parts.next()?, parts.next()?, parts.next()?);

    let expected = sign(&format!("{}|{}", provider, timestamp_hex), secret).ok()?;
    if !bool::from(expected.as_bytes().ct_eq(signature_hex.as_bytes())) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return None;
    }

    let issued_at = i64::from_str_radix(timestamp_hex, 16).ok()?;
    if issued_at > now_ms || now_ms - issued_at > STATE_VALIDITY_MS {
        tracing::warn!(issued_at, now_ms, "OAuth state expired");
        return None;
    }

    provider.parse().ok()
}
