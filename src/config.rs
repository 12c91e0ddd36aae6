// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honored for local development. Everything is read once
//! at startup.

use std::env;

/// Default session lifetime (1 hour).
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 60 * 60;

/// Default avatar upload limit (5 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for OAuth redirects and CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// Session token lifetime in seconds
    pub session_max_age_secs: u64,
    /// Largest accepted avatar upload in bytes
    pub max_upload_bytes: usize,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,

    /// Object storage (S3-compatible) settings
    pub storage: StorageConfig,
    /// Google OAuth client, if configured
    pub google: Option<OAuthCredentials>,
    /// GitHub OAuth client, if configured
    pub github: Option<OAuthCredentials>,
    /// Credentials account created at startup for local testing
    pub demo_user: Option<DemoUser>,
}

/// S3-compatible object storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Endpoint URL, e.g. `http://localhost:9000` for MinIO
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

/// OAuth client id/secret pair.
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Seed account for the in-memory user store.
#[derive(Debug, Clone)]
pub struct DemoUser {
    pub email: String,
    pub password: String,
}

impl Config {
    /// Config for tests: no OAuth providers, no demo user, dummy storage.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            port: 8080,
            session_max_age_secs: DEFAULT_SESSION_MAX_AGE_SECS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
            storage: StorageConfig {
                endpoint: "http://localhost:9000".to_string(),
                bucket: "test-bucket".to_string(),
                access_key: "minioadmin".to_string(),
                secret_key: "minioadmin".to_string(),
                region: "us-east-1".to_string(),
            },
            google: None,
            github: None,
            demo_user: None,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();
        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(String::into_bytes)
            .unwrap_or_else(|_| jwt_signing_key.clone());

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: parse_or("PORT", 8080)?,
            session_max_age_secs: parse_or("SESSION_MAX_AGE_SECS", DEFAULT_SESSION_MAX_AGE_SECS)?,
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            jwt_signing_key,
            oauth_state_key,
            storage: StorageConfig {
                endpoint: required("STORAGE_ENDPOINT")?,
                bucket: required("STORAGE_BUCKET")?,
                access_key: required("STORAGE_ACCESS_KEY")?,
                secret_key: required("STORAGE_SECRET_KEY")?,
                region: env::var("STORAGE_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            },
            google: oauth_pair("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET")?,
            github: oauth_pair("GITHUB_ID", "GITHUB_SECRET")?,
            demo_user: match (env::var("DEMO_USER_EMAIL"), env::var("DEMO_USER_PASSWORD")) {
                (Ok(email), Ok(password)) => Some(DemoUser { email, password }),
                _ => None,
            },
        })
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// A provider is enabled only when its client id is set; the secret is then
/// mandatory.
fn oauth_pair(
    id_var: &'static str,
    secret_var: &'static str,
) -> Result<Option<OAuthCredentials>, ConfigError> {
    match env::var(id_var) {
        Ok(client_id) if !client_id.trim().is_empty() => Ok(Some(OAuthCredentials {
            client_id: client_id.trim().to_string(),
            client_secret: required(secret_var)?,
        })),
        _ => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
