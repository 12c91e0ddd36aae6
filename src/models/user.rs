// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User model for storage and API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an account authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    /// Locally stored password hash
    Credentials,
    Google,
    Github,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Credentials => "credentials",
            AuthProvider::Google => "google",
            AuthProvider::Github => "github",
        }
    }

    /// OAuth-only accounts have no password and a locked email.
    pub fn is_oauth(&self) -> bool {
        !matches!(self, AuthProvider::Credentials)
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// Reference to a profile image.
///
/// `key` is the storage handle used to delete or replace the object. It is
/// `None` for images hosted elsewhere (an OAuth provider's avatar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ImageRef {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ImageRef {
    /// Image stored in our bucket.
    pub fn stored(url: String, key: String) -> Self {
        Self {
            url,
            key: Some(key),
        }
    }

    /// Image hosted by a third party; nothing to delete on replacement.
    pub fn external(url: String) -> Self {
        Self { url, key: None }
    }
}

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// UUID v4, assigned at creation
    pub id: String,
    /// Display name
    pub name: String,
    /// Email address (unique across accounts)
    pub email: String,
    /// Argon2 PHC string; `None` for OAuth-only accounts
    pub password_hash: Option<String>,
    pub image: Option<ImageRef>,
    /// Birth date as epoch millis
    pub birth_date: Option<i64>,
    pub provider: AuthProvider,
    pub role: Role,
    /// Last successful sign-in, epoch millis (0 = never)
    pub last_login: i64,
    /// When the account was created (RFC3339)
    pub created_at: String,
}

impl User {
    /// Build a fresh account with a new id.
    pub fn new(name: String, email: String, provider: AuthProvider) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            password_hash: None,
            image: None,
            birth_date: None,
            provider,
            role: Role::User,
            last_login: 0,
            created_at: crate::time_utils::format_utc_rfc3339(chrono::Utc::now()),
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Storage key of the current image, if it lives in our bucket.
    pub fn image_key(&self) -> Option<&str> {
        self.image.as_ref().and_then(|i| i.key.as_deref())
    }
}
