// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account authentication: credentials sign-in, OAuth provisioning,
//! registration and password recovery requests.

use crate::config::DemoUser;
use crate::db::{RecoveryRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::models::{
    AuthProvider, ImageRef, PasswordRecovery, RecoveryForm, RegisterForm, SignInForm, User,
};
use crate::services::oauth::OAuthProfile;
use crate::services::password::{hash_password_blocking, verify_password_blocking};
use crate::time_utils::{millis_to_rfc3339, now_millis};
use async_trait::async_trait;
use std::sync::Arc;
use validator::Validate;

/// Birth date given to the seeded demo account (1990-01-01).
const DEMO_BIRTH_DATE_MS: i64 = 631_152_000_000;

/// Delivers password recovery requests to the account owner.
#[async_trait]
pub trait RecoveryNotifier: Send + Sync {
    async fn notify(&self, recovery: &PasswordRecovery, user: &User) -> Result<()>;
}

/// Notifier that only writes a log line. There is no mail transport.
pub struct LogNotifier;

#[async_trait]
impl RecoveryNotifier for LogNotifier {
    async fn notify(&self, recovery: &PasswordRecovery, user: &User) -> Result<()> {
        tracing::info!(
            recovery_id = %recovery.id,
            email = %recovery.email,
            name = %user.name,
            valid_until = %millis_to_rfc3339(recovery.valid_at).unwrap_or_default(),
            "Password recovery requested"
        );
        Ok(())
    }
}

/// Service for sign-in, registration and recovery.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    recoveries: Arc<dyn RecoveryRepository>,
    notifier: Arc<dyn RecoveryNotifier>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        recoveries: Arc<dyn RecoveryRepository>,
        notifier: Arc<dyn RecoveryNotifier>,
    ) -> Self {
        Self {
            users,
            recoveries,
            notifier,
        }
    }

    /// Check an email/password pair and record the login.
    pub async fn sign_in_with_credentials(&self, form: &SignInForm) -> Result<User> {
        form.validate()?;

        let mut user = self
            .users
            .find_by_email(&form.email)
            .await?
            .ok_or_else(|| AppError::InvalidCredentials("User not found".into()))?;

        let Some(hash) = user.password_hash.clone().filter(|h| !h.is_empty()) else {
            return Err(AppError::InvalidCredentials(
                "Sign in with your provider".into(),
            ));
        };

        if !verify_password_blocking(form.password.clone(), hash).await? {
            tracing::info!(user_id = %user.id, "Rejected sign-in: wrong password");
            return Err(AppError::InvalidCredentials("Incorrect password".into()));
        }

        user.last_login = now_millis();
        self.users.touch_last_login(&user.id, user.last_login).await?;

        tracing::info!(user_id = %user.id, "Credentials sign-in");
        Ok(user)
    }

    /// Create or refresh the account behind an OAuth identity.
    pub async fn sign_in_with_oauth(
        &self,
        provider: AuthProvider,
        profile: OAuthProfile,
    ) -> Result<User> {
        let email = profile
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| AppError::OAuthProvider("Provider did not return an email".into()))?;

        // Only Google avatars are kept.
        let image = match provider {
            AuthProvider::Google => profile.picture.map(ImageRef::external),
            _ => None,
        };

        match self.users.find_by_email(&email).await? {
            Some(mut user) => {
                if let Some(key) = user.image_key() {
                    tracing::debug!(user_id = %user.id, key, "Provider image replaces stored image");
                }
                user.image = image;
                user.provider = provider;
                user.password_hash = None;
                user.last_login = now_millis();
                self.users.update(&user).await?;

                tracing::info!(user_id = %user.id, provider = %provider, "OAuth sign-in");
                Ok(user)
            }
            None => {
                let name = if profile.name.trim().is_empty() {
                    email.clone()
                } else {
                    profile.name
                };
                let mut user = User::new(name, email, provider);
                user.image = image;
                user.last_login = now_millis();
                let user = self.users.insert(user).await?;

                tracing::info!(user_id = %user.id, provider = %provider, "OAuth account created");
                Ok(user)
            }
        }
    }

    /// Create a credentials account.
    pub async fn register(&self, form: RegisterForm) -> Result<User> {
        form.check()?;

        if self.users.find_by_email(&form.email).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Email already registered: {}",
                form.email
            )));
        }

        let hash = hash_password_blocking(form.password).await?;
        let mut user = User::new(form.name, form.email, AuthProvider::Credentials);
        user.password_hash = Some(hash);

        // The store re-checks the email under its index lock.
        let user = self.users.insert(user).await?;

        tracing::info!(user_id = %user.id, "Account registered");
        Ok(user)
    }

    /// Record a recovery request and hand it to the notifier.
    pub async fn request_password_recovery(&self, form: &RecoveryForm) -> Result<PasswordRecovery> {
        form.validate()?;

        let user = self
            .users
            .find_by_email(&form.email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        if !user.has_password() {
            return Err(AppError::BadRequest("No password to reset".into()));
        }

        let recovery = PasswordRecovery::new(user.email.clone(), now_millis());
        self.recoveries.create(recovery.clone()).await?;
        self.notifier.notify(&recovery, &user).await?;

        Ok(recovery)
    }

    /// Create the demo account unless its email is already taken.
    pub async fn seed_user(&self, demo: &DemoUser) -> Result<User> {
        if let Some(existing) = self.users.find_by_email(&demo.email).await? {
            return Ok(existing);
        }

        let mut user = User::new("Demo User".into(), demo.email.clone(), AuthProvider::Credentials);
        user.password_hash = Some(hash_password_blocking(demo.password.clone()).await?);
        user.birth_date = Some(DEMO_BIRTH_DATE_MS);

        let user = self.users.insert(user).await?;
        tracing::info!(user_id = %user.id, email = %user.email, "Seeded demo account");
        Ok(user)
    }
}
