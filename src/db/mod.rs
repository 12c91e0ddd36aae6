// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence layer.
//!
//! Handlers only see the repository traits; the in-memory implementations
//! are built at startup and injected through `AppState`.

pub mod memory;

pub use memory::{MemoryRecoveryStore, MemoryUserStore};

use crate::models::{PasswordRecovery, User};
use async_trait::async_trait;

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("User not found: {0}")]
    NotFound(String),
}

/// User account storage.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError>;

    /// Exact (case-sensitive) email match.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Store a new account. Fails with `DuplicateEmail` if the email is taken.
    async fn insert(&self, user: User) -> Result<User, RepositoryError>;

    /// Replace an existing account. Moving to an email owned by another
    /// account fails with `DuplicateEmail`.
    async fn update(&self, user: &User) -> Result<(), RepositoryError>;

    /// Set `last_login` without touching any other field.
    async fn touch_last_login(&self, id: &str, at_ms: i64) -> Result<(), RepositoryError>;
}

/// Password recovery request storage.
#[async_trait]
pub trait RecoveryRepository: Send + Sync {
    async fn create(&self, recovery: PasswordRecovery) -> Result<(), RepositoryError>;
}
