// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory repositories backed by `DashMap`.
//!
//! Users are keyed by id with a secondary email index. Email ownership is
//! claimed through the index's entry API, so two writers cannot both claim
//! the same address.

use crate::db::{RecoveryRepository, RepositoryError, UserRepository};
use crate::models::{PasswordRecovery, User};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory user store.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<DashMap<String, User>>,
    /// email -> user id
    emails: Arc<DashMap<String, String>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserRepository for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.get(id).map(|u| u.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let Some(id) = self.emails.get(email).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn insert(&self, user: User) -> Result<User, RepositoryError> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::DuplicateEmail(user.email)),
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
                self.users.insert(user.id.clone(), user.clone());
                tracing::debug!(user_id = %user.id, "User inserted");
                Ok(user)
            }
        }
    }

    async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        let previous_email = self
            .users
            .get(&user.id)
            .map(|u| u.email.clone())
            .ok_or_else(|| RepositoryError::NotFound(user.id.clone()))?;

        if previous_email != user.email {
            match self.emails.entry(user.email.clone()) {
                Entry::Occupied(owner) if owner.get() != &user.id => {
                    return Err(RepositoryError::DuplicateEmail(user.email.clone()));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(user.id.clone());
                }
            }
            self.emails
                .remove_if(&previous_email, |_, owner| owner == &user.id);
        }

        self.users.insert(user.id.clone(), user.clone());
        tracing::debug!(user_id = %user.id, "User updated");
        Ok(())
    }

    async fn touch_last_login(&self, id: &str, at_ms: i64) -> Result<(), RepositoryError> {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        user.last_login = at_ms;
        Ok(())
    }
}

/// In-memory password recovery store.
#[derive(Clone, Default)]
pub struct MemoryRecoveryStore {
    recoveries: Arc<DashMap<String, PasswordRecovery>>,
}

impl MemoryRecoveryStore {
    pub fn get(&self, id: &str) -> Option<PasswordRecovery> {
        self.recoveries.get(id).map(|r| r.value().clone())
    }
}

#[async_trait]
impl RecoveryRepository for MemoryRecoveryStore {
    async fn create(&self, recovery: PasswordRecovery) -> Result<(), RepositoryError> {
        self.recoveries.insert(recovery.id.clone(), recovery);
        Ok(())
    }
}
