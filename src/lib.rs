// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! web-init: starter dashboard backend
//!
//! This crate provides the API behind a session-gated dashboard: credentials
//! and OAuth sign-in, registration, password recovery requests, and a profile
//! editor whose avatars live in an S3-compatible bucket.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{MemoryRecoveryStore, UserRepository};
use services::{AuthService, LogNotifier, OAuthClient, ProfileService, StorageProvider};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth_service: AuthService,
    pub profile_service: ProfileService,
    pub oauth_client: OAuthClient,
}

impl AppState {
    /// Wire services around an injected user repository and storage provider.
    ///
    /// Recovery requests go to an in-memory store and are "delivered" through
    /// the log notifier.
    pub fn new(
        config: Config,
        users: Arc<dyn UserRepository>,
        storage: Arc<dyn StorageProvider>,
    ) -> Self {
        let auth_service = AuthService::new(
            users.clone(),
            Arc::new(MemoryRecoveryStore::default()),
            Arc::new(LogNotifier),
        );
        let profile_service = ProfileService::new(users, storage);
        let oauth_client = OAuthClient::new(config.google.clone(), config.github.clone());

        Self {
            config,
            auth_service,
            profile_service,
            oauth_client,
        }
    }
}
