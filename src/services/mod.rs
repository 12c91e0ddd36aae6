// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod oauth;
pub mod password;
pub mod profile;
pub mod storage;

pub use auth::{AuthService, LogNotifier, RecoveryNotifier};
pub use oauth::{OAuthClient, OAuthProfile, OAuthProvider};
pub use profile::{FormPhase, ProfileService, ProfileView};
pub use storage::{S3StorageProvider, StorageError, StorageProvider, StoredObject, UploadFile};
