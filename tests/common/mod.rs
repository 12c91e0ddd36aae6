// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use web_init::config::Config;
use web_init::db::{MemoryUserStore, RepositoryError, UserRepository};
use web_init::middleware::auth::create_session_token;
use web_init::models::{AuthProvider, User};
use web_init::routes::create_router;
use web_init::services::password::hash_password;
use web_init::services::{StorageError, StorageProvider, StoredObject, UploadFile};
use web_init::AppState;

/// Password given to users created by `seed_credentials_user`.
#[allow(dead_code)]
pub const TEST_PASSWORD: &str = "oldpassword";

/// Storage double that records every call.
#[derive(Default)]
pub struct RecordingStorage {
    pub uploads: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub fail_uploads: AtomicBool,
}

#[allow(dead_code)]
impl RecordingStorage {
    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn deleted_keys(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageProvider for RecordingStorage {
    async fn upload(&self, file: UploadFile) -> Result<StoredObject, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Upload("bucket unavailable".into()));
        }
        let mut uploads = self.uploads.lock().unwrap();
        let key = format!("{}-{}", 1_700_000_000_000u64 + uploads.len() as u64, file.file_name);
        uploads.push(key.clone());
        Ok(StoredObject {
            url: format!("http://storage.test/avatars/{}?X-Amz-Signature=abc", key),
            key,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.deletes.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn signed_url(&self, key: &str) -> Result<String, StorageError> {
        Ok(format!("http://storage.test/avatars/{}?X-Amz-Signature=fresh", key))
    }
}

/// User repository wrapper that counts `update` calls.
#[derive(Default)]
pub struct CountingUsers {
    pub inner: MemoryUserStore,
    pub updates: AtomicUsize,
}

#[allow(dead_code)]
impl CountingUsers {
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserRepository for CountingUsers {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.inner.find_by_email(email).await
    }

    async fn insert(&self, user: User) -> Result<User, RepositoryError> {
        self.inner.insert(user).await
    }

    async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(user).await
    }

    async fn touch_last_login(&self, id: &str, at_ms: i64) -> Result<(), RepositoryError> {
        self.inner.touch_last_login(id, at_ms).await
    }
}

/// Router plus handles on its test doubles.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub users: Arc<CountingUsers>,
    pub storage: Arc<RecordingStorage>,
}

/// Create a test app with in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

/// Create a test app whose frontend lives at `frontend_url`.
#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> TestApp {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with_config(config)
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let users = Arc::new(CountingUsers::default());
    let storage = Arc::new(RecordingStorage::default());
    let state = Arc::new(AppState::new(config, users.clone(), storage.clone()));

    TestApp {
        router: create_router(state.clone()),
        state,
        users,
        storage,
    }
}

/// Store a credentials account with `TEST_PASSWORD`.
#[allow(dead_code)]
pub async fn seed_credentials_user(app: &TestApp, email: &str) -> User {
    let mut user = User::new("Test User".into(), email.into(), AuthProvider::Credentials);
    user.password_hash = Some(hash_password(TEST_PASSWORD).unwrap());
    app.users.inner.insert(user).await.unwrap()
}

/// Store an OAuth-only account.
#[allow(dead_code)]
pub async fn seed_oauth_user(app: &TestApp, email: &str, provider: AuthProvider) -> User {
    let user = User::new("OAuth User".into(), email.into(), provider);
    app.users.inner.insert(user).await.unwrap()
}

/// Session token for `user`, signed with the app's key.
#[allow(dead_code)]
pub fn session_token(app: &TestApp, user: &User) -> String {
    create_session_token(
        user,
        &app.state.config.jwt_signing_key,
        app.state.config.session_max_age_secs,
    )
    .unwrap()
}

/// Multipart body with a single `file` part.
#[allow(dead_code)]
pub fn multipart_body(boundary: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// JSON request body.
#[allow(dead_code)]
pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(serde_json::to_vec(&value).unwrap())
}
