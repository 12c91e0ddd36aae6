// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile edit workflow.
//!
//! Handles:
//! - Loading the form values for the signed-in user
//! - Validated submits with the gated password change
//! - Avatar replace/remove/re-sign against the storage provider
//!
//! Each user has at most one operation in flight. The phase tracker rejects
//! overlapping requests with a conflict, the same way the form disables its
//! submit button while busy.

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::models::forms::add_field_error;
use crate::models::{AuthProvider, ImageRef, ProfileUpdateForm, User};
use crate::services::password::{hash_password_blocking, verify_password_blocking};
use crate::services::storage::{StorageProvider, UploadFile};
use crate::time_utils::now_millis;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use validator::ValidationErrors;

/// Where a user's profile form currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormPhase {
    /// Fetching the current user
    LoadingData,
    /// Ready for input
    Idle,
    /// A save or image operation is running
    Submitting,
}

impl fmt::Display for FormPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormPhase::LoadingData => "loading_data",
            FormPhase::Idle => "idle",
            FormPhase::Submitting => "submitting",
        };
        f.write_str(s)
    }
}

/// Marks a user as busy; clears the mark when dropped.
struct PhaseGuard {
    phases: Arc<DashMap<String, FormPhase>>,
    user_id: String,
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.phases.remove(&self.user_id);
    }
}

/// Profile form values as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProfileView {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Epoch millis
    pub birth_date: Option<i64>,
    pub image: Option<ImageRef>,
    pub provider: AuthProvider,
    /// OAuth-only accounts cannot change email or password
    pub provider_locked: bool,
    pub old_password: String,
    pub password: String,
    pub confirm_password: String,
}

impl From<&User> for ProfileView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            birth_date: user.birth_date,
            image: user.image.clone(),
            provider: user.provider,
            provider_locked: user.provider.is_oauth(),
            old_password: String::new(),
            password: String::new(),
            confirm_password: String::new(),
        }
    }
}

/// Service for profile reads and edits.
#[derive(Clone)]
pub struct ProfileService {
    users: Arc<dyn UserRepository>,
    storage: Arc<dyn StorageProvider>,
    phases: Arc<DashMap<String, FormPhase>>,
}

impl ProfileService {
    pub fn new(users: Arc<dyn UserRepository>, storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            users,
            storage,
            phases: Arc::new(DashMap::new()),
        }
    }

    /// Current phase for `user_id`.
    pub fn phase(&self, user_id: &str) -> FormPhase {
        self.phases
            .get(user_id)
            .map(|p| *p.value())
            .unwrap_or(FormPhase::Idle)
    }

    /// Claim the user's workflow for `phase`, or fail if something is running.
    fn begin(&self, user_id: &str, phase: FormPhase) -> Result<PhaseGuard> {
        match self.phases.entry(user_id.to_string()) {
            Entry::Occupied(busy) => {
                tracing::debug!(user_id, phase = %busy.get(), "Profile workflow busy");
                Err(AppError::Conflict(format!(
                    "Profile is busy ({})",
                    busy.get()
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(phase);
                Ok(PhaseGuard {
                    phases: self.phases.clone(),
                    user_id: user_id.to_string(),
                })
            }
        }
    }

    async fn load_user(&self, user_id: &str) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    /// Form values for the profile page.
    pub async fn load(&self, user_id: &str) -> Result<ProfileView> {
        let _guard = self.begin(user_id, FormPhase::LoadingData)?;
        let user = self.load_user(user_id).await?;
        Ok(ProfileView::from(&user))
    }

    /// Validate and persist a profile edit.
    pub async fn submit(&self, user_id: &str, form: ProfileUpdateForm) -> Result<ProfileView> {
        let _guard = self.begin(user_id, FormPhase::Submitting)?;

        let mut errors = form.check(now_millis()).err().unwrap_or_else(ValidationErrors::new);
        let mut user = self.load_user(user_id).await?;

        if user.provider.is_oauth() {
            if form.email != user.email {
                add_field_error(
                    &mut errors,
                    "email",
                    "provider_locked",
                    "Email is managed by your sign-in provider.",
                );
            }
            if form.changes_password() {
                add_field_error(
                    &mut errors,
                    "old_password",
                    "provider_locked",
                    "This account has no password.",
                );
            }
            if !form.password.is_empty() {
                add_field_error(
                    &mut errors,
                    "password",
                    "provider_locked",
                    "Password sign-in is not available for this account.",
                );
            }
        }
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        if form.changes_password() {
            let matches = match user.password_hash.clone().filter(|h| !h.is_empty()) {
                Some(hash) => verify_password_blocking(form.old_password.clone(), hash).await?,
                None => false,
            };
            if !matches {
                tracing::info!(user_id, "Profile submit rejected: old password mismatch");
                return Err(AppError::BadRequest("Old password is incorrect.".into()));
            }
        }

        // A new password is only taken once the old one has been verified.
        let new_hash = if form.changes_password() && !form.password.is_empty() {
            Some(hash_password_blocking(form.password.clone()).await?)
        } else {
            None
        };

        if form.email != user.email {
            if let Some(other) = self.users.find_by_email(&form.email).await? {
                if other.id != user.id {
                    return Err(AppError::Conflict("Email already registered.".into()));
                }
            }
        }

        user.name = form.name;
        user.email = form.email;
        if let Some(birth_date) = form.birth_date {
            user.birth_date = Some(birth_date);
        }
        let password_changed = new_hash.is_some();
        if let Some(hash) = new_hash {
            user.password_hash = Some(hash);
        }

        self.users.update(&user).await?;

        tracing::info!(user_id, password_changed, "Profile updated");
        Ok(ProfileView::from(&user))
    }

    /// Upload a new avatar and retire the previous one.
    pub async fn replace_image(&self, user_id: &str, file: UploadFile) -> Result<ImageRef> {
        let _guard = self.begin(user_id, FormPhase::Submitting)?;

        if !file.content_type.starts_with("image/") {
            return Err(AppError::BadRequest(format!(
                "Unsupported content type: {}",
                file.content_type
            )));
        }

        let mut user = self.load_user(user_id).await?;
        let previous_key = user.image_key().map(str::to_owned);

        let stored = self.storage.upload(file).await?;
        let image = ImageRef::stored(stored.url, stored.key.clone());
        user.image = Some(image.clone());

        if let Err(e) = self.users.update(&user).await {
            self.delete_best_effort(&stored.key).await;
            return Err(e.into());
        }

        if let Some(key) = previous_key {
            self.delete_best_effort(&key).await;
        }

        tracing::info!(user_id, key = %stored.key, "Profile image replaced");
        Ok(image)
    }

    /// Clear the avatar and delete its object.
    pub async fn remove_image(&self, user_id: &str) -> Result<()> {
        let _guard = self.begin(user_id, FormPhase::Submitting)?;

        let mut user = self.load_user(user_id).await?;
        let Some(image) = user.image.take() else {
            return Ok(());
        };

        self.users.update(&user).await?;

        if let Some(key) = image.key {
            self.delete_best_effort(&key).await;
        }

        tracing::info!(user_id, "Profile image removed");
        Ok(())
    }

    /// Reissue the signed URL of a stored avatar.
    ///
    /// Images hosted by a provider are returned unchanged.
    pub async fn refresh_image_url(&self, user_id: &str) -> Result<ImageRef> {
        let _guard = self.begin(user_id, FormPhase::LoadingData)?;

        let mut user = self.load_user(user_id).await?;
        let image = user
            .image
            .clone()
            .ok_or_else(|| AppError::NotFound("No profile image".into()))?;

        let Some(key) = image.key else {
            return Ok(image);
        };

        let url = self.storage.signed_url(&key).await?;
        let refreshed = ImageRef::stored(url, key);
        user.image = Some(refreshed.clone());
        self.users.update(&user).await?;

        Ok(refreshed)
    }

    async fn delete_best_effort(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            tracing::warn!(key, error = %e, "Failed to delete stored image, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryUserStore;
    use crate::services::password::hash_password;
    use crate::services::storage::{StorageError, StoredObject};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Storage double that records calls.
    #[derive(Default)]
    struct FakeStorage {
        uploads: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
        fail_upload: AtomicBool,
        fail_delete: AtomicBool,
    }

    #[async_trait]
    impl StorageProvider for FakeStorage {
        async fn upload(&self, file: UploadFile) -> std::result::Result<StoredObject, StorageError> {
            if self.fail_upload.load(Ordering::SeqCst) {
                return Err(StorageError::Upload("bucket offline".into()));
            }
            let key = format!("{}-{}", self.uploads.lock().unwrap().len(), file.file_name);
            self.uploads.lock().unwrap().push(key.clone());
            Ok(StoredObject {
                url: format!("https://storage.test/{}?sig", key),
                key,
            })
        }

        async fn delete(&self, key: &str) -> std::result::Result<(), StorageError> {
            self.deletes.lock().unwrap().push(key.to_string());
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(StorageError::Delete("denied".into()));
            }
            Ok(())
        }

        async fn signed_url(&self, key: &str) -> std::result::Result<String, StorageError> {
            Ok(format!("https://storage.test/{}?fresh", key))
        }
    }

    struct Fixture {
        service: ProfileService,
        users: MemoryUserStore,
        storage: Arc<FakeStorage>,
        user: User,
    }

    async fn fixture() -> Fixture {
        let users = MemoryUserStore::new();
        let storage = Arc::new(FakeStorage::default());
        let mut user = User::new(
            "Test User".into(),
            "user@example.com".into(),
            AuthProvider::Credentials,
        );
        user.password_hash = Some(hash_password("oldpassword").unwrap());
        let user = users.insert(user).await.unwrap();

        Fixture {
            service: ProfileService::new(Arc::new(users.clone()), storage.clone()),
            users,
            storage,
            user,
        }
    }

    fn form(user: &User) -> ProfileUpdateForm {
        ProfileUpdateForm {
            name: user.name.clone(),
            email: user.email.clone(),
            ..Default::default()
        }
    }

    fn png(name: &str) -> UploadFile {
        UploadFile {
            file_name: name.into(),
            content_type: "image/png".into(),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    #[tokio::test]
    async fn test_load_returns_blank_password_fields() {
        let f = fixture().await;
        let view = f.service.load(&f.user.id).await.unwrap();
        assert_eq!(view.email, "user@example.com");
        assert!(!view.provider_locked);
        assert!(view.old_password.is_empty() && view.password.is_empty());
        assert_eq!(f.service.phase(&f.user.id), FormPhase::Idle);
    }

    #[tokio::test]
    async fn test_submit_updates_fields_and_keeps_birth_date() {
        let f = fixture().await;
        let mut stored = f.user.clone();
        stored.birth_date = Some(631_152_000_000);
        f.users.update(&stored).await.unwrap();

        let view = f
            .service
            .submit(
                &f.user.id,
                ProfileUpdateForm {
                    name: "Renamed User".into(),
                    email: "renamed@example.com".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(view.name, "Renamed User");
        assert_eq!(view.birth_date, Some(631_152_000_000));
        let reloaded = f.users.find_by_id(&f.user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.email, "renamed@example.com");
        assert_eq!(reloaded.password_hash, f.user.password_hash);
    }

    #[tokio::test]
    async fn test_submit_changes_password() {
        let f = fixture().await;
        f.service
            .submit(
                &f.user.id,
                ProfileUpdateForm {
                    old_password: "oldpassword".into(),
                    password: "newpassword".into(),
                    confirm_password: Some("newpassword".into()),
                    ..form(&f.user)
                },
            )
            .await
            .unwrap();

        let reloaded = f.users.find_by_id(&f.user.id).await.unwrap().unwrap();
        let hash = reloaded.password_hash.unwrap();
        assert!(crate::services::password::verify_password("newpassword", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_wrong_old_password_changes_nothing() {
        let f = fixture().await;
        let err = f
            .service
            .submit(
                &f.user.id,
                ProfileUpdateForm {
                    name: "Someone Else".into(),
                    old_password: "not-the-password".into(),
                    password: "newpassword".into(),
                    confirm_password: Some("newpassword".into()),
                    ..form(&f.user)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Old password is incorrect."));

        let reloaded = f.users.find_by_id(&f.user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.name, "Test User");
        assert_eq!(f.service.phase(&f.user.id), FormPhase::Idle);
    }

    #[tokio::test]
    async fn test_email_collision() {
        let f = fixture().await;
        f.users
            .insert(User::new(
                "Other".into(),
                "taken@example.com".into(),
                AuthProvider::Credentials,
            ))
            .await
            .unwrap();

        let err = f
            .service
            .submit(
                &f.user.id,
                ProfileUpdateForm {
                    email: "taken@example.com".into(),
                    ..form(&f.user)
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg == "Email already registered."));
    }

    #[tokio::test]
    async fn test_oauth_account_is_provider_locked() {
        let f = fixture().await;
        let oauth = f
            .users
            .insert(User::new(
                "Octo Cat".into(),
                "octo@example.com".into(),
                AuthProvider::Github,
            ))
            .await
            .unwrap();

        let err = f
            .service
            .submit(
                &oauth.id,
                ProfileUpdateForm {
                    email: "changed@example.com".into(),
                    old_password: "whatever1".into(),
                    password: "newpassword".into(),
                    confirm_password: Some("newpassword".into()),
                    ..form(&oauth)
                },
            )
            .await
            .unwrap_err();

        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("old_password"));
        assert!(fields.contains_key("password"));
    }

    #[tokio::test]
    async fn test_oauth_account_cannot_gain_a_password() {
        let f = fixture().await;
        let oauth = f
            .users
            .insert(User::new(
                "Goo Gle".into(),
                "goo@example.com".into(),
                AuthProvider::Google,
            ))
            .await
            .unwrap();

        let err = f
            .service
            .submit(
                &oauth.id,
                ProfileUpdateForm {
                    password: "newpassword".into(),
                    confirm_password: Some("newpassword".into()),
                    ..form(&oauth)
                },
            )
            .await
            .unwrap_err();

        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.field_errors().contains_key("password"));
        let reloaded = f.users.find_by_id(&oauth.id).await.unwrap().unwrap();
        assert!(!reloaded.has_password());
    }

    #[tokio::test]
    async fn test_new_password_without_old_password_is_not_stored() {
        let f = fixture().await;
        f.service
            .submit(
                &f.user.id,
                ProfileUpdateForm {
                    name: "Renamed User".into(),
                    password: "newpassword".into(),
                    confirm_password: Some("newpassword".into()),
                    ..form(&f.user)
                },
            )
            .await
            .unwrap();

        let reloaded = f.users.find_by_id(&f.user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.name, "Renamed User");
        assert_eq!(reloaded.password_hash, f.user.password_hash);
    }

    #[tokio::test]
    async fn test_busy_workflow_conflicts() {
        let f = fixture().await;
        let guard = f.service.begin(&f.user.id, FormPhase::Submitting).unwrap();
        assert_eq!(f.service.phase(&f.user.id), FormPhase::Submitting);

        let err = f.service.submit(&f.user.id, form(&f.user)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        drop(guard);
        assert_eq!(f.service.phase(&f.user.id), FormPhase::Idle);
        f.service.submit(&f.user.id, form(&f.user)).await.unwrap();
    }

    #[tokio::test]
    async fn test_replace_image_uploads_once_and_deletes_old_key() {
        let f = fixture().await;
        let first = f.service.replace_image(&f.user.id, png("a.png")).await.unwrap();
        assert!(f.storage.deletes.lock().unwrap().is_empty());

        let second = f.service.replace_image(&f.user.id, png("b.png")).await.unwrap();
        assert_eq!(f.storage.uploads.lock().unwrap().len(), 2);
        assert_eq!(*f.storage.deletes.lock().unwrap(), vec![first.key.unwrap()]);

        let reloaded = f.users.find_by_id(&f.user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.image, Some(second));
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_old_image() {
        let f = fixture().await;
        let first = f.service.replace_image(&f.user.id, png("a.png")).await.unwrap();

        f.storage.fail_upload.store(true, Ordering::SeqCst);
        let err = f
            .service
            .replace_image(&f.user.id, png("b.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let reloaded = f.users.find_by_id(&f.user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.image, Some(first));
        assert!(f.storage.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_old_image_delete_is_swallowed() {
        let f = fixture().await;
        f.service.replace_image(&f.user.id, png("a.png")).await.unwrap();

        f.storage.fail_delete.store(true, Ordering::SeqCst);
        let image = f.service.replace_image(&f.user.id, png("b.png")).await.unwrap();
        assert_eq!(image.key.as_deref(), Some("1-b.png"));
    }

    #[tokio::test]
    async fn test_non_image_rejected_before_upload() {
        let f = fixture().await;
        let err = f
            .service
            .replace_image(
                &f.user.id,
                UploadFile {
                    file_name: "notes.txt".into(),
                    content_type: "text/plain".into(),
                    bytes: b"hello".to_vec(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(f.storage.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_refresh_image() {
        let f = fixture().await;
        let image = f.service.replace_image(&f.user.id, png("a.png")).await.unwrap();

        let refreshed = f.service.refresh_image_url(&f.user.id).await.unwrap();
        assert_eq!(refreshed.key, image.key);
        assert!(refreshed.url.ends_with("?fresh"));

        f.service.remove_image(&f.user.id).await.unwrap();
        let reloaded = f.users.find_by_id(&f.user.id).await.unwrap().unwrap();
        assert!(reloaded.image.is_none());
        assert_eq!(*f.storage.deletes.lock().unwrap(), vec![image.key.unwrap()]);

        let err = f.service.refresh_image_url(&f.user.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
