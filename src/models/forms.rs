// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request payloads and their field rules.
//!
//! Single-field rules use `validator` derives. Rules spanning several fields
//! (password confirmation, the gated password change, birth date vs. now) are
//! added by hand so each error is attached to the field the user has to fix.

use serde::Deserialize;
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

pub const MIN_PASSWORD_LEN: usize = 8;

const PASSWORD_LENGTH_MESSAGE: &str = "Password must be at least 8 characters.";

/// Attach a message to `field`.
pub(crate) fn add_field_error(
    errors: &mut ValidationErrors,
    field: &'static str,
    code: &'static str,
    message: &'static str,
) {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    errors.add(field, error);
}

fn into_result(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Blank means "no change"; anything else must be long enough.
fn blank_or_long_enough(value: &str) -> bool {
    value.is_empty() || value.chars().count() >= MIN_PASSWORD_LEN
}

/// Credentials sign-in.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignInForm {
    #[validate(length(min = 1, message = "Email is required."))]
    pub email: String,
    #[validate(length(min = 6, message = "Invalid credentials."))]
    pub password: String,
}

/// Account registration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 3, message = "Enter your name."))]
    pub name: String,
    #[validate(email(message = "Enter a valid email."))]
    pub email: String,
    #[validate(length(min = 8, message = "Password is required, minimum 8 characters."))]
    pub password: String,
    #[validate(length(min = 8, message = "Password is required, minimum 8 characters."))]
    pub confirm_password: String,
}

impl RegisterForm {
    /// Field rules plus the confirmation match.
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);
        if self.password != self.confirm_password {
            add_field_error(
                &mut errors,
                "confirm_password",
                "mismatch",
                "Passwords do not match.",
            );
        }
        into_result(errors)
    }
}

/// Password recovery request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecoveryForm {
    #[validate(email(message = "Enter a valid email."))]
    pub email: String,
}

/// Profile edit submitted from the "Save" button.
///
/// The avatar is not part of this payload; it is replaced through its own
/// upload endpoint as soon as a file is picked.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileUpdateForm {
    #[validate(length(min = 3, message = "Name must be at least 3 characters."))]
    pub name: String,
    #[validate(email(message = "Enter a valid email."))]
    pub email: String,
    /// Epoch millis
    #[serde(default)]
    pub birth_date: Option<i64>,
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

impl ProfileUpdateForm {
    /// Validate against the clock value `now_ms`.
    pub fn check(&self, now_ms: i64) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        if !blank_or_long_enough(&self.old_password) {
            add_field_error(&mut errors, "old_password", "length", PASSWORD_LENGTH_MESSAGE);
        }
        if !blank_or_long_enough(&self.password) {
            add_field_error(&mut errors, "password", "length", PASSWORD_LENGTH_MESSAGE);
        }

        if self.birth_date.is_some_and(|b| b > now_ms) {
            add_field_error(
                &mut errors,
                "birth_date",
                "future_date",
                "Birth date cannot be in the future.",
            );
        }

        if !self.old_password.is_empty() && self.password.is_empty() {
            add_field_error(&mut errors, "password", "required", "Enter the new password.");
        }

        let confirm = self.confirm_password.as_deref().unwrap_or("");
        if !self.password.is_empty() {
            if confirm.is_empty() {
                add_field_error(
                    &mut errors,
                    "confirm_password",
                    "required",
                    "Confirm the new password.",
                );
            } else if confirm != self.password {
                add_field_error(
                    &mut errors,
                    "confirm_password",
                    "mismatch",
                    "Passwords do not match.",
                );
            }
        }

        into_result(errors)
    }

    /// Whether this submission asks for a password change.
    pub fn changes_password(&self) -> bool {
        !self.old_password.is_empty()
    }
}
