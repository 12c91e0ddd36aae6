// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod forms;
pub mod recovery;
pub mod user;

pub use forms::{ProfileUpdateForm, RecoveryForm, RegisterForm, SignInForm};
pub use recovery::PasswordRecovery;
pub use user::{AuthProvider, ImageRef, Role, User};
