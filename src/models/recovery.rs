// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password recovery request record.

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

/// How long a recovery request stays valid (30 minutes).
pub const RECOVERY_VALIDITY_MS: i64 = 30 * 60 * 1000;

/// Length of the random suffix in recovery ids.
const RECOVERY_SUFFIX_LEN: usize = 7;

/// A pending password recovery. Only creation is supported; there is no
/// redemption flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordRecovery {
    /// `recovery_<millis>_<suffix>`
    pub id: String,
    pub email: String,
    /// Epoch millis
    pub created_at: i64,
    /// Epoch millis after which the request is stale
    pub valid_at: i64,
}

impl PasswordRecovery {
    pub fn new(email: String, now_ms: i64) -> Self {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RECOVERY_SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();

        Self {
            id: format!("recovery_{}_{}", now_ms, suffix),
            email,
            created_at: now_ms,
            valid_at: now_ms + RECOVERY_VALIDITY_MS,
        }
    }
}
