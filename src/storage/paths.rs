// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the storage layout.

use std::path::{Path, PathBuf};

/// Default data directory, relative to the working directory.
pub const DATA_ROOT: &str = "./data";

/// Storage path utilities for the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== User Paths ==========

    pub fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    pub fn user(&self, user_id: &str) -> PathBuf {
        self.users_dir().join(format!("{user_id}.json"))
    }

    // ========== Session Paths ==========

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    pub fn session(&self, token: &str) -> PathBuf {
        self.sessions_dir().join(format!("{token}.json"))
    }

    // ========== Authorization Code Paths ==========

    pub fn codes_dir(&self) -> PathBuf {
        self.root.join("codes")
    }

    pub fn code(&self, code: &str) -> PathBuf {
        self.codes_dir().join(format!("{code}.json"))
    }

    // ========== Consent Paths ==========

    pub fn consents_dir(&self) -> PathBuf {
        self.root.join("consents")
    }

    pub fn consent(&self, consent_code: &str) -> PathBuf {
        self.consents_dir().join(format!("{consent_code}.json"))
    }

    // ========== Key Paths ==========

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    /// PKCS#8 PEM of the JWT signing key.
    pub fn signing_key(&self) -> PathBuf {
        self.keys_dir().join("signing-key.pem")
    }
}

/// Whether `id` can be used as a file stem without escaping its directory.
///
/// Identifiers are UUIDs or base64url tokens; anything else is rejected
/// before a path is built from caller-supplied input.
pub fn is_safe_component(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
