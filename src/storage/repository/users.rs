// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User account repository.
//!
//! Each account is stored as `users/{user_id}.json`. E-mail addresses are
//! stored lower-cased and are unique across accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::{is_safe_component, JsonStorage, StorageError, StorageResult};

/// User account stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredUser {
    /// Unique user identifier (UUID); the `sub` of every token issued for this user
    pub id: String,
    /// Lower-cased e-mail address
    pub email: String,
    /// Display name
    pub name: String,
    /// Whether the address has been verified (no verification flow yet)
    pub email_verified: bool,
    /// Argon2 PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for user accounts.
pub struct UserRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> UserRepository<'a> {
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    pub fn exists(&self, user_id: &str) -> bool {
        is_safe_component(user_id) && self.storage.exists(self.storage.paths().user(user_id))
    }

    /// Get a user by ID.
    pub fn get(&self, user_id: &str) -> StorageResult<StoredUser> {
        if !self.exists(user_id) {
            return Err(StorageError::NotFound(format!("User {user_id}")));
        }
        self.storage.read_json(self.storage.paths().user(user_id))
    }

    /// Find a user by e-mail address (case-insensitive).
    pub fn get_by_email(&self, email: &str) -> StorageResult<StoredUser> {
        let wanted = email.trim().to_lowercase();
        let user_ids = self
            .storage
            .list_files(self.storage.paths().users_dir(), "json")?;

        for id in user_ids {
            if let Ok(user) = self.get(&id) {
                if user.email == wanted {
                    return Ok(user);
                }
            }
        }

        Err(StorageError::NotFound(format!("User with email {wanted}")))
    }

    /// Store a new user. Fails if the ID or the e-mail is already taken.
    pub fn create(&self, user: &StoredUser) -> StorageResult<()> {
        if !is_safe_component(&user.id) {
            return Err(StorageError::NotFound(format!("User {}", user.id)));
        }
        if self.exists(&user.id) {
            return Err(StorageError::AlreadyExists(format!("User {}", user.id)));
        }
        if self.get_by_email(&user.email).is_ok() {
            return Err(StorageError::AlreadyExists(format!(
                "User with email {}",
                user.email
            )));
        }

        self.storage
            .write_json(self.storage.paths().user(&user.id), user)
    }
}
