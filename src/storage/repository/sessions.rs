// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session repository.
//!
//! Browser sessions and OAuth access tokens are both sessions: an opaque
//! token mapped to a user. Access tokens additionally carry the client they
//! were issued to and the scopes granted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::{is_safe_component, JsonStorage, StorageError, StorageResult};
use super::{sweep_expired, Expiring};

/// Session stored on disk as `sessions/{token}.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    /// Opaque bearer token (base64url)
    pub token: String,
    pub user_id: String,
    /// Client the token was issued to; `None` for browser sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Scopes granted to the client
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

impl Expiring for StoredSession {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Repository for sessions.
pub struct SessionRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> SessionRepository<'a> {
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    pub fn create(&self, session: &StoredSession) -> StorageResult<()> {
        if !is_safe_component(&session.token) {
            return Err(StorageError::NotFound("Session".to_string()));
        }
        self.storage
            .write_json(self.storage.paths().session(&session.token), session)
    }

    /// Get a session by token, regardless of expiry.
    pub fn get(&self, token: &str) -> StorageResult<StoredSession> {
        if !is_safe_component(token) {
            return Err(StorageError::NotFound("Session".to_string()));
        }
        self.storage.read_json(self.storage.paths().session(token))
    }

    /// Get a session that is still valid at `now`.
    ///
    /// An expired session is deleted and reported as not found.
    pub fn get_active(&self, token: &str, now: DateTime<Utc>) -> StorageResult<StoredSession> {
        let session = self.get(token)?;
        if session.is_expired_at(now) {
            let _ = self.delete(token);
            return Err(StorageError::NotFound("Session expired".to_string()));
        }
        Ok(session)
    }

    pub fn delete(&self, token: &str) -> StorageResult<()> {
        if !is_safe_component(token) {
            return Err(StorageError::NotFound("Session".to_string()));
        }
        self.storage.delete(self.storage.paths().session(token))
    }

    /// Remove every session expired at `now`. Returns how many were removed.
    pub fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        sweep_expired::<StoredSession>(self.storage, &self.storage.paths().sessions_dir(), now)
    }
}
