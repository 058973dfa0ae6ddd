// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization codes and pending consent requests.
//!
//! Both are single use: `take` reads the record and deletes the file, and
//! only the caller whose delete succeeds gets the record back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::{is_safe_component, JsonStorage, StorageError, StorageResult};
use super::{sweep_expired, Expiring};

/// What an authorization request was granted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Authorization code stored as `codes/{code}.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredAuthorizationCode {
    pub code: String,
    #[serde(flatten)]
    pub grant: AuthorizationGrant,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for StoredAuthorizationCode {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Authorization request waiting for the user's consent, stored as
/// `consents/{consent_code}.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredConsent {
    pub consent_code: String,
    #[serde(flatten)]
    pub grant: AuthorizationGrant,
    /// Client `state` to echo back on the redirect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for StoredConsent {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Repository for authorization codes.
pub struct CodeRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> CodeRepository<'a> {
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    pub fn create(&self, code: &StoredAuthorizationCode) -> StorageResult<()> {
        if !is_safe_component(&code.code) {
            return Err(StorageError::NotFound("Authorization code".to_string()));
        }
        let path = self.storage.paths().code(&code.code);
        if self.storage.exists(&path) {
            return Err(StorageError::AlreadyExists("Authorization code".to_string()));
        }
        self.storage.write_json(path, code)
    }

    /// Consume a code. A second call for the same code fails with `NotFound`.
    pub fn take(&self, code: &str) -> StorageResult<StoredAuthorizationCode> {
        if !is_safe_component(code) {
            return Err(StorageError::NotFound("Authorization code".to_string()));
        }
        let path = self.storage.paths().code(code);
        let record = self.storage.read_json(&path)?;
        self.storage.delete(&path)?;
        Ok(record)
    }

    pub fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        sweep_expired::<StoredAuthorizationCode>(
            self.storage,
            &self.storage.paths().codes_dir(),
            now,
        )
    }
}

/// Repository for pending consent requests.
pub struct ConsentRepository<'a> {
    storage: &'a JsonStorage,
}

impl<'a> ConsentRepository<'a> {
    pub fn new(storage: &'a JsonStorage) -> Self {
        Self { storage }
    }

    pub fn create(&self, consent: &StoredConsent) -> StorageResult<()> {
        if !is_safe_component(&consent.consent_code) {
            return Err(StorageError::NotFound("Consent request".to_string()));
        }
        self.storage
            .write_json(self.storage.paths().consent(&consent.consent_code), consent)
    }

    /// Look at a pending request without consuming it (consent page).
    pub fn get(&self, consent_code: &str) -> StorageResult<StoredConsent> {
        if !is_safe_component(consent_code) {
            return Err(StorageError::NotFound("Consent request".to_string()));
        }
        self.storage
            .read_json(self.storage.paths().consent(consent_code))
    }

    /// Consume a pending request.
    pub fn take(&self, consent_code: &str) -> StorageResult<StoredConsent> {
        let record = self.get(consent_code)?;
        self.storage
            .delete(self.storage.paths().consent(consent_code))?;
        Ok(record)
    }

    pub fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        sweep_expired::<StoredConsent>(self.storage, &self.storage.paths().consents_dir(), now)
    }
}
