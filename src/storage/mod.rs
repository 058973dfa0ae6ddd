// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent state of the identity provider, kept as JSON files under the
//! data directory (`DATA_DIR`, default `./data`).
//!
//! ## Storage Layout
//!
//! ```text
//! data/
//!   users/{user_id}.json        # Accounts (argon2 password hash)
//!   sessions/{token}.json       # Browser sessions and access tokens
//!   codes/{code}.json           # Authorization codes (single use)
//!   consents/{consent_code}.json
//!   keys/signing-key.pem        # ES256 JWT signing key (PKCS#8)
//! ```

pub mod fs;
pub mod paths;
pub mod repository;

pub use fs::{JsonStorage, StorageError, StorageResult};
pub use paths::{is_safe_component, StoragePaths};
pub use repository::{
    AuthorizationGrant, CodeRepository, ConsentRepository, Expiring, SessionRepository,
    StoredAuthorizationCode, StoredConsent, StoredSession, StoredUser, UserRepository,
};
