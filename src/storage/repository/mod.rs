// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to JSON storage.
//!
//! Each repository provides operations for one entity type and goes through
//! [`JsonStorage`] for all file access.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::{JsonStorage, StorageResult};

pub mod codes;
pub mod sessions;
pub mod users;

pub use codes::{
    AuthorizationGrant, CodeRepository, ConsentRepository, StoredAuthorizationCode, StoredConsent,
};
pub use sessions::{SessionRepository, StoredSession};
pub use users::{StoredUser, UserRepository};

/// Records that stop being valid at a fixed instant.
pub trait Expiring {
    fn expires_at(&self) -> DateTime<Utc>;

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Delete every record in `dir` that has expired at `now`.
///
/// Unreadable files are skipped; they are left for an operator to inspect.
fn sweep_expired<T: DeserializeOwned + Expiring>(
    storage: &JsonStorage,
    dir: &Path,
    now: DateTime<Utc>,
) -> StorageResult<usize> {
    let mut removed = 0;
    for id in storage.list_files(dir, "json")? {
        let path = dir.join(format!("{id}.json"));
        let Ok(record) = storage.read_json::<T>(&path) else {
            continue;
        };
        if record.is_expired_at(now) && storage.delete(&path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}
