// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::storage::{
    CodeRepository, ConsentRepository, JsonStorage, SessionRepository, StorageResult,
};
use crate::sweeper::SweepTarget;

/// Expired sessions, authorization codes, and consent requests on disk.
#[derive(Clone)]
pub struct ExpiredRecords {
    storage: Arc<JsonStorage>,
}

impl ExpiredRecords {
    pub fn new(storage: Arc<JsonStorage>) -> Self {
        Self { storage }
    }
}

fn count(kind: &str, result: StorageResult<usize>) -> usize {
    result.unwrap_or_else(|e| {
        warn!(kind, error = %e, "Sweep failed");
        0
    })
}

impl SweepTarget for ExpiredRecords {
    fn name(&self) -> &'static str {
        "auth-server-records"
    }

    async fn sweep(&self, now: DateTime<Utc>) -> usize {
        count("sessions", SessionRepository::new(&self.storage).delete_expired(now))
            + count("codes", CodeRepository::new(&self.storage).delete_expired(now))
            + count("consents", ConsentRepository::new(&self.storage).delete_expired(now))
    }
}
