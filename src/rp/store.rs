// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory state of the client app: signed-in sessions and sign-ins that
//! are waiting for their OAuth callback.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::AUTHORIZATION_TTL_SECS;
use crate::sweeper::SweepTarget;

/// A local session created after a successful OAuth callback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpSession {
    pub id: String,
    /// Access token issued by the auth server
    pub token: String,
    /// `sub` of the verified ID token
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Sign-in started with the provider, keyed by its `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
    pub nonce: String,
    /// Where to send the browser after the callback
    pub callback_url: String,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.created_at + Duration::seconds(AUTHORIZATION_TTL_SECS)
    }
}

#[derive(Debug, Default)]
pub struct RpStore {
    sessions: RwLock<HashMap<String, RpSession>>,
    pending: RwLock<HashMap<String, PendingAuthorization>>,
}

impl RpStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_session(&self, session: RpSession) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    /// Session `id` if it is still valid at `now`.
    pub async fn session(&self, id: &str, now: DateTime<Utc>) -> Option<RpSession> {
        let sessions = self.sessions.read().await;
        sessions.get(id).filter(|s| s.expires_at > now).cloned()
    }

    pub async fn remove_session(&self, id: &str) -> Option<RpSession> {
        self.sessions.write().await.remove(id)
    }

    pub async fn insert_pending(&self, pending: PendingAuthorization) {
        self.pending
            .write()
            .await
            .insert(pending.state.clone(), pending);
    }

    /// Consume the pending sign-in for `state`. Expired entries are dropped.
    pub async fn take_pending(&self, state: &str, now: DateTime<Utc>) -> Option<PendingAuthorization> {
        self.pending
            .write()
            .await
            .remove(state)
            .filter(|p| !p.is_expired_at(now))
    }

    /// Drop expired sessions and pending sign-ins; returns how many.
    pub async fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, s| s.expires_at > now);
            removed += before - sessions.len();
        }
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, p| !p.is_expired_at(now));
        removed + before - pending.len()
    }
}

/// Sweeps an [`RpStore`] shared with the handlers.
#[derive(Debug, Clone)]
pub struct StoreSweep(pub std::sync::Arc<RpStore>);

impl SweepTarget for StoreSweep {
    fn name(&self) -> &'static str {
        "client-app-store"
    }

    async fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.0.remove_expired(now).await
    }
}
