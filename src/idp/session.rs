// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Browser sessions and access tokens of the auth server.
//!
//! A session is presented either as the `session_token` cookie or as
//! `Authorization: Bearer <token>`. The bearer form is how the client app
//! uses the OAuth access token it received at the token endpoint.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use tracing::warn;

use super::state::IdpState;
use crate::auth::bearer_token;
use crate::cookies::{build_clear_cookie, build_cookie, read_cookie};
use crate::crypto::random_token;
use crate::error::ApiError;
use crate::storage::{SessionRepository, StorageError, StoredSession, StoredUser, UserRepository};

pub const SESSION_COOKIE: &str = "session_token";

/// `Set-Cookie` value for a new browser session.
pub fn session_cookie(state: &IdpState, session: &StoredSession) -> String {
    build_cookie(
        SESSION_COOKIE,
        &session.token,
        state.config.session_ttl,
        state.config.cookie_secure,
    )
}

pub fn clear_session_cookie(state: &IdpState) -> String {
    build_clear_cookie(SESSION_COOKIE, state.config.cookie_secure)
}

/// Session token of the request: bearer header first, then cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    bearer_token(headers)
        .ok()
        .or_else(|| read_cookie(headers, SESSION_COOKIE))
}

/// Create and persist a session for `user_id`.
pub fn create_session(
    state: &IdpState,
    user_id: &str,
    client_id: Option<&str>,
    scopes: Vec<String>,
    ttl: Duration,
) -> Result<StoredSession, ApiError> {
    let now = Utc::now();
    let session = StoredSession {
        token: random_token().map_err(ApiError::internal)?,
        user_id: user_id.to_string(),
        client_id: client_id.map(str::to_string),
        scopes,
        created_at: now,
        expires_at: now + ttl,
    };
    SessionRepository::new(&state.storage).create(&session)?;
    Ok(session)
}

/// Start a browser session (no client, no scopes).
pub fn create_browser_session(state: &IdpState, user_id: &str) -> Result<StoredSession, ApiError> {
    create_session(state, user_id, None, Vec::new(), state.config.session_ttl)
}

/// A live session together with its user.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub session: StoredSession,
    pub user: StoredUser,
}

/// Resolve the request's session, if it carries a live one.
pub fn current_session(state: &IdpState, headers: &HeaderMap) -> Option<Authenticated> {
    let token = session_token(headers)?;
    let session = match SessionRepository::new(&state.storage).get_active(token, Utc::now()) {
        Ok(session) => session,
        Err(StorageError::NotFound(_)) => return None,
        Err(e) => {
            warn!(error = %e, "Failed to read session");
            return None;
        }
    };

    match UserRepository::new(&state.storage).get(&session.user_id) {
        Ok(user) => Some(Authenticated { session, user }),
        Err(e) => {
            warn!(user_id = %session.user_id, error = %e, "Session refers to a missing user");
            None
        }
    }
}

/// Remove the request's session, if any. Returns whether one was removed.
pub fn end_session(state: &IdpState, headers: &HeaderMap) -> bool {
    session_token(headers)
        .map(|token| SessionRepository::new(&state.storage).delete(token).is_ok())
        .unwrap_or(false)
}

impl FromRequestParts<IdpState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &IdpState) -> Result<Self, Self::Rejection> {
        current_session(state, &parts.headers).ok_or_else(|| ApiError::unauthorized("Unauthorized"))
    }
}
