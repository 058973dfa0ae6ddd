// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bridge I/O for the client app: the local session store plus HTTP calls to
//! the auth server's token endpoint and protected resource.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::auth::start_sign_in;
use super::state::RpState;
use super::store::RpSession;
use crate::bridge::{BridgeError, BridgeTransport, SessionInfo};

impl From<RpSession> for SessionInfo {
    fn from(s: RpSession) -> Self {
        Self {
            access_token: s.token,
            subject: s.subject,
            email: s.email,
            name: s.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    token: Option<String>,
}

/// Transport bound to one browser request's session cookie.
pub struct RpTransport {
    state: RpState,
    session_id: Option<String>,
}

impl RpTransport {
    pub fn new(state: RpState, session_id: Option<String>) -> Self {
        Self { state, session_id }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.state.config.auth_server_url)
    }

    async fn get_with_bearer(&self, path: &str, token: &str) -> Result<reqwest::Response, BridgeError> {
        let url = self.endpoint(path);
        let response = self
            .state
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Auth server rejected request");
            return Err(BridgeError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

impl BridgeTransport for RpTransport {
    async fn check_session(&self) -> Result<Option<SessionInfo>, BridgeError> {
        let Some(id) = self.session_id.as_deref() else {
            return Ok(None);
        };
        let session = self.state.store.session(id, Utc::now()).await;
        Ok(session.map(SessionInfo::from))
    }

    async fn fetch_token(&self, access_token: &str) -> Result<Option<String>, BridgeError> {
        let body: TokenBody = self
            .get_with_bearer("/api/auth/token", access_token)
            .await?
            .json()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        debug!(received = body.token.is_some(), "Token endpoint answered");
        Ok(body.token.filter(|t| !t.is_empty()))
    }

    async fn fetch_user_info(&self, jwt: &str) -> Result<Value, BridgeError> {
        self.get_with_bearer("/api/secure", jwt)
            .await?
            .json()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }

    async fn start_sign_in(&self) -> Result<String, BridgeError> {
        start_sign_in(&self.state, None)
            .await
            .map_err(|e| BridgeError::Transport(e.message))
    }

    async fn sign_out(&self) -> Result<(), BridgeError> {
        if let Some(id) = self.session_id.as_deref() {
            self.state.store.remove_session(id).await;
        }
        Ok(())
    }
}
