// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWTs for signed-in users and the public key set that verifies them.

use axum::{extract::State, Json};
use chrono::Utc;
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::session::Authenticated;
use super::state::IdpState;
use crate::error::ApiError;
use crate::storage::StoredUser;

/// Claims of every JWT the auth server signs (resource JWTs and ID tokens).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuedClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Sign a JWT for `user` addressed to `audience`.
pub fn issue_jwt(
    state: &IdpState,
    user: &StoredUser,
    audience: &str,
    nonce: Option<String>,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = IssuedClaims {
        sub: user.id.clone(),
        iss: state.config.issuer().to_string(),
        aud: audience.to_string(),
        iat: now.timestamp(),
        exp: (now + state.config.jwt_ttl).timestamp(),
        email: user.email.clone(),
        name: user.name.clone(),
        email_verified: user.email_verified,
        nonce,
    };
    state.keys.sign(&claims).map_err(ApiError::internal)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// Compact ES256 JWS
    pub token: String,
}

/// Exchange the current session for a short-lived JWT.
#[utoipa::path(
    get,
    path = "/api/auth/token",
    tag = "JWT",
    responses(
        (status = 200, description = "JWT for the session's user", body = TokenResponse),
        (status = 401, description = "No valid session")
    )
)]
pub async fn get_token(
    State(state): State<IdpState>,
    auth: Authenticated,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = issue_jwt(&state, &auth.user, &state.config.jwt_audience, None)?;
    tracing::debug!(user_id = %auth.user.id, "JWT issued");
    Ok(Json(TokenResponse { token }))
}

/// Public signing keys.
#[utoipa::path(
    get,
    path = "/api/auth/jwks",
    tag = "JWT",
    responses((status = 200, description = "JWK set", body = serde_json::Value))
)]
pub async fn jwks(State(state): State<IdpState>) -> Json<JwkSet> {
    Json(state.keys.jwks())
}
