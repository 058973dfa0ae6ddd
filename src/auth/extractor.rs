// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for bearer tokens.
//!
//! ```rust,ignore
//! async fn secure(VerifiedClaims(claims): VerifiedClaims) -> Json<Claims> {
//!     Json(claims)
//! }
//! ```

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use super::{AuthError, Claims, TokenVerifier};

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The token is the second space-separated segment. A missing header or a
/// missing/empty second segment is [`AuthError::MissingToken`]; any scheme
/// other than `Bearer` is [`AuthError::InvalidAuthHeader`].
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let mut parts = value.split(' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// The raw bearer token of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(&parts.headers).map(|t| BearerToken(t.to_string()))
    }
}

/// Claims of a bearer JWT verified by the state's [`TokenVerifier`].
#[derive(Debug, Clone)]
pub struct VerifiedClaims(pub Claims);

impl<S> FromRequestParts<S> for VerifiedClaims
where
    TokenVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let verifier = TokenVerifier::from_ref(state);
        let claims = verifier.verify(token).await.inspect_err(|e| {
            tracing::debug!(error_code = e.error_code(), "Bearer token rejected");
        })?;
        Ok(VerifiedClaims(claims))
    }
}
