// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer JWT verification.
//!
//! Checks, in order: header decode, key lookup by `kid`, signature, `exp`
//! (60 s leeway), `nbf`, issuer, audience. The result is either the typed
//! [`Claims`] or an [`AuthError`] naming the first check that failed.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

use super::claims::Claims;
use super::error::AuthError;
use super::jwks::JwksManager;
use super::keys::SigningKey;

/// Clock skew tolerance (60 seconds).
pub const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Where verification keys come from.
#[derive(Clone)]
pub enum KeySource {
    /// The auth server's own signing key, in process
    Local(Arc<SigningKey>),
    /// A remote JWKS endpoint
    Remote(JwksManager),
}

/// Verifies bearer JWTs for one issuer and audience.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: KeySource,
    issuer: String,
    audience: String,
}

impl TokenVerifier {
    pub fn new(keys: KeySource, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    pub fn local(key: Arc<SigningKey>, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self::new(KeySource::Local(key), issuer, audience)
    }

    pub fn remote(jwks: JwksManager, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self::new(KeySource::Remote(jwks), issuer, audience)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Verify `token` and return its claims.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
        let (decoding_key, algorithm) = self.key_for(header.kid.as_deref()).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                ErrorKind::InvalidAudience => AuthError::InvalidAudience,
                ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
                _ => AuthError::MalformedToken,
            }
        })?;

        Ok(token_data.claims)
    }

    async fn key_for(&self, kid: Option<&str>) -> Result<(DecodingKey, Algorithm), AuthError> {
        match &self.keys {
            KeySource::Local(key) => match kid {
                Some(kid) if kid != key.kid() => Err(AuthError::NoMatchingKey),
                _ => Ok((key.decoding_key().clone(), key.algorithm())),
            },
            KeySource::Remote(jwks) => match kid {
                Some(kid) => jwks.get_decoding_key(kid).await,
                None => jwks.get_any_decoding_key().await,
            },
        }
    }
}
