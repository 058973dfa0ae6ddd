// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! JWT issuance keys and bearer-token verification shared by both services.
//!
//! ## Flow
//!
//! 1. The auth server signs JWTs with its ES256 [`SigningKey`] and publishes
//!    the public key at `/api/auth/jwks`
//! 2. A caller sends `Authorization: Bearer <JWT>`
//! 3. [`TokenVerifier`] looks the key up by `kid` (locally on the auth
//!    server, through [`JwksManager`] elsewhere), then checks signature,
//!    expiry, not-before, issuer, and audience
//! 4. The handler receives typed [`Claims`]
//!
//! Clock skew tolerance is 60 seconds.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod keys;
pub mod verifier;

pub use claims::{Audience, Claims};
pub use error::AuthError;
pub use extractor::{bearer_token, BearerToken, VerifiedClaims};
pub use jwks::JwksManager;
pub use keys::{KeyError, SigningKey};
pub use verifier::{KeySource, TokenVerifier};
