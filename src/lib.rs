// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! OIDC Demo - Identity Provider + Relying Party
//!
//! Two Axum services sharing one crate:
//!
//! - `auth-server` ([`idp`]) - accounts, sessions, an OpenID Connect provider,
//!   a JWT endpoint, and the bearer-protected resource `/api/secure`
//! - `client-app` ([`rp`]) - signs users in against the auth server and runs
//!   the session/token [`bridge`] to show what the resource returns
//!
//! ## Modules
//!
//! - `auth` - JWT signing keys, JWKS, and bearer-token verification
//! - `bridge` - state machine driving the client app page
//! - `storage` - JSON file store of the auth server
//! - `sweeper` - background removal of expired records

pub mod auth;
pub mod bridge;
pub mod config;
pub mod cookies;
pub mod crypto;
pub mod error;
pub mod idp;
pub mod logging;
pub mod rp;
pub mod shutdown;
pub mod storage;
pub mod sweeper;
