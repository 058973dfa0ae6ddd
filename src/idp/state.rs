// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::extract::FromRef;
use tera::Tera;
use tokio::sync::Mutex;

use super::pages;
use crate::auth::{KeyError, SigningKey, TokenVerifier};
use crate::config::AuthServerConfig;
use crate::storage::{JsonStorage, StorageError, StoragePaths};

/// Why the auth server could not start.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("signing key: {0}")]
    Key(#[from] KeyError),
    #[error("templates: {0}")]
    Templates(#[from] tera::Error),
}

/// Shared state of the auth server.
#[derive(Clone)]
pub struct IdpState {
    pub config: Arc<AuthServerConfig>,
    pub storage: Arc<JsonStorage>,
    pub keys: Arc<SigningKey>,
    /// Verifies JWTs presented to the protected resource
    pub verifier: TokenVerifier,
    pub templates: Arc<Tera>,
    /// Serialises sign-ups so the e-mail uniqueness check cannot race
    pub signup_lock: Arc<Mutex<()>>,
}

impl IdpState {
    /// Initialise storage under the configured data directory and load (or
    /// create) the signing key.
    pub fn new(config: AuthServerConfig) -> Result<Self, StartupError> {
        let mut storage = JsonStorage::new(StoragePaths::new(&config.data_dir));
        storage.initialize()?;

        let keys = Arc::new(SigningKey::load_or_generate(&storage)?);
        let verifier = TokenVerifier::local(
            keys.clone(),
            config.issuer().to_string(),
            config.jwt_audience.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            storage: Arc::new(storage),
            keys,
            verifier,
            templates: Arc::new(pages::templates()?),
            signup_lock: Arc::new(Mutex::new(())),
        })
    }
}

impl FromRef<IdpState> for TokenVerifier {
    fn from_ref(state: &IdpState) -> Self {
        state.verifier.clone()
    }
}
