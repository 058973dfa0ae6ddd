// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use tera::Tera;

use super::pages;
use super::provider::OAuthProvider;
use super::store::RpStore;
use crate::config::ClientAppConfig;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state of the client app.
#[derive(Clone)]
pub struct RpState {
    pub config: Arc<ClientAppConfig>,
    pub store: Arc<RpStore>,
    pub provider: Arc<OAuthProvider>,
    /// Client for calls to the auth server (redirects are not followed)
    pub http: reqwest::Client,
    pub templates: Arc<Tera>,
}

impl RpState {
    pub fn new(config: ClientAppConfig) -> Result<Self, tera::Error> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        let provider = OAuthProvider::new(config.provider.clone(), http.clone());

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(RpStore::new()),
            provider: Arc::new(provider),
            http,
            templates: Arc::new(pages::templates()?),
        })
    }
}
