// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, default values, and the typed configuration
//! of both services. Configuration is read once at startup and never
//! reloaded.
//!
//! ## Auth server
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Bind address | `0.0.0.0` |
//! | `PORT` | Bind port | `3000` |
//! | `PUBLIC_URL` | External base URL; also the JWT issuer | `http://localhost:3000` |
//! | `DATA_DIR` | Root of the JSON store and signing key | `./data` |
//! | `JWT_AUDIENCE` | `aud` of JWTs from `/api/auth/token` | `PUBLIC_URL` |
//! | `JWT_TTL_SECS` | JWT lifetime | `900` |
//! | `SESSION_TTL_SECS` | Browser session lifetime | `604800` |
//! | `ACCESS_TOKEN_TTL_SECS` | OAuth access token lifetime | `3600` |
//! | `TRUSTED_CLIENTS` | JSON array of client registrations | the `test-client-id` demo client |
//! | `COOKIE_SECURE` | Mark session cookies `Secure` | `false` |
//!
//! ## Client app
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Bind address | `0.0.0.0` |
//! | `PORT` | Bind port | `3001` |
//! | `PUBLIC_URL` | External base URL (callback URL is derived from it) | `http://localhost:3001` |
//! | `AUTH_SERVER_URL` | Base URL of the auth server | `http://localhost:3000` |
//! | `OAUTH_PROVIDER_ID` | Provider id in the callback path | `test` |
//! | `OAUTH_CLIENT_ID` | Client id registered at the auth server | `test-client-id` |
//! | `OAUTH_CLIENT_SECRET` | Client secret | `test-client-secret` |
//! | `OAUTH_DISCOVERY_URL` | OIDC discovery document | `{AUTH_SERVER_URL}/api/auth/.well-known/openid-configuration` |
//! | `OAUTH_SCOPES` | Space-separated scopes | `openid profile email` |
//! | `SESSION_TTL_SECS` | Local session lifetime | `604800` |
//!
//! ## Both
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::crypto::constant_time_eq;
use crate::storage::paths::DATA_ROOT;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const PUBLIC_URL_ENV: &str = "PUBLIC_URL";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const JWT_AUDIENCE_ENV: &str = "JWT_AUDIENCE";
pub const JWT_TTL_SECS_ENV: &str = "JWT_TTL_SECS";
pub const SESSION_TTL_SECS_ENV: &str = "SESSION_TTL_SECS";
pub const ACCESS_TOKEN_TTL_SECS_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const TRUSTED_CLIENTS_ENV: &str = "TRUSTED_CLIENTS";
pub const COOKIE_SECURE_ENV: &str = "COOKIE_SECURE";

pub const AUTH_SERVER_URL_ENV: &str = "AUTH_SERVER_URL";
pub const OAUTH_PROVIDER_ID_ENV: &str = "OAUTH_PROVIDER_ID";
pub const OAUTH_CLIENT_ID_ENV: &str = "OAUTH_CLIENT_ID";
pub const OAUTH_CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";
pub const OAUTH_DISCOVERY_URL_ENV: &str = "OAUTH_DISCOVERY_URL";
pub const OAUTH_SCOPES_ENV: &str = "OAUTH_SCOPES";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_AUTH_SERVER_PORT: u16 = 3000;
pub const DEFAULT_CLIENT_APP_PORT: u16 = 3001;
pub const DEFAULT_AUTH_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_CLIENT_APP_URL: &str = "http://localhost:3001";

pub const DEFAULT_JWT_TTL_SECS: i64 = 900;
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Upper bound for any configured lifetime (10 years).
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Lifetime of authorization codes, consent requests, and pending sign-ins.
pub const AUTHORIZATION_TTL_SECS: i64 = 600;
/// Period of the expired-record sweepers.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_PROVIDER_ID: &str = "test";
pub const DEFAULT_CLIENT_ID: &str = "test-client-id";
pub const DEFAULT_CLIENT_SECRET: &str = "test-client-secret";
pub const DEFAULT_SCOPES: &str = "openid profile email";
pub const DISCOVERY_PATH: &str = "/api/auth/.well-known/openid-configuration";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid TRUSTED_CLIENTS: {0}")]
    TrustedClients(#[from] serde_json::Error),
}

/// An OAuth client the auth server accepts. Loaded at startup, immutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrustedClient {
    pub client_id: String,
    pub client_secret: String,
    pub name: String,
    #[serde(rename = "type", default = "default_client_type")]
    pub client_type: String,
    #[serde(rename = "redirectURLs", alias = "redirectUrls")]
    pub redirect_urls: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub skip_consent: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_client_type() -> String {
    "web".to_string()
}

impl TrustedClient {
    /// The client app's registration with the default ports.
    pub fn demo() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: DEFAULT_CLIENT_SECRET.to_string(),
            name: "client".to_string(),
            client_type: default_client_type(),
            redirect_urls: vec![format!(
                "{DEFAULT_CLIENT_APP_URL}/api/auth/oauth2/callback/{DEFAULT_PROVIDER_ID}"
            )],
            disabled: false,
            skip_consent: true,
            metadata: serde_json::json!({ "internal": true }),
        }
    }

    /// Exact string match against the registered redirect URLs.
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_urls.iter().any(|u| u == redirect_uri)
    }

    pub fn verify_secret(&self, secret: &str) -> bool {
        constant_time_eq(self.client_secret.as_bytes(), secret.as_bytes())
    }
}

/// Auth server (identity provider) configuration.
#[derive(Debug, Clone)]
pub struct AuthServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL without trailing slash; used as the issuer
    pub public_url: String,
    pub data_dir: PathBuf,
    pub jwt_audience: String,
    pub jwt_ttl: Duration,
    pub session_ttl: Duration,
    pub access_token_ttl: Duration,
    pub trusted_clients: Vec<TrustedClient>,
    pub cookie_secure: bool,
}

impl AuthServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let public_url = parse_url(&lookup, PUBLIC_URL_ENV, DEFAULT_AUTH_SERVER_URL)?;
        let jwt_audience = non_empty(&lookup, JWT_AUDIENCE_ENV).unwrap_or_else(|| public_url.clone());

        let trusted_clients = match non_empty(&lookup, TRUSTED_CLIENTS_ENV) {
            Some(raw) => serde_json::from_str(&raw)?,
            None => vec![TrustedClient::demo()],
        };

        Ok(Self {
            host: non_empty(&lookup, HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_var(&lookup, PORT_ENV, DEFAULT_AUTH_SERVER_PORT)?,
            public_url,
            data_dir: non_empty(&lookup, DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DATA_ROOT)),
            jwt_audience,
            jwt_ttl: parse_ttl(&lookup, JWT_TTL_SECS_ENV, DEFAULT_JWT_TTL_SECS)?,
            session_ttl: parse_ttl(&lookup, SESSION_TTL_SECS_ENV, DEFAULT_SESSION_TTL_SECS)?,
            access_token_ttl: parse_ttl(
                &lookup,
                ACCESS_TOKEN_TTL_SECS_ENV,
                DEFAULT_ACCESS_TOKEN_TTL_SECS,
            )?,
            trusted_clients,
            cookie_secure: parse_var(&lookup, COOKIE_SECURE_ENV, false)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn issuer(&self) -> &str {
        &self.public_url
    }

    /// Look up an enabled client.
    pub fn client(&self, client_id: &str) -> Option<&TrustedClient> {
        self.trusted_clients
            .iter()
            .find(|c| c.client_id == client_id && !c.disabled)
    }
}

/// Generic OAuth2/OIDC provider registration used by the client app.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthProviderConfig {
    pub provider_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub discovery_url: String,
    pub scopes: Vec<String>,
}

/// Client app (relying party) configuration.
#[derive(Debug, Clone)]
pub struct ClientAppConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
    pub auth_server_url: String,
    pub provider: OAuthProviderConfig,
    pub session_ttl: Duration,
    pub cookie_secure: bool,
}

impl ClientAppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let auth_server_url = parse_url(&lookup, AUTH_SERVER_URL_ENV, DEFAULT_AUTH_SERVER_URL)?;
        let discovery_default = format!("{auth_server_url}{DISCOVERY_PATH}");

        let scopes = non_empty(&lookup, OAUTH_SCOPES_ENV)
            .unwrap_or_else(|| DEFAULT_SCOPES.to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(Self {
            host: non_empty(&lookup, HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_var(&lookup, PORT_ENV, DEFAULT_CLIENT_APP_PORT)?,
            public_url: parse_url(&lookup, PUBLIC_URL_ENV, DEFAULT_CLIENT_APP_URL)?,
            provider: OAuthProviderConfig {
                provider_id: non_empty(&lookup, OAUTH_PROVIDER_ID_ENV)
                    .unwrap_or_else(|| DEFAULT_PROVIDER_ID.to_string()),
                client_id: non_empty(&lookup, OAUTH_CLIENT_ID_ENV)
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                client_secret: non_empty(&lookup, OAUTH_CLIENT_SECRET_ENV)
                    .unwrap_or_else(|| DEFAULT_CLIENT_SECRET.to_string()),
                discovery_url: parse_url(&lookup, OAUTH_DISCOVERY_URL_ENV, &discovery_default)?,
                scopes,
            },
            auth_server_url,
            session_ttl: parse_ttl(&lookup, SESSION_TTL_SECS_ENV, DEFAULT_SESSION_TTL_SECS)?,
            cookie_secure: parse_var(&lookup, COOKIE_SECURE_ENV, false)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Redirect URI registered at the auth server for this provider.
    pub fn callback_url(&self) -> String {
        format!(
            "{}/api/auth/oauth2/callback/{}",
            self.public_url, self.provider.provider_id
        )
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty(lookup, var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn parse_ttl(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default_secs: i64,
) -> Result<Duration, ConfigError> {
    let secs: i64 = parse_var(lookup, var, default_secs)?;
    if secs <= 0 {
        return Err(ConfigError::Invalid {
            var,
            value: secs.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if secs > MAX_TTL_SECS {
        return Err(ConfigError::Invalid {
            var,
            value: secs.to_string(),
            reason: format!("must not exceed {MAX_TTL_SECS} seconds"),
        });
    }
    Duration::try_seconds(secs).ok_or_else(|| ConfigError::Invalid {
        var,
        value: secs.to_string(),
        reason: "out of range".to_string(),
    })
}

/// Parse an absolute http(s) URL and drop any trailing slash.
fn parse_url(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: &str,
) -> Result<String, ConfigError> {
    let raw = non_empty(lookup, var).unwrap_or_else(|| default.to_string());
    let parsed = url::Url::parse(&raw).map_err(|e| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "scheme must be http or https".to_string(),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}
