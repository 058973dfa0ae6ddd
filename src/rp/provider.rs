// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Generic OAuth2/OIDC Provider
//!
//! Client side of the authorization code flow against any provider that
//! publishes a discovery document.
//!
//! - Discovery is fetched on first use and cached for the process lifetime
//! - ID tokens are verified against the provider's JWKS (issuer from
//!   discovery, audience = client id) and must echo the sign-in's nonce

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AuthError, Claims, JwksManager, TokenVerifier};
use crate::config::OAuthProviderConfig;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("invalid {field} in provider metadata: {value:?}")]
    Metadata { field: &'static str, value: String },
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("token response has no id_token")]
    MissingIdToken,
    #[error("ID token rejected: {0}")]
    IdToken(#[from] AuthError),
    #[error("ID token nonce does not match the sign-in request")]
    NonceMismatch,
}

/// Fields of the discovery document the client uses.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenSet {
    /// The ID token, required for an OpenID sign-in.
    pub fn require_id_token(&self) -> Result<&str, ProviderError> {
        self.id_token.as_deref().ok_or(ProviderError::MissingIdToken)
    }
}

/// Parameters of one authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub code_challenge: &'a str,
    pub nonce: &'a str,
}

struct Discovered {
    metadata: ProviderMetadata,
    verifier: TokenVerifier,
}

pub struct OAuthProvider {
    config: OAuthProviderConfig,
    http: reqwest::Client,
    discovered: RwLock<Option<Arc<Discovered>>>,
}

impl std::fmt::Debug for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProvider")
            .field("provider_id", &self.config.provider_id)
            .field("client_id", &self.config.client_id)
            .finish()
    }
}

impl OAuthProvider {
    pub fn new(config: OAuthProviderConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            discovered: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &OAuthProviderConfig {
        &self.config
    }

    async fn discovered(&self) -> Result<Arc<Discovered>, ProviderError> {
        if let Some(d) = self.discovered.read().await.as_ref() {
            return Ok(d.clone());
        }

        let metadata = self.fetch_metadata().await?;
        let jwks = JwksManager::with_client(metadata.jwks_uri.clone(), self.http.clone());
        let verifier = TokenVerifier::remote(jwks, metadata.issuer.clone(), self.config.client_id.clone());
        let discovered = Arc::new(Discovered { metadata, verifier });

        *self.discovered.write().await = Some(discovered.clone());
        debug!(provider_id = %self.config.provider_id, "Provider discovered");
        Ok(discovered)
    }

    async fn fetch_metadata(&self) -> Result<ProviderMetadata, ProviderError> {
        let response = self
            .http
            .get(&self.config.discovery_url)
            .send()
            .await
            .map_err(|e| ProviderError::Discovery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Discovery(format!(
                "HTTP {} from {}",
                response.status(),
                self.config.discovery_url
            )));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| ProviderError::Discovery(e.to_string()))?;

        for (field, value) in [
            ("authorization_endpoint", &metadata.authorization_endpoint),
            ("token_endpoint", &metadata.token_endpoint),
            ("jwks_uri", &metadata.jwks_uri),
        ] {
            if Url::parse(value).is_err() {
                return Err(ProviderError::Metadata {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(metadata)
    }

    /// Provider metadata, fetching discovery if needed.
    pub async fn metadata(&self) -> Result<ProviderMetadata, ProviderError> {
        Ok(self.discovered().await?.metadata.clone())
    }

    /// URL to send the browser to.
    pub async fn authorization_url(
        &self,
        request: &AuthorizationRequest<'_>,
    ) -> Result<String, ProviderError> {
        let discovered = self.discovered().await?;
        build_auth_url(
            &discovered.metadata.authorization_endpoint,
            &self.config.client_id,
            &self.config.scopes.join(" "),
            request,
        )
    }

    /// Exchange an authorization code (client_secret_basic).
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, ProviderError> {
        let discovered = self.discovered().await?;
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(&discovered.metadata.token_endpoint)
            .basic_auth(
                form_urlencode(&self.config.client_id),
                Some(form_urlencode(&self.config.client_secret)),
            )
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Token request rejected");
            return Err(ProviderError::Exchange(format!("HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))
    }

    /// Verify an ID token and its nonce.
    pub async fn verify_id_token(
        &self,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<Claims, ProviderError> {
        let discovered = self.discovered().await?;
        let claims = discovered.verifier.verify(id_token).await?;
        if claims.extra_str("nonce") != Some(expected_nonce) {
            return Err(ProviderError::NonceMismatch);
        }
        Ok(claims)
    }
}

/// Basic credentials are form-urlencoded before base64 (RFC 6749 §2.3.1).
fn form_urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Authorization URL with PKCE (S256), state, and nonce. Parameters are
/// form-encoded into the endpoint's existing query.
pub fn build_auth_url(
    authorization_endpoint: &str,
    client_id: &str,
    scopes: &str,
    request: &AuthorizationRequest<'_>,
) -> Result<String, ProviderError> {
    let mut url = Url::parse(authorization_endpoint).map_err(|_| ProviderError::Metadata {
        field: "authorization_endpoint",
        value: authorization_endpoint.to_string(),
    })?;

    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", request.redirect_uri)
        .append_pair("scope", scopes)
        .append_pair("state", request.state)
        .append_pair("code_challenge", request.code_challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("nonce", request.nonce);

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idp::jwt::issue_jwt;
    use crate::idp::state::test_support::serve_idp;
    use crate::storage::StoredUser;

    fn request() -> AuthorizationRequest<'static> {
        AuthorizationRequest {
            redirect_uri: "http://localhost:3001/api/auth/oauth2/callback/test",
            state: "st",
            code_challenge: "challenge",
            nonce: "n-1",
        }
    }

    fn provider_for(discovery_url: String) -> OAuthProvider {
        OAuthProvider::new(
            OAuthProviderConfig {
                provider_id: "test".into(),
                client_id: "test-client-id".into(),
                client_secret: "test-client-secret".into(),
                discovery_url,
                scopes: vec!["openid".into(), "profile".into(), "email".into()],
            },
            reqwest::Client::new(),
        )
    }

    #[test]
    fn auth_url_encodes_all_parameters() {
        let url = build_auth_url(
            "http://localhost:3000/api/auth/oauth2/authorize",
            "test-client-id",
            "openid profile email",
            &request(),
        )
        .unwrap();

        assert!(!url.contains(' '));
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["scope"], "openid profile email");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["nonce"], "n-1");
        assert_eq!(
            pairs["redirect_uri"],
            "http://localhost:3001/api/auth/oauth2/callback/test"
        );
    }

    #[test]
    fn basic_credentials_are_form_urlencoded() {
        assert_eq!(form_urlencode("test-client-id"), "test-client-id");
        assert_eq!(form_urlencode("p@ss:w+ord x"), "p%40ss%3Aw%2Bord+x");
    }

    #[test]
    fn token_set_without_id_token_is_an_error() {
        let tokens: TokenSet =
            serde_json::from_str(r#"{"access_token":"a","token_type":"Bearer"}"#).unwrap();
        assert!(matches!(
            tokens.require_id_token(),
            Err(ProviderError::MissingIdToken)
        ));

        let tokens: TokenSet =
            serde_json::from_str(r#"{"access_token":"a","id_token":"jwt"}"#).unwrap();
        assert_eq!(tokens.require_id_token().unwrap(), "jwt");
    }

    #[test]
    fn auth_url_rejects_relative_endpoint() {
        assert!(matches!(
            build_auth_url("/authorize", "c", "openid", &request()),
            Err(ProviderError::Metadata { .. })
        ));
    }

    #[tokio::test]
    async fn discovery_failure_is_reported() {
        let provider = provider_for("http://127.0.0.1:9/nothing".into());
        assert!(matches!(
            provider.metadata().await,
            Err(ProviderError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn id_token_verified_against_live_jwks() {
        let (idp, base_url, _dir) = serve_idp().await;
        let provider = provider_for(format!(
            "{base_url}/api/auth/.well-known/openid-configuration"
        ));

        let metadata = provider.metadata().await.unwrap();
        assert_eq!(metadata.issuer, base_url);

        let user = StoredUser {
            id: "user-1".into(),
            email: "alice@example.com".into(),
            name: "Alice".into(),
            email_verified: false,
            password_hash: "x".into(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let id_token = issue_jwt(&idp, &user, "test-client-id", Some("n-1".into())).unwrap();

        let claims = provider.verify_id_token(&id_token, "n-1").await.unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(matches!(
            provider.verify_id_token(&id_token, "other").await,
            Err(ProviderError::NonceMismatch)
        ));

        let resource_jwt = issue_jwt(&idp, &user, &idp.config.jwt_audience, Some("n-1".into())).unwrap();
        assert!(matches!(
            provider.verify_id_token(&resource_jwt, "n-1").await,
            Err(ProviderError::IdToken(AuthError::InvalidAudience))
        ));
    }
}
