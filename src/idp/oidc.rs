// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # OpenID Connect Provider
//!
//! The subset of an OIDC provider the client app needs: discovery, the
//! authorization code flow with PKCE, consent, the token endpoint, and
//! userinfo.
//!
//! ## Authorization request checks
//!
//! Client and redirect URI are validated before anything is sent to the
//! redirect URI. Until both are known good, errors are answered with a 400
//! JSON body. Later errors go back to the client as `error` query parameters.

use axum::{
    extract::{Query, RawQuery, State},
    http::{
        header::{AUTHORIZATION, CACHE_CONTROL, PRAGMA, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use base64ct::{Base64, Encoding};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use super::jwt::issue_jwt;
use super::session::{create_session, current_session, Authenticated};
use super::state::IdpState;
use crate::auth::bearer_token;
use crate::config::{TrustedClient, AUTHORIZATION_TTL_SECS};
use crate::crypto::{random_token, verify_pkce, PkceMethod};
use crate::storage::{
    AuthorizationGrant, CodeRepository, ConsentRepository, SessionRepository, StorageError,
    StoredAuthorizationCode, StoredConsent, UserRepository,
};

pub const SUPPORTED_SCOPES: [&str; 4] = ["openid", "profile", "email", "offline_access"];

// =============================================================================
// Errors
// =============================================================================

/// RFC 6749 error body `{"error", "error_description"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthError {
    pub status: StatusCode,
    pub error: &'static str,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthErrorBody {
    pub error: String,
    pub error_description: String,
}

impl OAuthError {
    pub fn new(status: StatusCode, error: &'static str, description: impl Into<String>) -> Self {
        Self {
            status,
            error,
            description: description.into(),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_client", description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_grant", description)
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_token", description)
    }

    pub fn server_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "Internal server error",
        )
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let challenge = match (self.status, self.error) {
            (StatusCode::UNAUTHORIZED, "invalid_client") => Some("Basic realm=\"oauth\""),
            (StatusCode::UNAUTHORIZED, "invalid_token") => Some("Bearer error=\"invalid_token\""),
            _ => None,
        };
        let body = Json(OAuthErrorBody {
            error: self.error.to_string(),
            error_description: self.description,
        });

        let mut response = (self.status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if let Some(challenge) = challenge {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}

/// Redirect to a verified `redirect_uri` with extra query parameters.
fn redirect_to_client(redirect_uri: &str, params: &[(&str, &str)]) -> Result<Redirect, OAuthError> {
    let mut url = url::Url::parse(redirect_uri).map_err(|e| {
        warn!(redirect_uri, error = %e, "Registered redirect URI does not parse");
        OAuthError::server_error()
    })?;
    url.query_pairs_mut().extend_pairs(params);
    Ok(Redirect::to(url.as_str()))
}

fn redirect_error(
    redirect_uri: &str,
    error: &str,
    state: Option<&str>,
) -> Result<Redirect, OAuthError> {
    let mut params = vec![("error", error)];
    if let Some(state) = state {
        params.push(("state", state));
    }
    redirect_to_client(redirect_uri, &params)
}

// =============================================================================
// Discovery
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl OpenIdConfiguration {
    pub fn for_issuer(issuer: &str) -> Self {
        let api = format!("{issuer}/api/auth");
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{api}/oauth2/authorize"),
            token_endpoint: format!("{api}/oauth2/token"),
            userinfo_endpoint: format!("{api}/oauth2/userinfo"),
            jwks_uri: format!("{api}/jwks"),
            scopes_supported: strings(&SUPPORTED_SCOPES),
            response_types_supported: strings(&["code"]),
            grant_types_supported: strings(&["authorization_code"]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: strings(&["ES256"]),
            token_endpoint_auth_methods_supported: strings(&[
                "client_secret_basic",
                "client_secret_post",
            ]),
            code_challenge_methods_supported: strings(&["S256", "plain"]),
            claims_supported: strings(&[
                "sub",
                "iss",
                "aud",
                "exp",
                "iat",
                "nonce",
                "email",
                "email_verified",
                "name",
            ]),
        }
    }
}

/// OIDC discovery document.
#[utoipa::path(
    get,
    path = "/api/auth/.well-known/openid-configuration",
    tag = "OIDC",
    responses((status = 200, description = "Provider metadata", body = OpenIdConfiguration))
)]
pub async fn discovery(State(state): State<IdpState>) -> Json<OpenIdConfiguration> {
    Json(OpenIdConfiguration::for_issuer(state.config.issuer()))
}

// =============================================================================
// Authorization endpoint
// =============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    /// Space-separated scopes
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub nonce: Option<String>,
}

/// Validated authorization request, ready to be granted.
struct AuthorizeRequest<'a> {
    client: &'a TrustedClient,
    redirect_uri: String,
    scopes: Vec<String>,
    state: Option<String>,
    code_challenge: Option<String>,
    code_challenge_method: Option<PkceMethod>,
    nonce: Option<String>,
}

impl AuthorizeRequest<'_> {
    fn into_grant(self, user_id: &str) -> AuthorizationGrant {
        AuthorizationGrant {
            client_id: self.client.client_id.clone(),
            user_id: user_id.to_string(),
            redirect_uri: self.redirect_uri,
            scopes: self.scopes,
            code_challenge: self.code_challenge,
            code_challenge_method: self
                .code_challenge_method
                .map(|m| m.as_str().to_string()),
            nonce: self.nonce,
        }
    }
}

/// Checks that may only fail with a 400 because the redirect URI is not yet
/// trusted.
fn verified_client<'a>(
    state: &'a IdpState,
    params: &AuthorizeParams,
) -> Result<(&'a TrustedClient, String), OAuthError> {
    let client_id = params
        .client_id
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("client_id is required"))?;
    let client = state.config.client(client_id).ok_or_else(|| {
        OAuthError::new(StatusCode::BAD_REQUEST, "invalid_client", "Unknown client")
    })?;

    let redirect_uri = params
        .redirect_uri
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("redirect_uri is required"))?;
    if !client.allows_redirect(redirect_uri) {
        warn!(client_id, redirect_uri, "Unregistered redirect URI");
        return Err(OAuthError::invalid_request("Invalid redirect_uri"));
    }
    Ok((client, redirect_uri.to_string()))
}

/// Remaining checks; the error is an OAuth error code for the redirect.
fn parse_request<'a>(
    client: &'a TrustedClient,
    redirect_uri: String,
    params: &AuthorizeParams,
) -> Result<AuthorizeRequest<'a>, &'static str> {
    if params.response_type.as_deref() != Some("code") {
        return Err("unsupported_response_type");
    }

    let scopes: Vec<String> = params
        .scope
        .as_deref()
        .unwrap_or("openid")
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if scopes.is_empty() || scopes.iter().any(|s| !SUPPORTED_SCOPES.contains(&s.as_str())) {
        return Err("invalid_scope");
    }

    let code_challenge_method = match &params.code_challenge {
        Some(_) => Some(
            PkceMethod::parse(params.code_challenge_method.as_deref())
                .ok_or("invalid_request")?,
        ),
        None => None,
    };

    Ok(AuthorizeRequest {
        client,
        redirect_uri,
        scopes,
        state: params.state.clone(),
        code_challenge: params.code_challenge.clone(),
        code_challenge_method,
        nonce: params.nonce.clone(),
    })
}

/// Store a fresh authorization code for `grant`.
pub fn issue_code(state: &IdpState, grant: AuthorizationGrant) -> Result<String, OAuthError> {
    let now = Utc::now();
    let code = StoredAuthorizationCode {
        code: random_token().map_err(|_| OAuthError::server_error())?,
        grant,
        created_at: now,
        expires_at: now + Duration::seconds(AUTHORIZATION_TTL_SECS),
    };
    CodeRepository::new(&state.storage)
        .create(&code)
        .map_err(|e| {
            warn!(error = %e, "Failed to store authorization code");
            OAuthError::server_error()
        })?;
    Ok(code.code)
}

fn redirect_with_code(
    state: &IdpState,
    grant: AuthorizationGrant,
    client_state: Option<&str>,
) -> Result<Redirect, OAuthError> {
    let redirect_uri = grant.redirect_uri.clone();
    let client_id = grant.client_id.clone();
    let code = issue_code(state, grant)?;
    info!(client_id = %client_id, "Authorization code issued");

    let mut params = vec![("code", code.as_str())];
    if let Some(s) = client_state {
        params.push(("state", s));
    }
    redirect_to_client(&redirect_uri, &params)
}

/// Start the authorization code flow.
#[utoipa::path(
    get,
    path = "/api/auth/oauth2/authorize",
    tag = "OIDC",
    params(AuthorizeParams),
    responses(
        (status = 303, description = "Redirect to login, consent, or the client"),
        (status = 400, description = "Unknown client or unregistered redirect URI", body = OAuthErrorBody)
    )
)]
pub async fn authorize(
    State(state): State<IdpState>,
    headers: HeaderMap,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, OAuthError> {
    let (client, redirect_uri) = verified_client(&state, &params)?;
    let request = match parse_request(client, redirect_uri.clone(), &params) {
        Ok(request) => request,
        Err(code) => return redirect_error(&redirect_uri, code, params.state.as_deref()),
    };

    let Some(auth) = current_session(&state, &headers) else {
        // Re-encode so only well-formed pairs reach the login page.
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(url::form_urlencoded::parse(
                raw_query.unwrap_or_default().as_bytes(),
            ))
            .finish();
        return Ok(Redirect::to(&format!(
            "{}/?{query}",
            state.config.public_url
        )));
    };

    let client_state = request.state.clone();
    let skip_consent = request.client.skip_consent;
    let grant = request.into_grant(&auth.user.id);

    if skip_consent {
        return redirect_with_code(&state, grant, client_state.as_deref());
    }

    let now = Utc::now();
    let consent = StoredConsent {
        consent_code: random_token().map_err(|_| OAuthError::server_error())?,
        grant,
        state: client_state,
        created_at: now,
        expires_at: now + Duration::seconds(AUTHORIZATION_TTL_SECS),
    };
    ConsentRepository::new(&state.storage)
        .create(&consent)
        .map_err(|e| {
            warn!(error = %e, "Failed to store consent request");
            OAuthError::server_error()
        })?;

    Ok(Redirect::to(&format!(
        "{}/consent?consent_code={}",
        state.config.public_url, consent.consent_code
    )))
}

// =============================================================================
// Consent
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConsentForm {
    pub consent_code: String,
    pub accept: bool,
}

/// Look up a live consent request owned by `user_id`.
pub fn pending_consent(
    state: &IdpState,
    consent_code: &str,
    user_id: &str,
) -> Result<StoredConsent, OAuthError> {
    let consent = ConsentRepository::new(&state.storage)
        .get(consent_code)
        .map_err(|_| OAuthError::invalid_request("Invalid consent code"))?;
    if consent.expires_at <= Utc::now() {
        return Err(OAuthError::invalid_request("Consent request expired"));
    }
    if consent.grant.user_id != user_id {
        return Err(OAuthError::new(
            StatusCode::FORBIDDEN,
            "access_denied",
            "Consent request belongs to another user",
        ));
    }
    Ok(consent)
}

/// Accept or deny a pending authorization request.
#[utoipa::path(
    post,
    path = "/api/auth/oauth2/consent",
    tag = "OIDC",
    request_body(content = ConsentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Redirect to the client with a code or access_denied"),
        (status = 400, description = "Unknown or expired consent code", body = OAuthErrorBody),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn consent(
    State(state): State<IdpState>,
    auth: Authenticated,
    Form(form): Form<ConsentForm>,
) -> Result<Redirect, OAuthError> {
    pending_consent(&state, &form.consent_code, &auth.user.id)?;
    let consent = match ConsentRepository::new(&state.storage).take(&form.consent_code) {
        Ok(consent) => consent,
        Err(StorageError::NotFound(_)) => {
            return Err(OAuthError::invalid_request("Invalid consent code"))
        }
        Err(e) => {
            warn!(error = %e, "Failed to consume consent request");
            return Err(OAuthError::server_error());
        }
    };

    if !form.accept {
        info!(client_id = %consent.grant.client_id, user_id = %auth.user.id, "Consent denied");
        return redirect_error(
            &consent.grant.redirect_uri,
            "access_denied",
            consent.state.as_deref(),
        );
    }
    redirect_with_code(&state, consent.grant, consent.state.as_deref())
}

// =============================================================================
// Token endpoint
// =============================================================================

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub scope: String,
}

/// Undo the form-urlencoding applied to Basic credentials (RFC 6749 §2.3.1).
fn form_urldecode(value: &str) -> String {
    let escaped = value.replace('&', "%26").replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}

/// Client credentials from HTTP Basic, falling back to the form body.
fn client_credentials(headers: &HeaderMap, form: &TokenRequest) -> Option<(String, String)> {
    let basic = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| Base64::decode_vec(encoded.trim()).ok())
        .and_then(|raw| String::from_utf8(raw).ok())
        .and_then(|pair| {
            pair.split_once(':')
                .map(|(id, secret)| (form_urldecode(id), form_urldecode(secret)))
        });

    basic.or_else(|| Some((form.client_id.clone()?, form.client_secret.clone()?)))
}

fn authenticate_client<'a>(
    state: &'a IdpState,
    headers: &HeaderMap,
    form: &TokenRequest,
) -> Result<&'a TrustedClient, OAuthError> {
    let (client_id, secret) = client_credentials(headers, form)
        .ok_or_else(|| OAuthError::invalid_client("Client authentication required"))?;
    state
        .config
        .client(&client_id)
        .filter(|c| c.verify_secret(&secret))
        .ok_or_else(|| {
            warn!(client_id = %client_id, "Client authentication failed");
            OAuthError::invalid_client("Invalid client credentials")
        })
}

/// Exchange an authorization code for tokens.
#[utoipa::path(
    post,
    path = "/api/auth/oauth2/token",
    tag = "OIDC",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens issued", body = OAuthTokenResponse),
        (status = 400, description = "invalid_request, invalid_grant, or unsupported_grant_type", body = OAuthErrorBody),
        (status = 401, description = "invalid_client", body = OAuthErrorBody)
    )
)]
pub async fn token(
    State(state): State<IdpState>,
    headers: HeaderMap,
    Form(form): Form<TokenRequest>,
) -> Result<Response, OAuthError> {
    match form.grant_type.as_deref() {
        Some("authorization_code") => {}
        Some(_) => {
            return Err(OAuthError::new(
                StatusCode::BAD_REQUEST,
                "unsupported_grant_type",
                "Only authorization_code is supported",
            ))
        }
        None => return Err(OAuthError::invalid_request("grant_type is required")),
    }

    let client = authenticate_client(&state, &headers, &form)?;
    let code = form
        .code
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_request("code is required"))?;

    let stored = CodeRepository::new(&state.storage)
        .take(code)
        .map_err(|_| OAuthError::invalid_grant("Invalid authorization code"))?;
    let grant = stored.grant;

    if stored.expires_at <= Utc::now() {
        return Err(OAuthError::invalid_grant("Authorization code expired"));
    }
    if grant.client_id != client.client_id {
        return Err(OAuthError::invalid_grant("Code was issued to another client"));
    }
    if form.redirect_uri.as_deref() != Some(grant.redirect_uri.as_str()) {
        return Err(OAuthError::invalid_grant("redirect_uri mismatch"));
    }

    if let Some(challenge) = &grant.code_challenge {
        let verifier = form
            .code_verifier
            .as_deref()
            .ok_or_else(|| OAuthError::invalid_request("code_verifier is required"))?;
        let method = PkceMethod::parse(grant.code_challenge_method.as_deref())
            .ok_or_else(|| OAuthError::invalid_grant("Unsupported code_challenge_method"))?;
        if !verify_pkce(method, verifier, challenge) {
            return Err(OAuthError::invalid_grant("Invalid code_verifier"));
        }
    }

    let user = UserRepository::new(&state.storage)
        .get(&grant.user_id)
        .map_err(|_| OAuthError::invalid_grant("User no longer exists"))?;

    let access = create_session(
        &state,
        &user.id,
        Some(&client.client_id),
        grant.scopes.clone(),
        state.config.access_token_ttl,
    )
    .map_err(|_| OAuthError::server_error())?;

    let id_token = if access.has_scope("openid") {
        Some(
            issue_jwt(&state, &user, &client.client_id, grant.nonce.clone())
                .map_err(|_| OAuthError::server_error())?,
        )
    } else {
        None
    };

    info!(client_id = %client.client_id, user_id = %user.id, "Tokens issued");

    let body = OAuthTokenResponse {
        access_token: access.token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.access_token_ttl.num_seconds(),
        id_token,
        scope: grant.scopes.join(" "),
    };
    Ok((
        [
            (CACHE_CONTROL, HeaderValue::from_static("no-store")),
            (PRAGMA, HeaderValue::from_static("no-cache")),
        ],
        Json(body),
    )
        .into_response())
}

// =============================================================================
// UserInfo
// =============================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Claims about the access token's user, filtered by granted scopes.
#[utoipa::path(
    get,
    path = "/api/auth/oauth2/userinfo",
    tag = "OIDC",
    responses(
        (status = 200, description = "User claims", body = UserInfo),
        (status = 401, description = "Missing or invalid access token", body = OAuthErrorBody)
    )
)]
pub async fn userinfo(
    State(state): State<IdpState>,
    headers: HeaderMap,
) -> Result<Json<UserInfo>, OAuthError> {
    let token = bearer_token(&headers)
        .map_err(|_| OAuthError::invalid_token("Access token required"))?;
    let session = SessionRepository::new(&state.storage)
        .get_active(token, Utc::now())
        .ok()
        .filter(|s| s.client_id.is_some())
        .ok_or_else(|| OAuthError::invalid_token("Invalid access token"))?;
    let user = UserRepository::new(&state.storage)
        .get(&session.user_id)
        .map_err(|_| OAuthError::invalid_token("Invalid access token"))?;

    let email = session.has_scope("email");
    Ok(Json(UserInfo {
        sub: user.id,
        email: email.then_some(user.email),
        email_verified: email.then_some(user.email_verified),
        name: session.has_scope("profile").then_some(user.name),
    }))
}
