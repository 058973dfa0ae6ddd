// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client app auth API: generic OAuth sign-in, callback, session, sign-out.
//!
//! After a successful callback the app holds a local session in memory,
//! referenced by the `rp_session` cookie. The session keeps the access token
//! the auth server issued, which the bridge later trades for a JWT.
//!
//! The `state` of a pending sign-in is also set in the `rp_oauth_state`
//! cookie, and the callback only accepts a `state` matching that cookie.

use axum::{
    extract::{Path, Query, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::provider::AuthorizationRequest;
use super::state::RpState;
use super::store::{PendingAuthorization, RpSession};
use crate::config::AUTHORIZATION_TTL_SECS;
use crate::cookies::{build_clear_cookie, build_cookie, read_cookie};
use crate::crypto::{constant_time_eq, pkce_s256_challenge, random_token};
use crate::error::ApiError;

pub const RP_SESSION_COOKIE: &str = "rp_session";
pub const RP_STATE_COOKIE: &str = "rp_oauth_state";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInOAuth2Request {
    pub provider_id: String,
    #[serde(default, rename = "callbackURL", alias = "callbackUrl")]
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignInOAuth2Response {
    pub url: String,
    pub redirect: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionBody {
    pub id: String,
    /// Access token issued by the auth server
    pub token: String,
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserBody {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetSessionResponse {
    pub session: SessionBody,
    pub user: UserBody,
}

impl From<RpSession> for GetSessionResponse {
    fn from(s: RpSession) -> Self {
        Self {
            session: SessionBody {
                id: s.id,
                token: s.token,
                subject: s.subject,
                expires_at: s.expires_at,
            },
            user: UserBody {
                email: s.email,
                name: s.name,
            },
        }
    }
}

/// Absolute callback URL on this app. Other origins are refused.
fn resolve_callback_url(state: &RpState, requested: Option<&str>) -> Result<String, ApiError> {
    let base = &state.config.public_url;
    match requested {
        None => Ok(format!("{base}/")),
        Some(path) if path.starts_with('/') && !path.starts_with("//") => {
            Ok(format!("{base}{path}"))
        }
        Some(url) if url == base || url.starts_with(&format!("{base}/")) => Ok(url.to_string()),
        Some(_) => Err(ApiError::bad_request("Invalid callbackURL")),
    }
}

/// Record a pending sign-in and build the provider URL for it.
pub async fn start_sign_in(state: &RpState, callback_url: Option<&str>) -> Result<String, ApiError> {
    let callback_url = resolve_callback_url(state, callback_url)?;
    let oauth_state = random_token().map_err(ApiError::internal)?;
    let code_verifier = random_token().map_err(ApiError::internal)?;
    let nonce = random_token().map_err(ApiError::internal)?;
    let redirect_uri = state.config.callback_url();

    let url = state
        .provider
        .authorization_url(&AuthorizationRequest {
            redirect_uri: &redirect_uri,
            state: &oauth_state,
            code_challenge: &pkce_s256_challenge(&code_verifier),
            nonce: &nonce,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "Cannot build authorization URL");
            ApiError::bad_gateway("OAuth provider unavailable")
        })?;

    state
        .store
        .insert_pending(PendingAuthorization {
            state: oauth_state,
            code_verifier,
            nonce,
            callback_url,
            created_at: Utc::now(),
        })
        .await;
    Ok(url)
}

/// `Set-Cookie` binding the `state` of an authorization URL to the browser.
pub fn state_cookie(state: &RpState, authorization_url: &str) -> Result<String, ApiError> {
    let oauth_state = url::Url::parse(authorization_url)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
        })
        .ok_or_else(|| ApiError::internal("authorization URL has no state"))?;
    Ok(build_cookie(
        RP_STATE_COOKIE,
        &oauth_state,
        chrono::Duration::seconds(AUTHORIZATION_TTL_SECS),
        state.config.cookie_secure,
    ))
}

/// Start a sign-in with the configured provider.
pub async fn sign_in_oauth2(
    State(state): State<RpState>,
    Json(req): Json<SignInOAuth2Request>,
) -> Result<impl IntoResponse, ApiError> {
    if req.provider_id != state.config.provider.provider_id {
        return Err(ApiError::bad_request("Provider not found"));
    }
    let url = start_sign_in(&state, req.callback_url.as_deref()).await?;
    let cookie = state_cookie(&state, &url)?;
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(SignInOAuth2Response {
            url,
            redirect: true,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

fn error_redirect(state: &RpState, error: &str) -> Response {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("error", error)
        .finish();
    Redirect::to(&format!("{}/?{query}", state.config.public_url)).into_response()
}

/// Exchange the code and create the local session.
async fn complete_sign_in(
    state: &RpState,
    pending: &PendingAuthorization,
    code: &str,
) -> Result<RpSession, &'static str> {
    let provider = &state.provider;
    let tokens = provider
        .exchange_code(code, &pending.code_verifier, &state.config.callback_url())
        .await
        .map_err(|e| {
            warn!(error = %e, "Code exchange failed");
            "oauth_code_verification_failed"
        })?;
    let id_token = tokens.require_id_token().map_err(|e| {
        warn!(error = %e, "No ID token to verify");
        "id_token_not_found"
    })?;
    let claims = provider
        .verify_id_token(id_token, &pending.nonce)
        .await
        .map_err(|e| {
            warn!(error = %e, "ID token rejected");
            "invalid_id_token"
        })?;

    let now = Utc::now();
    Ok(RpSession {
        id: random_token().map_err(|_| "internal_error")?,
        token: tokens.access_token,
        subject: claims.sub.clone(),
        email: claims.extra_str("email").map(str::to_string),
        name: claims.extra_str("name").map(str::to_string),
        created_at: now,
        expires_at: now + state.config.session_ttl,
    })
}

/// Appends `code` so the page knows it is returning from the provider.
fn with_code(callback_url: &str, code: &str) -> Option<String> {
    let mut url = url::Url::parse(callback_url).ok()?;
    url.query_pairs_mut().append_pair("code", code);
    Some(url.to_string())
}

/// OAuth redirect target. The state cookie is cleared whatever the outcome.
pub async fn callback(
    State(state): State<RpState>,
    headers: HeaderMap,
    Path(provider_id): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let mut response = finish_callback(&state, &headers, &provider_id, &params).await;
    if let Ok(clear) = build_clear_cookie(RP_STATE_COOKIE, state.config.cookie_secure).parse() {
        response.headers_mut().append(SET_COOKIE, clear);
    }
    response
}

async fn finish_callback(
    state: &RpState,
    headers: &HeaderMap,
    provider_id: &str,
    params: &CallbackParams,
) -> Response {
    if provider_id != state.config.provider.provider_id {
        return error_redirect(state, "provider_not_found");
    }
    if let Some(error) = params.error.as_deref() {
        warn!(
            error,
            description = params.error_description.as_deref().unwrap_or_default(),
            "Provider returned an error"
        );
        if let Some(s) = params.state.as_deref() {
            state.store.take_pending(s, Utc::now()).await;
        }
        return error_redirect(state, error);
    }

    let (Some(code), Some(oauth_state)) = (params.code.as_deref(), params.state.as_deref()) else {
        return error_redirect(state, "invalid_callback_request");
    };
    let bound = read_cookie(headers, RP_STATE_COOKIE)
        .is_some_and(|cookie| constant_time_eq(cookie.as_bytes(), oauth_state.as_bytes()));
    if !bound {
        warn!("Callback state does not match this browser's sign-in");
        return error_redirect(state, "state_mismatch");
    }
    let Some(pending) = state.store.take_pending(oauth_state, Utc::now()).await else {
        return error_redirect(state, "state_not_found");
    };

    let session = match complete_sign_in(state, &pending, code).await {
        Ok(session) => session,
        Err(error) => return error_redirect(state, error),
    };
    let Some(target) = with_code(&pending.callback_url, code) else {
        return error_redirect(state, "invalid_callback_url");
    };

    info!(subject = %session.subject, "Signed in with provider");
    let cookie = build_cookie(
        RP_SESSION_COOKIE,
        &session.id,
        state.config.session_ttl,
        state.config.cookie_secure,
    );
    state.store.insert_session(session).await;

    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to(&target)).into_response()
}

/// Live local session of the request, if any.
pub async fn current_session(state: &RpState, headers: &HeaderMap) -> Option<RpSession> {
    let id = read_cookie(headers, RP_SESSION_COOKIE)?;
    state.store.session(id, Utc::now()).await
}

/// Remove the request's session. Returns the `Set-Cookie` value clearing it.
pub async fn end_session(state: &RpState, headers: &HeaderMap) -> String {
    if let Some(id) = read_cookie(headers, RP_SESSION_COOKIE) {
        if state.store.remove_session(id).await.is_some() {
            info!("Local session ended");
        }
    }
    build_clear_cookie(RP_SESSION_COOKIE, state.config.cookie_secure)
}

pub async fn get_session(
    State(state): State<RpState>,
    headers: HeaderMap,
) -> Json<Option<GetSessionResponse>> {
    Json(current_session(&state, &headers).await.map(Into::into))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub async fn sign_out(State(state): State<RpState>, headers: HeaderMap) -> impl IntoResponse {
    let cookie = end_session(&state, &headers).await;
    (
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(SuccessResponse { success: true }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idp::state::test_support::serve_idp;
    use crate::rp::state::test_support::rp_state;
    use axum::http::{header::LOCATION, HeaderValue, StatusCode};

    fn location(response: &Response) -> String {
        response.headers()[LOCATION].to_str().unwrap().to_string()
    }

    #[test]
    fn callback_url_stays_on_this_origin() {
        let state = rp_state("http://127.0.0.1:9");

        assert_eq!(
            resolve_callback_url(&state, None).unwrap(),
            "http://localhost:3001/"
        );
        assert_eq!(
            resolve_callback_url(&state, Some("/dashboard")).unwrap(),
            "http://localhost:3001/dashboard"
        );
        assert!(resolve_callback_url(&state, Some("//evil.example")).is_err());
        assert!(resolve_callback_url(&state, Some("https://evil.example/")).is_err());
    }

    #[test]
    fn code_is_appended_to_callback() {
        assert_eq!(
            with_code("http://localhost:3001/", "abc").as_deref(),
            Some("http://localhost:3001/?code=abc")
        );
    }

    #[tokio::test]
    async fn provider_error_is_forwarded_to_the_page() {
        let state = rp_state("http://127.0.0.1:9");
        let response = callback(
            State(state),
            HeaderMap::new(),
            Path("test".into()),
            Query(CallbackParams {
                error: Some("access_denied".into()),
                ..Default::default()
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "http://localhost:3001/?error=access_denied");
    }

    fn state_cookie_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&format!("rp_oauth_state={value}")).unwrap(),
        );
        headers
    }

    fn code_and_state(oauth_state: &str) -> Query<CallbackParams> {
        Query(CallbackParams {
            code: Some("c".into()),
            state: Some(oauth_state.into()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn unknown_state_is_rejected() {
        let state = rp_state("http://127.0.0.1:9");
        let response = callback(
            State(state),
            state_cookie_headers("never-issued"),
            Path("test".into()),
            code_and_state("never-issued"),
        )
        .await;

        assert_eq!(location(&response), "http://localhost:3001/?error=state_not_found");
    }

    #[tokio::test]
    async fn callback_state_must_match_browser_cookie() {
        let state = rp_state("http://127.0.0.1:9");
        let now = Utc::now();
        state
            .store
            .insert_pending(PendingAuthorization {
                state: "issued".into(),
                code_verifier: "v".into(),
                nonce: "n".into(),
                callback_url: "http://localhost:3001/".into(),
                created_at: now,
            })
            .await;

        for headers in [HeaderMap::new(), state_cookie_headers("someone-else")] {
            let response = callback(
                State(state.clone()),
                headers,
                Path("test".into()),
                code_and_state("issued"),
            )
            .await;
            assert_eq!(location(&response), "http://localhost:3001/?error=state_mismatch");

            let cleared: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
            assert!(cleared
                .iter()
                .any(|c| c.to_str().unwrap().starts_with("rp_oauth_state=;")));
        }

        // A mismatch does not burn the pending sign-in.
        assert!(state.store.take_pending("issued", now).await.is_some());
    }

    #[tokio::test]
    async fn sign_in_binds_state_to_browser() {
        let (_idp, idp_url, _dir) = serve_idp().await;
        let state = rp_state(&idp_url);

        let response = sign_in_oauth2(
            State(state),
            Json(SignInOAuth2Request {
                provider_id: "test".into(),
                callback_url: None,
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: SignInOAuth2Response = serde_json::from_slice(&body).unwrap();
        let oauth_state = url::Url::parse(&body.url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert!(body.redirect);
        assert!(cookie.starts_with(&format!("rp_oauth_state={oauth_state};")));
        assert!(cookie.contains("Max-Age=600"));
    }

    #[tokio::test]
    async fn unknown_provider_cannot_start_sign_in() {
        let state = rp_state("http://127.0.0.1:9");
        let err = sign_in_oauth2(
            State(state),
            Json(SignInOAuth2Request {
                provider_id: "other".into(),
                callback_url: None,
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sign_out_drops_session_and_clears_cookie() {
        let state = rp_state("http://127.0.0.1:9");
        let now = Utc::now();
        state
            .store
            .insert_session(RpSession {
                id: "sid".into(),
                token: "access".into(),
                subject: "user-1".into(),
                email: None,
                name: None,
                created_at: now,
                expires_at: now + chrono::Duration::hours(1),
            })
            .await;

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("rp_session=sid"),
        );
        assert!(current_session(&state, &headers).await.is_some());

        let response = sign_out(State(state.clone()), headers.clone())
            .await
            .into_response();
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
        assert!(current_session(&state, &headers).await.is_none());
    }
}
