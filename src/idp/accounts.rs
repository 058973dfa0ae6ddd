// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! E-mail/password accounts: sign-up, sign-in, sign-out, session lookup.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::password::{hash_password_blocking, validate_password, verify_password_blocking};
use super::session::{
    clear_session_cookie, create_browser_session, current_session, end_session, session_cookie,
};
use super::state::IdpState;
use crate::error::ApiError;
use crate::storage::{StorageError, StoredSession, StoredUser, UserRepository};

const MAX_EMAIL_LENGTH: usize = 254;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    /// Query of an interrupted authorize request to resume after sign-in
    #[serde(default, rename = "authorizeQuery")]
    pub authorize_query: Option<String>,
}

/// Public view of an account (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&StoredUser> for UserView {
    fn from(user: &StoredUser) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            email_verified: user.email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub token: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&StoredSession> for SessionView {
    fn from(session: &StoredSession) -> Self {
        Self {
            token: session.token.clone(),
            user_id: session.user_id.clone(),
            client_id: session.client_id.clone(),
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignUpResponse {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignInResponse {
    /// Whether the caller should navigate to `url`
    pub redirect: bool,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub user: UserView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GetSessionResponse {
    pub session: SessionView,
    pub user: UserView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LENGTH
        && !email.chars().any(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'));
    if !valid {
        return Err(ApiError::bad_request("Invalid email"));
    }
    Ok(email)
}

/// Create an account. Used by the JSON API and the sign-up form.
pub async fn register(state: &IdpState, req: &SignUpRequest) -> Result<StoredUser, ApiError> {
    let email = normalize_email(&req.email)?;
    validate_password(&req.password).map_err(ApiError::bad_request)?;

    let password_hash = hash_password_blocking(req.password.clone())
        .await
        .map_err(ApiError::internal)?;

    // Only the uniqueness check and the write are serialized.
    let _guard = state.signup_lock.lock().await;
    let users = UserRepository::new(&state.storage);
    if users.get_by_email(&email).is_ok() {
        return Err(ApiError::unprocessable("User already exists"));
    }

    let now = Utc::now();
    let user = StoredUser {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        name: req.name.trim().to_string(),
        email_verified: false,
        password_hash,
        created_at: now,
        updated_at: now,
    };

    users.create(&user).map_err(|e| match e {
        StorageError::AlreadyExists(_) => ApiError::unprocessable("User already exists"),
        other => other.into(),
    })?;

    info!(user_id = %user.id, "User registered");
    Ok(user)
}

/// Check e-mail and password. Both failure cases share one message.
pub async fn authenticate(
    state: &IdpState,
    email: &str,
    password: &str,
) -> Result<StoredUser, ApiError> {
    let invalid = || ApiError::unauthorized("Invalid email or password");

    let user = UserRepository::new(&state.storage)
        .get_by_email(email)
        .map_err(|_| invalid())?;
    if !verify_password_blocking(password.to_string(), user.password_hash.clone()).await {
        return Err(invalid());
    }
    Ok(user)
}

/// Absolute authorize URL for a resumed authorization request.
///
/// The query is re-encoded so that only well-formed pairs survive.
pub fn resume_authorize_url(state: &IdpState, raw_query: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.as_bytes())
        .into_owned()
        .collect();
    if !pairs.iter().any(|(k, _)| k == "client_id") {
        return None;
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    Some(format!(
        "{}/api/auth/oauth2/authorize?{query}",
        state.config.public_url
    ))
}

/// Register with e-mail and password; the new user is signed in.
#[utoipa::path(
    post,
    path = "/api/auth/sign-up/email",
    tag = "Accounts",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "User created and signed in", body = SignUpResponse),
        (status = 400, description = "Invalid e-mail or password length"),
        (status = 422, description = "User already exists")
    )
)]
pub async fn sign_up_email(
    State(state): State<IdpState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = register(&state, &req).await?;
    let session = create_browser_session(&state, &user.id)?;

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie(&state, &session))]),
        Json(SignUpResponse {
            token: session.token,
            user: UserView::from(&user),
        }),
    ))
}

/// Sign in with e-mail and password.
#[utoipa::path(
    post,
    path = "/api/auth/sign-in/email",
    tag = "Accounts",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 401, description = "Invalid email or password")
    )
)]
pub async fn sign_in_email(
    State(state): State<IdpState>,
    Json(req): Json<SignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &req.email, &req.password).await?;
    let session = create_browser_session(&state, &user.id)?;
    info!(user_id = %user.id, "User signed in");

    let url = req
        .authorize_query
        .as_deref()
        .and_then(|q| resume_authorize_url(&state, q));

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie(&state, &session))]),
        Json(SignInResponse {
            redirect: url.is_some(),
            token: session.token,
            url,
            user: UserView::from(&user),
        }),
    ))
}

/// End the current session.
#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    tag = "Accounts",
    responses((status = 200, description = "Signed out", body = SuccessResponse))
)]
pub async fn sign_out(State(state): State<IdpState>, headers: HeaderMap) -> impl IntoResponse {
    if end_session(&state, &headers) {
        info!("Session ended");
    }
    (
        AppendHeaders([(SET_COOKIE, clear_session_cookie(&state))]),
        Json(SuccessResponse { success: true }),
    )
}

/// Current session and user, or `null`.
#[utoipa::path(
    get,
    path = "/api/auth/get-session",
    tag = "Accounts",
    responses((status = 200, description = "Session, or null when signed out", body = GetSessionResponse))
)]
pub async fn get_session(
    State(state): State<IdpState>,
    headers: HeaderMap,
) -> Json<Option<GetSessionResponse>> {
    Json(current_session(&state, &headers).map(|auth| GetSessionResponse {
        session: SessionView::from(&auth.session),
        user: UserView::from(&auth.user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idp::state::test_support::test_state;
    use axum::http::StatusCode;

    fn signup(email: &str, password: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.into(),
            password: password.into(),
            name: "Alice".into(),
        }
    }

    #[tokio::test]
    async fn register_normalizes_email_and_hashes_password() {
        let (state, _dir) = test_state();
        let user = register(&state, &signup(" Alice@Example.com ", "secret123"))
            .await
            .unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert_ne!(user.password_hash, "secret123");
        assert!(authenticate(&state, "alice@example.com", "secret123").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_registration_is_422() {
        let (state, _dir) = test_state();
        register(&state, &signup("alice@example.com", "secret123"))
            .await
            .unwrap();

        let err = register(&state, &signup("ALICE@example.com", "secret456"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.message, "User already exists");
    }

    #[tokio::test]
    async fn concurrent_sign_ups_create_one_user() {
        let (state, _dir) = test_state();
        let first = signup("carol@example.com", "secret123");
        let second = signup("Carol@example.com", "secret456");

        let (a, b) = tokio::join!(register(&state, &first), register(&state, &second));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let err = a.err().or(b.err()).unwrap();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn invalid_input_is_400() {
        let (state, _dir) = test_state();

        let short = register(&state, &signup("alice@example.com", "short"))
            .await
            .unwrap_err();
        assert_eq!(short.status, StatusCode::BAD_REQUEST);

        let bad_email = register(&state, &signup("not-an-email", "secret123"))
            .await
            .unwrap_err();
        assert_eq!(bad_email.message, "Invalid email");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let (state, _dir) = test_state();
        register(&state, &signup("alice@example.com", "secret123"))
            .await
            .unwrap();

        let wrong = authenticate(&state, "alice@example.com", "nope-nope")
            .await
            .unwrap_err();
        let unknown = authenticate(&state, "bob@example.com", "secret123")
            .await
            .unwrap_err();
        assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.message, unknown.message);
    }

    async fn sign_in_body(
        state: &IdpState,
        authorize_query: Option<&str>,
    ) -> (StatusCode, String, serde_json::Value) {
        let req = SignInRequest {
            email: "alice@example.com".into(),
            password: "secret123".into(),
            authorize_query: authorize_query.map(str::to_string),
        };
        let response = sign_in_email(State(state.clone()), Json(req))
            .await
            .unwrap()
            .into_response();
        let status = response.status();
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, cookie, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn sign_in_sets_cookie_and_returns_token_and_user() {
        let (state, _dir) = test_state();
        let user = register(&state, &signup("alice@example.com", "secret123"))
            .await
            .unwrap();

        let (status, cookie, body) = sign_in_body(&state, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["redirect"], false);
        assert!(body.get("url").is_none());
        assert_eq!(body["user"]["id"], user.id.as_str());
        assert_eq!(body["user"]["email"], "alice@example.com");

        let token = body["token"].as_str().unwrap();
        assert!(cookie.starts_with(&format!("session_token={token};")));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn sign_in_with_authorize_query_returns_continuation_url() {
        let (state, _dir) = test_state();
        register(&state, &signup("alice@example.com", "secret123"))
            .await
            .unwrap();

        let query = "client_id=test-client-id&response_type=code&state=xyz";
        let (status, _, body) = sign_in_body(&state, Some(query)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["redirect"], true);
        assert_eq!(
            body["url"],
            format!("http://localhost:3000/api/auth/oauth2/authorize?{query}")
        );

        // Without a client_id there is nothing to resume.
        let (_, _, body) = sign_in_body(&state, Some("state=xyz")).await;
        assert_eq!(body["redirect"], false);
        assert!(body.get("url").is_none());
    }

    #[tokio::test]
    async fn sign_in_with_wrong_password_is_401() {
        let (state, _dir) = test_state();
        register(&state, &signup("alice@example.com", "secret123"))
            .await
            .unwrap();

        let req = SignInRequest {
            email: "alice@example.com".into(),
            password: "wrong-password".into(),
            authorize_query: None,
        };
        let err = sign_in_email(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn resume_url_requires_client_id_and_reencodes() {
        let (state, _dir) = test_state();

        assert!(resume_authorize_url(&state, "foo=bar").is_none());
        let url = resume_authorize_url(&state, "client_id=test-client-id&state=a%20b").unwrap();
        assert_eq!(
            url,
            "http://localhost:3000/api/auth/oauth2/authorize?client_id=test-client-id&state=a+b"
        );
    }
}
