// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The auth server: accounts, sessions, JWTs, the OIDC provider, and the
//! protected resource.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod accounts;
pub mod health;
pub mod jwt;
pub mod oidc;
pub mod pages;
pub mod password;
pub mod secure;
pub mod session;
pub mod state;
pub mod sweep;

pub use state::{IdpState, StartupError};
pub use sweep::ExpiredRecords;

pub fn router(state: IdpState) -> Router {
    let auth_routes = Router::new()
        .route("/sign-up/email", post(accounts::sign_up_email))
        .route("/sign-in/email", post(accounts::sign_in_email))
        .route("/sign-out", post(accounts::sign_out))
        .route("/get-session", get(accounts::get_session))
        .route("/token", get(jwt::get_token))
        .route("/jwks", get(jwt::jwks))
        .route("/.well-known/openid-configuration", get(oidc::discovery))
        .route("/oauth2/authorize", get(oidc::authorize))
        .route("/oauth2/consent", post(oidc::consent))
        .route("/oauth2/token", post(oidc::token))
        .route("/oauth2/userinfo", get(oidc::userinfo));

    let app_routes = Router::new()
        .route("/", get(pages::index))
        .route("/ui/register", post(pages::register_form))
        .route("/ui/login", post(pages::login_form))
        .route("/ui/logout", post(pages::logout_form))
        .route("/consent", get(pages::consent_page))
        .route("/api/secure", get(secure::secure))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api/auth", auth_routes)
        .with_state(state);

    Router::new()
        .merge(app_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        accounts::sign_up_email,
        accounts::sign_in_email,
        accounts::sign_out,
        accounts::get_session,
        jwt::get_token,
        jwt::jwks,
        oidc::discovery,
        oidc::authorize,
        oidc::consent,
        oidc::token,
        oidc::userinfo,
        secure::secure,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            accounts::SignUpRequest,
            accounts::SignInRequest,
            accounts::SignUpResponse,
            accounts::SignInResponse,
            accounts::GetSessionResponse,
            accounts::SessionView,
            accounts::UserView,
            accounts::SuccessResponse,
            jwt::TokenResponse,
            oidc::OpenIdConfiguration,
            oidc::ConsentForm,
            oidc::TokenRequest,
            oidc::OAuthTokenResponse,
            oidc::OAuthErrorBody,
            oidc::UserInfo,
            crate::auth::Claims,
            crate::auth::Audience,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Accounts", description = "E-mail and password accounts"),
        (name = "JWT", description = "Session to JWT exchange and signing keys"),
        (name = "OIDC", description = "OpenID Connect provider"),
        (name = "Protected", description = "Bearer-JWT protected resource"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idp::state::test_support::test_state;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn json(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _dir) = test_state();
        let _ = router(state).into_make_service();
    }

    #[tokio::test]
    async fn openapi_lists_the_protected_resource() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/secure"));
        assert!(doc.paths.paths.contains_key("/api/auth/oauth2/token"));
    }

    #[tokio::test]
    async fn sign_up_then_session_then_jwt_then_secure() {
        let (state, _dir) = test_state();
        let app = router(state);

        let (status, signed_up) = json(
            app.clone(),
            post_json(
                "/api/auth/sign-up/email",
                serde_json::json!({"email": "alice@example.com", "password": "secret123", "name": "Alice"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = signed_up["token"].as_str().unwrap().to_string();

        let (status, session) = json(
            app.clone(),
            Request::get("/api/auth/get-session")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["user"]["email"], "alice@example.com");

        let (status, jwt) = json(
            app.clone(),
            Request::get("/api/auth/token")
                .header(header::COOKIE, format!("session_token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let jwt = jwt["token"].as_str().unwrap().to_string();

        let (status, claims) = json(
            app,
            Request::get("/api/secure")
                .header(header::AUTHORIZATION, format!("Bearer {jwt}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(claims["sub"], signed_up["user"]["id"]);
    }

    #[tokio::test]
    async fn get_session_without_cookie_is_null() {
        let (state, _dir) = test_state();
        let (status, body) = json(
            router(state),
            Request::get("/api/auth/get-session").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn token_without_session_is_401() {
        let (state, _dir) = test_state();
        let (status, _) = json(
            router(state),
            Request::get("/api/auth/token").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_sign_up_is_422() {
        let (state, _dir) = test_state();
        let app = router(state);
        let body = serde_json::json!({"email": "bob@example.com", "password": "secret123", "name": "Bob"});

        let (first, _) = json(app.clone(), post_json("/api/auth/sign-up/email", body.clone())).await;
        let (second, err) = json(app, post_json("/api/auth/sign-up/email", body)).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["error"], "User already exists");
    }
}
