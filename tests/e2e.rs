// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Both services on ephemeral ports, driven through the full sign-in flow.

use oidc_demo::config::{AuthServerConfig, ClientAppConfig};
use oidc_demo::idp::{self, IdpState};
use oidc_demo::rp::{self, RpState};
use reqwest::{header, StatusCode};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

struct Deployment {
    idp_url: String,
    rp_url: String,
    http: reqwest::Client,
    _data_dir: TempDir,
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn deploy() -> Deployment {
    let data_dir = TempDir::new().unwrap();
    let (idp_listener, idp_url) = bind().await;
    let (rp_listener, rp_url) = bind().await;

    let clients = json!([{
        "clientId": "test-client-id",
        "clientSecret": "test-client-secret",
        "name": "client",
        "type": "web",
        "redirectURLs": [format!("{rp_url}/api/auth/oauth2/callback/test")],
        "skipConsent": true,
    }])
    .to_string();
    let data_path = data_dir.path().to_string_lossy().to_string();
    let idp_config = AuthServerConfig::from_lookup(|key: &str| match key {
        "DATA_DIR" => Some(data_path.clone()),
        "PUBLIC_URL" => Some(idp_url.clone()),
        "TRUSTED_CLIENTS" => Some(clients.clone()),
        _ => None,
    })
    .unwrap();
    let rp_config = ClientAppConfig::from_lookup(|key: &str| match key {
        "PUBLIC_URL" => Some(rp_url.clone()),
        "AUTH_SERVER_URL" => Some(idp_url.clone()),
        _ => None,
    })
    .unwrap();

    let idp_app = idp::router(IdpState::new(idp_config).unwrap());
    let rp_app = rp::router(RpState::new(rp_config).unwrap());
    tokio::spawn(async move { axum::serve(idp_listener, idp_app).await.ok() });
    tokio::spawn(async move { axum::serve(rp_listener, rp_app).await.ok() });

    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    Deployment {
        idp_url,
        rp_url,
        http,
        _data_dir: data_dir,
    }
}

fn location(response: &reqwest::Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

/// `name=value` of the first `Set-Cookie` header.
fn cookie_pair(response: &reqwest::Response) -> String {
    let value = response.headers()[header::SET_COOKIE].to_str().unwrap();
    value.split(';').next().unwrap().to_string()
}

impl Deployment {
    async fn register(&self, email: &str, password: &str, name: &str) -> Value {
        let response = self
            .http
            .post(format!("{}/api/auth/sign-up/email", self.idp_url))
            .json(&json!({ "email": email, "password": password, "name": name }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }

    /// Sign in on the auth server; returns its session token.
    async fn sign_in_email(&self, email: &str, password: &str) -> String {
        let response = self
            .http
            .post(format!("{}/api/auth/sign-in/email", self.idp_url))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = cookie_pair(&response);
        let body: Value = response.json().await.unwrap();

        assert_eq!(body["user"]["email"], email);
        assert_eq!(body["redirect"], false);
        let token = body["token"].as_str().unwrap().to_string();
        assert_eq!(cookie, format!("session_token={token}"));
        token
    }

    /// Run the OAuth round trip; returns the client app's session cookie.
    async fn sign_in_via_client(&self, idp_session: &str) -> String {
        let started = self
            .http
            .post(format!("{}/api/auth/sign-in/oauth2", self.rp_url))
            .json(&json!({ "providerId": "test" }))
            .send()
            .await
            .unwrap();
        let state_cookie = cookie_pair(&started);
        assert!(state_cookie.starts_with("rp_oauth_state="));
        let start: Value = started.json().await.unwrap();
        assert_eq!(start["redirect"], true);
        let authorize_url = start["url"].as_str().unwrap();

        let authorized = self
            .http
            .get(authorize_url)
            .header(header::COOKIE, format!("session_token={idp_session}"))
            .send()
            .await
            .unwrap();
        assert!(authorized.status().is_redirection());
        let callback = location(&authorized);
        assert!(callback.starts_with(&format!("{}/api/auth/oauth2/callback/test?", self.rp_url)));

        let landed = self
            .http
            .get(&callback)
            .header(header::COOKIE, &state_cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(landed.status(), StatusCode::SEE_OTHER);
        assert!(location(&landed).starts_with(&format!("{}/?code=", self.rp_url)));
        cookie_pair(&landed)
    }
}

#[tokio::test]
async fn sign_in_token_and_protected_resource() {
    let d = deploy().await;

    let signed_up = d.register("alice@example.com", "secret123", "Alice").await;
    let user_id = signed_up["user"]["id"].as_str().unwrap().to_string();
    let idp_session = d.sign_in_email("alice@example.com", "secret123").await;
    assert_ne!(idp_session, signed_up["token"].as_str().unwrap());

    let rp_cookie = d.sign_in_via_client(&idp_session).await;
    assert!(rp_cookie.starts_with("rp_session="));

    let session: Value = d
        .http
        .get(format!("{}/api/auth/get-session", d.rp_url))
        .header(header::COOKIE, &rp_cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["session"]["subject"], user_id.as_str());
    assert_eq!(session["user"]["email"], "alice@example.com");
    let access_token = session["session"]["token"].as_str().unwrap();

    let jwt: Value = d
        .http
        .get(format!("{}/api/auth/token", d.idp_url))
        .bearer_auth(access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let jwt = jwt["token"].as_str().unwrap();

    let secure = d
        .http
        .get(format!("{}/api/secure", d.idp_url))
        .bearer_auth(jwt)
        .send()
        .await
        .unwrap();
    assert_eq!(secure.status(), StatusCode::OK);
    let claims: Value = secure.json().await.unwrap();
    assert_eq!(claims["sub"], user_id.as_str());
    assert_eq!(claims["iss"], d.idp_url.as_str());
    assert_eq!(claims["email"], "alice@example.com");

    let page = d
        .http
        .get(format!("{}/?code=done", d.rp_url))
        .header(header::COOKIE, &rp_cookie)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("state: user_info_ready"));
    assert!(page.contains(&user_id));
    assert!(page.contains("history.replaceState"));
}

#[tokio::test]
async fn protected_resource_rejects_bad_tokens() {
    let d = deploy().await;
    let secure = format!("{}/api/secure", d.idp_url);

    let missing = d.http.get(&secure).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Token is required" }));

    let garbage = d.http.get(&secure).bearer_auth("garbage").send().await.unwrap();
    assert_ne!(garbage.status(), StatusCode::OK);
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);

    // Only Bearer is accepted.
    let wrong_scheme = d
        .http
        .get(&secure)
        .header(header::AUTHORIZATION, "Basic Zm9vOmJhcg==")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_scheme.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_out_ends_client_session() {
    let d = deploy().await;
    d.register("bob@example.com", "hunter2hunter2", "Bob").await;
    let idp_session = d.sign_in_email("bob@example.com", "hunter2hunter2").await;
    let rp_cookie = d.sign_in_via_client(&idp_session).await;

    let signed_out = d
        .http
        .post(format!("{}/sign-out", d.rp_url))
        .header(header::COOKIE, &rp_cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(signed_out.status(), StatusCode::SEE_OTHER);
    assert!(cookie_pair(&signed_out).starts_with("rp_session="));

    let session: Value = d
        .http
        .get(format!("{}/api/auth/get-session", d.rp_url))
        .header(header::COOKIE, &rp_cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(session.is_null());

    let page = d
        .http
        .get(format!("{}/", d.rp_url))
        .header(header::COOKIE, &rp_cookie)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("state: unauthenticated"));
}

#[tokio::test]
async fn unregistered_redirect_is_refused_without_redirecting() {
    let d = deploy().await;
    let response = d
        .http
        .get(format!(
            "{}/api/auth/oauth2/authorize?client_id=test-client-id&response_type=code&redirect_uri=https%3A%2F%2Fevil.example%2Fcb",
            d.idp_url
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
}
