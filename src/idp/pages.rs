// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server-rendered pages of the auth server: sign-up, sign-in, sign-out, and
//! the consent screen.

use axum::{
    extract::{Query, RawQuery, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use tera::{Context, Tera};

use super::accounts::{authenticate, register, resume_authorize_url, SignUpRequest, UserView};
use super::oidc::pending_consent;
use super::session::{
    clear_session_cookie, create_browser_session, current_session, end_session, session_cookie,
};
use super::state::IdpState;
use crate::error::ApiError;

const LAYOUT: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{% block title %}Auth Server{% endblock title %}</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 40rem; margin: 2rem auto; }
    form { border: 1px solid #ccc; padding: 1rem; margin-bottom: 1rem; }
    label { display: block; margin: .5rem 0; }
  </style>
</head>
<body>
{% block body %}{% endblock body %}
</body>
</html>
"#;

const INDEX: &str = r#"{% extends "layout.html" %}
{% block body %}
<h1>Auth Server</h1>
{% if user %}
<p>Signed in as <strong>{{ user.email }}</strong>{% if user.name %} ({{ user.name }}){% endif %}</p>
<form method="post" action="/ui/logout">
  <button type="submit">Logout</button>
</form>
{% endif %}
{% if authorize_query %}
<p>Sign in to continue to the application.</p>
{% endif %}
<form method="post" action="/ui/register">
  <h2>Register</h2>
  <label>Email <input type="email" name="email" required></label>
  <label>Password <input type="password" name="password" minlength="8" required></label>
  <label>Name <input type="text" name="name"></label>
  <button type="submit">Register</button>
</form>
<form method="post" action="/ui/login">
  <h2>Login</h2>
  <label>Email <input type="email" name="email" required></label>
  <label>Password <input type="password" name="password" required></label>
  {% if authorize_query %}<input type="hidden" name="authorize_query" value="{{ authorize_query }}">{% endif %}
  <button type="submit">Login</button>
</form>
{% endblock body %}
"#;

const MESSAGE: &str = r#"{% extends "layout.html" %}
{% block title %}{{ title }}{% endblock title %}
{% block body %}
<h1>{{ title }}</h1>
<p>{{ message }}</p>
<p><a href="/">Back</a></p>
{% endblock body %}
"#;

const CONSENT: &str = r#"{% extends "layout.html" %}
{% block title %}Authorize {{ client_name }}{% endblock title %}
{% block body %}
<h1>Authorize {{ client_name }}</h1>
<p>{{ client_name }} is asking to access your account ({{ email }}):</p>
<ul>
{% for scope in scopes %}  <li>{{ scope }}</li>
{% endfor %}</ul>
<form method="post" action="/api/auth/oauth2/consent">
  <input type="hidden" name="consent_code" value="{{ consent_code }}">
  <button type="submit" name="accept" value="true">Allow</button>
  <button type="submit" name="accept" value="false">Deny</button>
</form>
{% endblock body %}
"#;

/// Compile the page templates. `.html` names keep autoescaping on.
pub fn templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("layout.html", LAYOUT),
        ("index.html", INDEX),
        ("message.html", MESSAGE),
        ("consent.html", CONSENT),
    ])?;
    Ok(tera)
}

fn render(state: &IdpState, template: &str, context: &Context) -> Result<Html<String>, ApiError> {
    state
        .templates
        .render(template, context)
        .map(Html)
        .map_err(ApiError::internal)
}

fn message_page(state: &IdpState, status: StatusCode, title: &str, message: &str) -> Response {
    let mut context = Context::new();
    context.insert("title", title);
    context.insert("message", message);
    match render(state, "message.html", &context) {
        Ok(html) => (status, html).into_response(),
        Err(e) => e.into_response(),
    }
}

fn error_page(state: &IdpState, error: ApiError) -> Response {
    message_page(state, error.status, "Error", &error.message)
}

/// Home page with the account forms.
pub async fn index(
    State(state): State<IdpState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Html<String>, ApiError> {
    let user = current_session(&state, &headers).map(|auth| UserView::from(&auth.user));
    // Only an authorize continuation is carried; other queries are ignored.
    let authorize_query = query
        .as_deref()
        .filter(|q| resume_authorize_url(&state, q).is_some());

    let mut context = Context::new();
    context.insert("user", &user);
    context.insert("authorize_query", &authorize_query);
    render(&state, "index.html", &context)
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

pub async fn register_form(State(state): State<IdpState>, Form(form): Form<RegisterForm>) -> Response {
    let req = SignUpRequest {
        email: form.email,
        password: form.password,
        name: form.name,
    };
    let result = match register(&state, &req).await {
        Ok(user) => create_browser_session(&state, &user.id).map(|session| (user, session)),
        Err(e) => Err(e),
    };

    match result {
        Ok((user, session)) => (
            AppendHeaders([(SET_COOKIE, session_cookie(&state, &session))]),
            message_page(
                &state,
                StatusCode::OK,
                "Registration successful",
                &format!("Welcome, {}! You are now signed in.", user.email),
            ),
        )
            .into_response(),
        Err(e) => error_page(&state, e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub authorize_query: Option<String>,
}

pub async fn login_form(State(state): State<IdpState>, Form(form): Form<LoginForm>) -> Response {
    let result = authenticate(&state, &form.email, &form.password)
        .await
        .and_then(|user| create_browser_session(&state, &user.id).map(|s| (user, s)));
    let (user, session) = match result {
        Ok(pair) => pair,
        Err(e) => return error_page(&state, e),
    };
    tracing::info!(user_id = %user.id, "User signed in");

    let cookie = AppendHeaders([(SET_COOKIE, session_cookie(&state, &session))]);
    let resume = form
        .authorize_query
        .as_deref()
        .filter(|q| !q.is_empty())
        .and_then(|q| resume_authorize_url(&state, q));

    match resume {
        Some(url) => (cookie, Redirect::to(&url)).into_response(),
        None => (
            cookie,
            message_page(
                &state,
                StatusCode::OK,
                "Login successful",
                &format!("Signed in as {}.", user.email),
            ),
        )
            .into_response(),
    }
}

pub async fn logout_form(State(state): State<IdpState>, headers: HeaderMap) -> Response {
    end_session(&state, &headers);
    (
        AppendHeaders([(SET_COOKIE, clear_session_cookie(&state))]),
        message_page(&state, StatusCode::OK, "Logged out", "You have been signed out."),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ConsentQuery {
    pub consent_code: String,
}

/// Consent screen for a pending authorization request.
pub async fn consent_page(
    State(state): State<IdpState>,
    headers: HeaderMap,
    Query(query): Query<ConsentQuery>,
) -> Response {
    let Some(auth) = current_session(&state, &headers) else {
        return Redirect::to("/").into_response();
    };
    let consent = match pending_consent(&state, &query.consent_code, &auth.user.id) {
        Ok(consent) => consent,
        Err(e) => return message_page(&state, e.status, "Error", &e.description),
    };
    let client_name = state
        .config
        .client(&consent.grant.client_id)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| consent.grant.client_id.clone());

    let mut context = Context::new();
    context.insert("client_name", &client_name);
    context.insert("email", &auth.user.email);
    context.insert("scopes", &consent.grant.scopes);
    context.insert("consent_code", &consent.consent_code);
    match render(&state, "consent.html", &context) {
        Ok(html) => html.into_response(),
        Err(e) => e.into_response(),
    }
}
