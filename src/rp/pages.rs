// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The client app's single page, rendered from the bridge's final state.

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use super::auth::{current_session, end_session, state_cookie, RP_SESSION_COOKIE};
use super::state::RpState;
use super::transport::RpTransport;
use crate::bridge::{Bridge, BridgeRunner, BridgeState, Event, PageEffects};
use crate::cookies::read_cookie;
use crate::error::ApiError;

const LAYOUT: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Client App</title>
  <style>
    body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; }
    pre { background: #f4f4f4; padding: 1rem; overflow-x: auto; }
    .notice { color: #a00; }
  </style>
</head>
<body>
{% block body %}{% endblock body %}
</body>
</html>
"#;

const INDEX: &str = r#"{% extends "layout.html" %}
{% block body %}
<h1>Client App</h1>
{% if notice %}<p class="notice">{{ notice }}</p>{% endif %}
{% if user %}
<p>Signed in as <strong>{% if user.name %}{{ user.name }}{% else %}{{ user.subject }}{% endif %}</strong>{% if user.email %} ({{ user.email }}){% endif %}</p>
<form method="post" action="/sign-out">
  <button type="submit">Sign out</button>
</form>
{% if error %}<p class="notice">{{ error }}</p>{% endif %}
{% if jwt %}
<h2>JWT</h2>
<pre>{{ jwt }}</pre>
{% endif %}
{% if claims %}
<h2>Response from /api/secure</h2>
<pre>{{ claims }}</pre>
{% endif %}
{% else %}
{% if error %}<p class="notice">{{ error }}</p>{% endif %}
<form method="post" action="/sign-in">
  <button type="submit">Sign in with auth server</button>
</form>
{% endif %}
<p><small>state: {{ state }}</small></p>
{% if strip_query %}<script>history.replaceState(null, "", location.pathname);</script>{% endif %}
{% endblock body %}
"#;

pub fn templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![("layout.html", LAYOUT), ("index.html", INDEX)])?;
    Ok(tera)
}

#[derive(Debug, Serialize)]
struct UserView<'a> {
    subject: &'a str,
    email: Option<&'a str>,
    name: Option<&'a str>,
}

fn render(state: &RpState, bridge: &Bridge, page: &PageEffects) -> Result<Html<String>, ApiError> {
    let user = bridge.state.session().map(|s| UserView {
        subject: &s.subject,
        email: s.email.as_deref(),
        name: s.name.as_deref(),
    });
    let (jwt, claims) = match &bridge.state {
        BridgeState::TokenReady { jwt, .. } | BridgeState::FetchingUserInfo { jwt, .. } => {
            (Some(jwt.as_str()), None)
        }
        BridgeState::UserInfoReady { jwt, claims, .. } => (
            Some(jwt.as_str()),
            Some(serde_json::to_string_pretty(claims).map_err(ApiError::internal)?),
        ),
        _ => (None, None),
    };

    let mut context = Context::new();
    context.insert("state", bridge.state.name());
    context.insert("notice", &bridge.notice);
    context.insert("error", &bridge.state.error());
    context.insert("user", &user);
    context.insert("jwt", &jwt);
    context.insert("claims", &claims);
    context.insert("strip_query", &page.strip_query);

    state
        .templates
        .render("index.html", &context)
        .map(Html)
        .map_err(ApiError::internal)
}

fn transport(state: &RpState, headers: &HeaderMap) -> RpTransport {
    let session_id = read_cookie(headers, RP_SESSION_COOKIE).map(str::to_string);
    RpTransport::new(state.clone(), session_id)
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Check the session and, when signed in, walk the token and resource chain.
pub async fn index(
    State(state): State<RpState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ApiError> {
    let mut runner = BridgeRunner::new(transport(&state, &headers));
    runner
        .send(Event::PageLoaded {
            returned: query.code.is_some() || query.error.is_some(),
            error: query.error,
        })
        .await;
    let (bridge, page) = runner.into_parts();
    render(&state, &bridge, &page)
}

/// Sign-in button: redirect to the auth server or show why not.
pub async fn sign_in(State(state): State<RpState>, headers: HeaderMap) -> Response {
    let mut runner = BridgeRunner::new(transport(&state, &headers));
    runner.send(Event::SignInRequested).await;
    let (bridge, page) = runner.into_parts();

    if let Some(url) = page.redirect {
        return match state_cookie(&state, &url) {
            Ok(cookie) => (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to(&url)).into_response(),
            Err(e) => e.into_response(),
        };
    }
    match render(&state, &bridge, &page) {
        Ok(html) => html.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Sign-out button.
pub async fn sign_out(State(state): State<RpState>, headers: HeaderMap) -> Response {
    if let Some(session) = current_session(&state, &headers).await {
        let bridge = Bridge {
            state: BridgeState::Authenticated {
                session: session.into(),
            },
            notice: None,
        };
        let mut runner = BridgeRunner::with_bridge(transport(&state, &headers), bridge);
        runner.send(Event::SignOutRequested).await;
    }
    let cookie = end_session(&state, &headers).await;
    (AppendHeaders([(SET_COOKIE, cookie)]), Redirect::to("/")).into_response()
}
