// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The client app: signs users in against the auth server and shows what
//! the protected resource returns for them.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod health;
pub mod pages;
pub mod provider;
pub mod state;
pub mod store;
pub mod transport;

pub use state::RpState;
pub use store::StoreSweep;

pub fn router(state: RpState) -> Router {
    let auth_routes = Router::new()
        .route("/sign-in/oauth2", post(auth::sign_in_oauth2))
        .route("/oauth2/callback/{provider_id}", get(auth::callback))
        .route("/get-session", get(auth::get_session))
        .route("/sign-out", post(auth::sign_out));

    Router::new()
        .route("/", get(pages::index))
        .route("/sign-in", post(pages::sign_in))
        .route("/sign-out", post(pages::sign_out))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api/auth", auth_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
