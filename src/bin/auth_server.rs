// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use oidc_demo::config::AuthServerConfig;
use oidc_demo::idp::{self, ExpiredRecords, IdpState};
use oidc_demo::logging::{self, LogFormat};
use oidc_demo::shutdown::shutdown_signal;
use oidc_demo::sweeper::Sweeper;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() {
    logging::init(LogFormat::from_env());

    let config = AuthServerConfig::from_env().expect("Invalid auth server configuration");
    let addr = config.bind_addr();
    let state = IdpState::new(config).expect("Failed to initialize auth server");
    info!(
        issuer = %state.config.issuer(),
        data_dir = %state.config.data_dir.display(),
        clients = state.config.trusted_clients.len(),
        "Auth server initialized"
    );

    let shutdown = CancellationToken::new();
    let sweeper = Sweeper::new(ExpiredRecords::new(state.storage.clone()));
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind auth server address");
    info!(%addr, "Auth server listening (docs at /docs)");

    axum::serve(listener, idp::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Auth server failed");

    shutdown.cancel();
    sweeper_handle.await.ok();
    info!("Auth server stopped");
}
