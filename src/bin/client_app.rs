// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use oidc_demo::config::ClientAppConfig;
use oidc_demo::logging::{self, LogFormat};
use oidc_demo::rp::{self, RpState, StoreSweep};
use oidc_demo::shutdown::shutdown_signal;
use oidc_demo::sweeper::Sweeper;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() {
    logging::init(LogFormat::from_env());

    let config = ClientAppConfig::from_env().expect("Invalid client app configuration");
    let addr = config.bind_addr();
    let state = RpState::new(config).expect("Failed to initialize client app");
    info!(
        auth_server = %state.config.auth_server_url,
        provider_id = %state.config.provider.provider_id,
        callback_url = %state.config.callback_url(),
        "Client app initialized"
    );

    let shutdown = CancellationToken::new();
    let sweeper = Sweeper::new(StoreSweep(state.store.clone()));
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind client app address");
    info!(%addr, "Client app listening");

    axum::serve(listener, rp::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Client app failed");

    shutdown.cancel();
    sweeper_handle.await.ok();
    info!("Client app stopped");
}
