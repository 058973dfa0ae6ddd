// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use super::state::RpState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    pub service: String,
    /// Provider discovery document reachable and well-formed.
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn check_provider(state: &RpState) -> String {
    match state.provider.metadata().await {
        Ok(_) => "ok".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Provider health check failed");
            "unavailable".to_string()
        }
    }
}

/// Returns 200 if the provider is reachable, 503 otherwise.
pub async fn health(State(state): State<RpState>) -> (StatusCode, Json<ReadyResponse>) {
    let provider = check_provider(&state).await;
    let all_ok = provider == "ok";

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            provider,
        },
    };
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn readiness(state: State<RpState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}
