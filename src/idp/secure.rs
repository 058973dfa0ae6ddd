// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The protected resource: echoes the claims of a verified bearer JWT.

use axum::Json;

use crate::auth::{Claims, VerifiedClaims};

/// Return the claims of the presented JWT.
#[utoipa::path(
    get,
    path = "/api/secure",
    tag = "Protected",
    responses(
        (status = 200, description = "Verified claims", body = Claims),
        (status = 400, description = "Token is required"),
        (status = 401, description = "Token rejected; body carries error and error_code"),
        (status = 500, description = "Verification keys unavailable")
    )
)]
pub async fn secure(VerifiedClaims(claims): VerifiedClaims) -> Json<Claims> {
    tracing::debug!(sub = %claims.sub, "Protected resource accessed");
    Json(claims)
}
