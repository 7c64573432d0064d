//! Liveness endpoint (§6). Kept deliberately tiny — there is no database or other
//! stateful dependency in this core to probe, so liveness is just "the process is
//! scheduling tasks".

use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub timestamp: String,
}

/// `GET /healthz` (§6): `{ok:true, service, timestamp}`.
pub async fn healthz() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        service: "sonara-core",
        timestamp: Utc::now().to_rfc3339(),
    })
}
