//! HTTP routes
//!
//! The whole public surface hangs off `/` and is driven by query
//! parameters, matching the web client's request shapes:
//!
//! - `POST /?action=upload_chunk` — multipart chunk upload
//! - `POST /?action=finalize` — assemble a session into a share
//! - `GET /?action=download_chunk&share=&file=&chunk_index=&chunk_size=`
//! - `GET /?s=<id>` — share landing summary
//! - `GET /?s=<id>&file=<ref>` — whole-file download
//! - `GET /?s=<id>&zip=1` — bundle download

pub mod download;
pub mod upload;

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(download::entry).post(upload::entry))
        .route("/health", get(health_check))
        .with_state(state)
}
