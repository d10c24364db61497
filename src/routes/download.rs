//! Download entry points: landing summary, whole file, byte-range
//! chunk and on-demand bundle.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::delivery;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DownloadQuery {
    action: Option<String>,
    // download_chunk parameters
    share: Option<String>,
    file: Option<String>,
    chunk_index: Option<u64>,
    chunk_size: Option<u64>,
    // share link parameters
    s: Option<String>,
    zip: Option<String>,
}

/// `GET /?...`
pub async fn entry(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    if query.action.as_deref() == Some("download_chunk") {
        return download_chunk(&state, &query).await;
    }

    let share_id = match &query.s {
        Some(share_id) => share_id,
        None => {
            return Err(AppError::Validation(
                "expected a share link (?s=) or a download action".to_string(),
            ))
        }
    };

    if let Some(file_ref) = &query.file {
        return delivery::serve_whole(state.share_store(), share_id, file_ref).await;
    }
    if query.zip.as_deref() == Some("1") {
        return delivery::serve_bundle(
            state.share_store(),
            &state.config().storage.staging_root,
            share_id,
        )
        .await;
    }
    landing(&state, share_id).await
}

async fn download_chunk(state: &AppState, query: &DownloadQuery) -> Result<Response> {
    let share_id = query
        .share
        .as_deref()
        .ok_or_else(|| AppError::Validation("missing share parameter".to_string()))?;
    let file_ref = query
        .file
        .as_deref()
        .ok_or_else(|| AppError::Validation("missing file parameter".to_string()))?;
    let chunk_index = query
        .chunk_index
        .ok_or_else(|| AppError::Validation("missing chunk_index parameter".to_string()))?;
    let chunk_size = query
        .chunk_size
        .unwrap_or(state.config().share.chunk_size);

    delivery::serve_chunk(
        state.share_store(),
        share_id,
        file_ref,
        chunk_index,
        chunk_size,
    )
    .await
}

/// Share landing data. The HTML presentation lives client-side; this
/// returns the share summary the page renders from.
async fn landing(state: &AppState, share_id: &str) -> Result<Response> {
    let share = delivery::load_active(state.share_store(), share_id).await?;

    let files: Vec<_> = share
        .files
        .iter()
        .map(|f| json!({ "name": f.display_name, "size": f.size }))
        .collect();

    Ok(Json(json!({
        "ok": true,
        "share": {
            "id": share.id,
            "created_at": share.created_at,
            "expires_at": share.expires_at,
            "sender": share.sender,
            "files": files,
            "chunk_size": state.config().share.chunk_size,
        }
    }))
    .into_response())
}
