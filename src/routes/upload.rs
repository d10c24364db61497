//! Upload actions: chunk ingest and finalize.

use axum::{
    extract::{Multipart, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ActionQuery {
    action: Option<String>,
}

/// Fields of an upload-action form. Both actions arrive as multipart
/// form data; `payload` is only present on `upload_chunk`.
#[derive(Default)]
struct UploadForm {
    session: Option<String>,
    index: Option<usize>,
    total: Option<usize>,
    filename: Option<String>,
    sender: Option<String>,
    payload: Option<axum::body::Bytes>,
}

/// `POST /?action=...`
pub async fn entry(
    State(state): State<AppState>,
    Query(query): Query<ActionQuery>,
    multipart: Multipart,
) -> Result<Json<Value>> {
    match query.action.as_deref() {
        Some("upload_chunk") => upload_chunk(state, multipart).await,
        Some("finalize") => finalize(state, multipart).await,
        other => Err(AppError::Validation(format!(
            "unknown action {:?}",
            other.unwrap_or("")
        ))),
    }
}

async fn upload_chunk(state: AppState, multipart: Multipart) -> Result<Json<Value>> {
    let form = read_form(multipart).await?;

    let session = require(form.session, "session")?;
    let index = require(form.index, "index")?;
    let total = require(form.total, "total")?;
    let payload = form
        .payload
        .ok_or_else(|| AppError::Chunk("missing chunk payload".to_string()))?;

    state
        .chunk_store()
        .put_chunk(&session, index, total, payload)
        .await?;

    Ok(Json(json!({ "ok": true, "received": index })))
}

async fn finalize(state: AppState, multipart: Multipart) -> Result<Json<Value>> {
    let form = read_form(multipart).await?;

    let session = require(form.session, "session")?;
    let total = require(form.total, "total")?;
    let filename = require(form.filename, "filename")?;

    let share = state
        .assembler()
        .finalize(&session, total, &filename, form.sender)
        .await?;

    Ok(Json(json!({ "ok": true, "share": state.share_url(&share.id) })))
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Chunk(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "payload" => {
                // A truncated transfer surfaces here as a read error.
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Chunk(format!("chunk transfer failed: {}", e)))?;
                form.payload = Some(bytes);
            }
            "session" => form.session = Some(text(field, "session").await?),
            "index" => form.index = Some(number(field, "index").await?),
            "total" => form.total = Some(number(field, "total").await?),
            "filename" => form.filename = Some(text(field, "filename").await?),
            "sender" => form.sender = Some(text(field, "sender").await?),
            _ => {}
        }
    }

    Ok(form)
}

async fn text(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("unreadable field {}: {}", name, e)))
}

async fn number(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<usize> {
    let raw = text(field, name).await?;
    raw.parse()
        .map_err(|_| AppError::Validation(format!("field {} is not a number: {:?}", name, raw)))
}

fn require<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| AppError::Validation(format!("missing field {}", name)))
}
