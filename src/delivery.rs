//! Delivery Service
//!
//! Serves a share's files back out: as a single attachment, as a
//! byte-range chunk for client-side reassembly, or bundled into one
//! zip container built on demand. Bytes are streamed with one bounded
//! buffer window; whole files are never pulled into memory.

use std::io::Write;
use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::pathguard;
use crate::share::{Share, ShareStore};

/// Custom headers carried by chunked downloads so the client can
/// reassemble a file from independently fetched ranges.
pub const HDR_FILE_SIZE: &str = "x-file-size";
pub const HDR_CHUNK_INDEX: &str = "x-chunk-index";
pub const HDR_CHUNK_LENGTH: &str = "x-chunk-length";
pub const HDR_FILE_NAME: &str = "x-file-name";

/// Load a share that is still downloadable.
///
/// An expired share that the sweeper has not reclaimed yet reads the
/// same as a missing one.
pub async fn load_active(store: &ShareStore, share_id: &str) -> Result<Share> {
    match store.load(share_id).await? {
        Some(share) if !share.is_expired() => Ok(share),
        _ => Err(AppError::NotFound(format!("share {}", share_id))),
    }
}

/// Stream one stored file as a whole attachment.
pub async fn serve_whole(store: &ShareStore, share_id: &str, file_ref: &str) -> Result<Response> {
    let share = load_active(store, share_id).await?;
    let stored = share
        .find_file(file_ref)
        .ok_or_else(|| AppError::NotFound(format!("file {:?}", file_ref)))?;

    let path = store.file_path(&share, stored);
    pathguard::verify_contained(store.archive_root(), &path)?;

    let file = open_stored(&path, file_ref).await?;
    let size = file.metadata().await?.len();

    let mime = mime_guess::from_path(&stored.display_name).first_or_octet_stream();
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.essence_str())
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                header_safe(&stored.display_name)
            ),
        )
        .body(body)
        .map_err(|e| AppError::Storage(std::io::Error::other(e)))
}

/// Stream one byte-range chunk of a stored file.
pub async fn serve_chunk(
    store: &ShareStore,
    share_id: &str,
    file_ref: &str,
    chunk_index: u64,
    chunk_size: u64,
) -> Result<Response> {
    if chunk_size == 0 {
        return Err(AppError::Validation("chunk_size must be positive".into()));
    }

    let share = load_active(store, share_id).await?;
    let stored = share
        .find_file(file_ref)
        .ok_or_else(|| AppError::NotFound(format!("file {:?}", file_ref)))?;

    let path = store.file_path(&share, stored);
    pathguard::verify_contained(store.archive_root(), &path)?;

    let mut file = open_stored(&path, file_ref).await?;
    let size = file.metadata().await?.len();

    let start = chunk_index
        .checked_mul(chunk_size)
        .ok_or(AppError::Range { start: u64::MAX, size })?;
    if start >= size {
        return Err(AppError::Range { start, size });
    }
    let end = (start + chunk_size).min(size);
    let length = end - start;

    file.seek(std::io::SeekFrom::Start(start)).await?;
    let body = Body::from_stream(ReaderStream::new(file.take(length)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, length)
        .header(HDR_FILE_SIZE, size)
        .header(HDR_CHUNK_INDEX, chunk_index)
        .header(HDR_CHUNK_LENGTH, length)
        .header(HDR_FILE_NAME, header_safe(&stored.display_name))
        .body(body)
        .map_err(|e| AppError::Storage(std::io::Error::other(e)))
}

/// Build and stream a zip bundle of every stored file in the share.
///
/// Missing or zero-length payloads are skipped with a warning, never
/// failing the whole bundle. The temporary container is unlinked as
/// soon as it is open for reading, so it cannot be left behind even
/// when the download aborts midway.
pub async fn serve_bundle(
    store: &ShareStore,
    staging_root: &Path,
    share_id: &str,
) -> Result<Response> {
    let share = load_active(store, share_id).await?;

    let mut entries = Vec::new();
    for stored in &share.files {
        let path = store.file_path(&share, stored);
        if pathguard::verify_contained(store.archive_root(), &path).is_err() {
            tracing::warn!(share_id = %share.id, file = %stored.storage_name, "bundle: unresolvable file skipped");
            continue;
        }
        entries.push((path, stored.display_name.clone()));
    }

    tokio::fs::create_dir_all(staging_root).await?;
    let bundle_path = staging_root.join(format!(".bundle-{}.zip", Uuid::new_v4().simple()));

    let build_path = bundle_path.clone();
    let share_id_owned = share.id.clone();
    let built = tokio::task::spawn_blocking(move || {
        build_bundle(&build_path, &share_id_owned, &entries)
    })
    .await
    .map_err(|e| AppError::Storage(std::io::Error::other(e)))?;

    if let Err(e) = built {
        let _ = tokio::fs::remove_file(&bundle_path).await;
        return Err(e);
    }

    let file = tokio::fs::File::open(&bundle_path).await?;
    let size = file.metadata().await?.len();
    // Unlink now; the open descriptor keeps the bytes alive until the
    // stream finishes, and the name is gone on every exit path.
    tokio::fs::remove_file(&bundle_path).await?;

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.zip\"", share.id),
        )
        .body(body)
        .map_err(|e| AppError::Storage(std::io::Error::other(e)))
}

/// Write the bundle zip. Blocking; runs on the blocking pool.
fn build_bundle(
    bundle_path: &Path,
    share_id: &str,
    entries: &[(PathBuf, String)],
) -> Result<()> {
    let out = std::fs::File::create(bundle_path)?;
    let mut writer = zip::ZipWriter::new(out);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .large_file(true);

    let mut used_names = std::collections::HashSet::new();
    for (index, (path, display_name)) in entries.iter().enumerate() {
        let readable = match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => true,
            Ok(_) => false,
            Err(_) => false,
        };
        if !readable {
            tracing::warn!(
                share_id = %share_id,
                file = %display_name,
                "bundle: missing or empty file skipped"
            );
            continue;
        }

        let entry_name = if used_names.insert(display_name.clone()) {
            display_name.clone()
        } else {
            format!("{}-{}", index, display_name)
        };

        writer
            .start_file(entry_name, options)
            .map_err(|e| AppError::Storage(std::io::Error::other(e)))?;
        let mut input = std::fs::File::open(path)?;
        std::io::copy(&mut input, &mut writer)?;
    }

    let mut out = writer
        .finish()
        .map_err(|e| AppError::Storage(std::io::Error::other(e)))?;
    out.flush()?;
    Ok(())
}

async fn open_stored(path: &Path, file_ref: &str) -> Result<tokio::fs::File> {
    match tokio::fs::File::open(path).await {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Record points at a payload that is gone: exact delivery
            // degrades to 404, unlike best-effort bundling.
            Err(AppError::NotFound(format!("file {:?}", file_ref)))
        }
        Err(e) => Err(e.into()),
    }
}

/// Make a display name safe for a response header: printable ASCII,
/// no quotes. Raw client-influenced names are never echoed verbatim.
fn header_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '"' || c == '\\' {
                '\''
            } else if c.is_ascii_graphic() || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
