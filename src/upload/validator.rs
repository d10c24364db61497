//! Type & Size Validator
//!
//! Inspects an assembled artifact before it may become a share: the
//! declared extension must be allowed, the leading bytes must carry
//! the matching archive signature (the extension alone is never
//! trusted), the MIME mapping for the extension must agree, and the
//! size must stay under the configured maximum. The archive is never
//! extracted or executed.

use std::path::Path;

use tokio::io::AsyncReadExt;

use crate::error::{AppError, Result};

/// ZIP local-file-header signature.
const ZIP_LOCAL: &[u8] = b"PK\x03\x04";
/// ZIP end-of-central-directory signature (empty archives start here).
const ZIP_EOCD: &[u8] = b"PK\x05\x06";
/// RAR marker prefix, shared by the v4 and v5 signatures.
const RAR_MARKER: &[u8] = b"Rar!\x1a\x07";

/// Validate an artifact. Returns its size in bytes on success.
///
/// The type and size checks both run even when one has already
/// failed, so a broken upload is inspected exactly once and the
/// caller gets a single terminal rejection reason.
pub async fn check(
    declared_name: &str,
    artifact: &Path,
    max_size: u64,
    allowed_extensions: &[String],
) -> Result<u64> {
    let size = tokio::fs::metadata(artifact).await?.len();

    let mut head = [0u8; 16];
    let mut file = tokio::fs::File::open(artifact).await?;
    let head_len = read_head(&mut file, &mut head).await?;
    let head = &head[..head_len];

    let type_result = check_type(declared_name, head, allowed_extensions);
    let size_result = if size > max_size {
        Err(AppError::SizeExceeded { size, max: max_size })
    } else {
        Ok(())
    };

    type_result?;
    size_result?;
    Ok(size)
}

fn check_type(declared_name: &str, head: &[u8], allowed: &[String]) -> Result<()> {
    let ext = declared_name
        .rsplit('.')
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();

    if declared_name.matches('.').count() == 0 || !allowed.contains(&ext) {
        return Err(AppError::TypeRejected(format!(
            "extension {:?} is not allowed",
            ext
        )));
    }

    let signature_ok = match ext.as_str() {
        "zip" => head.starts_with(ZIP_LOCAL) || head.starts_with(ZIP_EOCD),
        "rar" => {
            // The 6-byte marker is followed by the version byte at
            // offset 6: 0x00 for v4, 0x01 0x00 for v5.
            head.starts_with(RAR_MARKER)
                && (head.get(6) == Some(&0x00)
                    || (head.get(6) == Some(&0x01) && head.get(7) == Some(&0x00)))
        }
        _ => false,
    };
    if !signature_ok {
        return Err(AppError::TypeRejected(format!(
            "content does not match the {} archive signature",
            ext
        )));
    }

    // MIME mapping for the declared extension must agree with an
    // archive type. Additional consistency check, never the sole one.
    if let Some(mime) = mime_guess::from_path(declared_name).first() {
        if !mime.essence_str().contains(ext.as_str()) {
            return Err(AppError::TypeRejected(format!(
                "declared extension {} maps to inconsistent type {}",
                ext, mime
            )));
        }
    }

    Ok(())
}

async fn read_head(file: &mut tokio::fs::File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
