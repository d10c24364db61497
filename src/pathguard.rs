//! Path Guard
//!
//! Validates and confines every filesystem path derived from
//! client-supplied identifiers. All other modules call into this one
//! before touching the disk with anything a client influenced; no other
//! module concatenates path segments from raw request input.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{AppError, Result};

/// Maximum length of a session token after filtering.
const MAX_SESSION_TOKEN_LEN: usize = 64;

/// Maximum length of a display filename after filtering.
const MAX_DISPLAY_NAME_LEN: usize = 255;

/// Validate a share id: exactly `id_len` lowercase hex characters.
///
/// Purely syntactic, never touches the filesystem. Everything that is
/// not a well-formed id is rejected before any disk access can happen.
pub fn share_id<'a>(id: &'a str, id_len: usize) -> Result<&'a str> {
    let well_formed = id.len() == id_len
        && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if well_formed {
        Ok(id)
    } else {
        Err(AppError::PathViolation(format!(
            "share id {:?} does not match the id format",
            id
        )))
    }
}

/// Sanitize a client-chosen session token.
///
/// Filters the token down to `[A-Za-z0-9_-]` and caps its length. An
/// empty result is rejected rather than coerced into a directory name.
pub fn session_token(raw: &str) -> Result<String> {
    let token: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_SESSION_TOKEN_LEN)
        .collect();

    if token.is_empty() {
        return Err(AppError::Validation("empty session id".to_string()));
    }
    Ok(token)
}

/// Sanitize a declared filename for display purposes.
///
/// Strips path separators and control characters and caps the length.
/// The result is never used as a filesystem path component, only for
/// metadata, response headers and bundle entry names. An empty result
/// is replaced by a generated placeholder.
pub fn display_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .filter(|c| !matches!(c, '/' | '\\') && !c.is_control())
        .take(MAX_DISPLAY_NAME_LEN)
        .collect();

    let name = name.trim().to_string();
    if name.is_empty() {
        format!("upload-{}.bin", Uuid::new_v4().simple())
    } else {
        name
    }
}

/// Sanitize an optional sender display name.
///
/// Control characters are dropped, the length is capped, and an empty
/// result collapses to `None` (the sender stays anonymous).
pub fn sender_name(raw: &str) -> Option<String> {
    let name: String = raw.chars().filter(|c| !c.is_control()).take(100).collect();
    let name = name.trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Verify that an existing path resolves to a descendant of `base`.
///
/// Canonicalizes both sides, so symlink tricks that earlier character
/// filters would miss are caught here. Mandatory before any recursive
/// deletion and before opening any file whose location was influenced
/// by a client identifier or an on-disk metadata record.
pub fn verify_contained(base: &Path, path: &Path) -> Result<PathBuf> {
    let base = base.canonicalize()?;
    let resolved = path.canonicalize().map_err(|_| {
        AppError::PathViolation(format!("cannot resolve {}", path.display()))
    })?;

    if resolved.starts_with(&base) {
        Ok(resolved)
    } else {
        Err(AppError::PathViolation(format!(
            "{} escapes {}",
            resolved.display(),
            base.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn share_id_accepts_well_formed() {
        assert!(share_id("0123456789abcdef", 16).is_ok());
    }

    #[test]
    fn share_id_rejects_malformed() {
        assert!(share_id("0123456789abcde", 16).is_err()); // too short
        assert!(share_id("0123456789abcdef0", 16).is_err()); // too long
        assert!(share_id("0123456789ABCDEF", 16).is_err()); // uppercase
        assert!(share_id("../../../../efgh", 16).is_err());
        assert!(share_id("0123456789abcdeg", 16).is_err()); // non-hex
        assert!(share_id("", 16).is_err());
    }

    #[test]
    fn session_token_filters_hostile_input() {
        assert_eq!(session_token("abc-123_X").unwrap(), "abc-123_X");
        assert_eq!(session_token("../../etc/passwd").unwrap(), "etcpasswd");
        assert!(session_token("../..//").is_err());
        assert!(session_token("").is_err());
    }

    #[test]
    fn session_token_is_length_capped() {
        let long = "a".repeat(500);
        assert_eq!(session_token(&long).unwrap().len(), 64);
    }

    #[test]
    fn display_name_strips_separators_and_controls() {
        assert_eq!(display_name("archive.zip"), "archive.zip");
        assert_eq!(display_name("../../evil.zip"), "....evil.zip");
        assert_eq!(display_name("a\\b/c\x00d.zip"), "abcd.zip");
    }

    #[test]
    fn display_name_replaces_empty_with_placeholder() {
        let name = display_name("///");
        assert!(name.starts_with("upload-"));
        assert!(name.ends_with(".bin"));
    }

    #[test]
    fn sender_name_sanitizes() {
        assert_eq!(sender_name("alice"), Some("alice".to_string()));
        assert_eq!(sender_name("  bob\x07 "), Some("bob".to_string()));
        assert_eq!(sender_name("   "), None);
        assert_eq!(sender_name(""), None);
    }

    #[test]
    fn verify_contained_accepts_descendants() {
        let dir = TempDir::new().unwrap();
        let child = dir.path().join("child");
        std::fs::create_dir(&child).unwrap();
        assert!(verify_contained(dir.path(), &child).is_ok());
    }

    #[test]
    fn verify_contained_rejects_escapes() {
        let base = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let result = verify_contained(base.path(), outside.path());
        assert!(matches!(result, Err(AppError::PathViolation(_))));

        let traversal = base.path().join("..");
        assert!(verify_contained(base.path(), &traversal).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn verify_contained_rejects_symlink_escape() {
        let base = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let link = base.path().join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        assert!(verify_contained(base.path(), &link).is_err());
    }
}
