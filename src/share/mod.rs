//! Share model
//!
//! A share is the immutable, link-addressable unit of sharing: a
//! fixed-format random id, an expiry, an optional sender name and the
//! list of stored files it owns. Persisted as one JSON record per
//! share; once written, the record is never mutated.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use store::ShareStore;

/// One file owned by a share.
///
/// The display name is what recipients see; the storage name is the
/// server-generated opaque name the payload lives under on disk. The
/// display name is never used as a filesystem path component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub display_name: String,
    pub storage_name: String,
    pub size: u64,
}

/// A persisted share record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub files: Vec<StoredFile>,
}

impl Share {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Resolve a client-supplied file reference against the file list,
    /// matching either the storage name or the display name.
    pub fn find_file(&self, file_ref: &str) -> Option<&StoredFile> {
        self.files
            .iter()
            .find(|f| f.storage_name == file_ref || f.display_name == file_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share() -> Share {
        Share {
            id: "aabbccddeeff0011".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            sender: Some("alice".to_string()),
            files: vec![StoredFile {
                display_name: "holiday photos.zip".to_string(),
                storage_name: "d34db33f.zip".to_string(),
                size: 42,
            }],
        }
    }

    #[test]
    fn find_file_matches_both_names() {
        let share = share();
        assert!(share.find_file("holiday photos.zip").is_some());
        assert!(share.find_file("d34db33f.zip").is_some());
        assert!(share.find_file("other.zip").is_none());
    }

    #[test]
    fn expiry_check() {
        let mut share = share();
        assert!(!share.is_expired());
        share.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(share.is_expired());
    }
}
