//! Share Store
//!
//! Creates, loads, enumerates and deletes persisted share records.
//! Layout: `meta_root/<id>.json` for the record, `archive_root/<id>/`
//! for the owned payloads under opaque storage names. A record is
//! written to a temp file and renamed into place after every payload
//! exists, so a reader never observes a partially visible share.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::RngCore;
use uuid::Uuid;

use crate::config::{ShareConfig, StorageConfig};
use crate::error::{AppError, Result};
use crate::pathguard;

use super::{Share, StoredFile};

/// How many fresh ids to try when a generated id collides on disk.
const ID_RETRIES: usize = 16;

#[derive(Clone)]
pub struct ShareStore {
    archive_root: PathBuf,
    meta_root: PathBuf,
    id_len: usize,
    ttl: chrono::Duration,
}

impl ShareStore {
    pub fn new(storage: &StorageConfig, share: &ShareConfig) -> Self {
        Self {
            archive_root: storage.archive_root.clone(),
            meta_root: storage.meta_root.clone(),
            id_len: share.id_len,
            ttl: chrono::Duration::hours(share.ttl_hours),
        }
    }

    pub fn archive_root(&self) -> &PathBuf {
        &self.archive_root
    }

    pub fn id_len(&self) -> usize {
        self.id_len
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.meta_root.join(format!("{}.json", id))
    }

    fn share_dir(&self, id: &str) -> PathBuf {
        self.archive_root.join(id)
    }

    /// Absolute path of one stored payload.
    pub fn file_path(&self, share: &Share, file: &StoredFile) -> PathBuf {
        self.share_dir(&share.id).join(&file.storage_name)
    }

    /// Materialize a share from a validated artifact.
    ///
    /// The artifact is renamed into a fresh share directory under an
    /// unguessable storage name, then the metadata record is persisted
    /// last, atomically. On any failure the half-made directory is
    /// removed; the caller keeps responsibility for the artifact only
    /// until the rename succeeds.
    pub async fn create(
        &self,
        artifact: &Path,
        display_name: String,
        sender: Option<String>,
        size: u64,
    ) -> Result<Share> {
        let (id, dir) = self.claim_fresh_dir().await?;

        let extension = display_name
            .rsplit('.')
            .next()
            .map(str::to_lowercase)
            .unwrap_or_else(|| "bin".to_string());
        let storage_name = format!("{}.{}", Uuid::new_v4().simple(), extension);
        let target = dir.join(&storage_name);

        if let Err(e) = tokio::fs::rename(artifact, &target).await {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(e.into());
        }

        // Stored content is reachable only through this process.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = tokio::fs::set_permissions(&target, perms).await {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                return Err(e.into());
            }
        }

        let now = Utc::now();
        let share = Share {
            id: id.clone(),
            created_at: now,
            expires_at: now + self.ttl,
            sender: sender.filter(|s| !s.is_empty()),
            files: vec![StoredFile {
                display_name,
                storage_name,
                size,
            }],
        };

        if let Err(e) = self.persist_record(&share).await {
            let _ = tokio::fs::remove_dir_all(&dir).await;
            return Err(e);
        }

        tracing::info!(
            share_id = %id,
            size = size,
            expires_at = %share.expires_at,
            "share created"
        );

        Ok(share)
    }

    /// Load a share record, or `None` when it is missing or corrupt.
    ///
    /// The id format is validated before any disk access.
    pub async fn load(&self, id: &str) -> Result<Option<Share>> {
        pathguard::share_id(id, self.id_len)?;

        let bytes = match tokio::fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Share>(&bytes) {
            Ok(share) => Ok(Some(share)),
            Err(e) => {
                tracing::warn!(share_id = %id, error = %e, "corrupt share record");
                Ok(None)
            }
        }
    }

    /// Delete a share wholesale: file directory, then record.
    ///
    /// Sweeper-only. The resolved directory must sit inside the
    /// archive root before anything is removed recursively; a corrupt
    /// or hostile id must never reach `remove_dir_all`.
    pub async fn delete(&self, id: &str) -> Result<()> {
        pathguard::share_id(id, self.id_len)?;

        let dir = self.share_dir(id);
        if dir.exists() {
            let resolved = pathguard::verify_contained(&self.archive_root, &dir)?;
            tokio::fs::remove_dir_all(&resolved).await?;
        }

        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate the ids of all persisted records.
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.meta_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(".json") {
                if pathguard::share_id(id, self.id_len).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Generate an unguessable id and claim its directory, retrying on
    /// the rare collision with an existing directory or record.
    async fn claim_fresh_dir(&self) -> Result<(String, PathBuf)> {
        tokio::fs::create_dir_all(&self.archive_root).await?;
        tokio::fs::create_dir_all(&self.meta_root).await?;

        for _ in 0..ID_RETRIES {
            let id = self.random_id();
            if tokio::fs::try_exists(self.record_path(&id)).await? {
                continue;
            }
            let dir = self.share_dir(&id);
            // create_dir (not create_dir_all) so a concurrent claim of
            // the same id loses the race instead of sharing the dir.
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Storage(std::io::Error::other(
            "could not allocate a fresh share id",
        )))
    }

    fn random_id(&self) -> String {
        let mut bytes = vec![0u8; self.id_len.div_ceil(2)];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut id = hex::encode(bytes);
        id.truncate(self.id_len);
        id
    }

    /// Write the record to a temp file, then rename into place.
    async fn persist_record(&self, share: &Share) -> Result<()> {
        let json = serde_json::to_vec_pretty(share)
            .map_err(|e| AppError::Storage(std::io::Error::other(e)))?;

        let tmp = self
            .meta_root
            .join(format!(".{}.{}.tmp", share.id, Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, self.record_path(&share.id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ShareStore {
        let mut config = Config::default();
        config.storage.archive_root = dir.path().join("files");
        config.storage.meta_root = dir.path().join("meta");
        ShareStore::new(&config.storage, &config.share)
    }

    async fn artifact(dir: &TempDir, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join("artifact");
        tokio::fs::write(&path, bytes).await.unwrap();
        path
    }

    #[tokio::test]
    async fn create_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let artifact = artifact(&dir, b"PK\x03\x04data").await;

        let share = store
            .create(&artifact, "my stuff.zip".to_string(), Some("bob".into()), 8)
            .await
            .unwrap();

        assert_eq!(share.id.len(), 16);
        assert!(pathguard::share_id(&share.id, 16).is_ok());
        assert!(!artifact.exists(), "artifact is moved, not copied");

        let loaded = store.load(&share.id).await.unwrap().unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files[0].display_name, "my stuff.zip");
        assert_ne!(loaded.files[0].storage_name, "my stuff.zip");
        assert_eq!(loaded.files[0].size, 8);

        let payload = store.file_path(&loaded, &loaded.files[0]);
        assert_eq!(tokio::fs::read(&payload).await.unwrap(), b"PK\x03\x04data");
    }

    #[tokio::test]
    async fn load_rejects_malformed_id_before_disk_access() {
        let dir = TempDir::new().unwrap();
        // meta_root does not even exist: a malformed id must fail on
        // format alone, a well-formed unknown id must read as None.
        let store = store(&dir);

        let result = store.load("../../../etc/passwd").await;
        assert!(matches!(result, Err(AppError::PathViolation(_))));

        let missing = store.load("0123456789abcdef").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn corrupt_record_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        tokio::fs::create_dir_all(dir.path().join("meta"))
            .await
            .unwrap();
        tokio::fs::write(
            dir.path().join("meta").join("0123456789abcdef.json"),
            b"{not json",
        )
        .await
        .unwrap();

        assert!(store.load("0123456789abcdef").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_directory_and_record() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let artifact = artifact(&dir, b"PK\x03\x04").await;
        let share = store
            .create(&artifact, "a.zip".to_string(), None, 4)
            .await
            .unwrap();

        store.delete(&share.id).await.unwrap();

        assert!(store.load(&share.id).await.unwrap().is_none());
        assert!(!dir.path().join("files").join(&share.id).exists());
    }

    #[tokio::test]
    async fn list_ids_sees_only_well_formed_records() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let artifact = artifact(&dir, b"PK\x03\x04").await;
        let share = store
            .create(&artifact, "a.zip".to_string(), None, 4)
            .await
            .unwrap();

        tokio::fs::write(dir.path().join("meta").join("bogus-name.json"), b"{}")
            .await
            .unwrap();

        let ids = store.list_ids().await.unwrap();
        assert_eq!(ids, vec![share.id]);
    }
}
