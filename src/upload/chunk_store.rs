//! Chunk Session Store
//!
//! Filesystem staging area for in-flight chunked uploads: one
//! directory per session, one numbered slot file per received chunk.
//! Chunks are opaque bytes and are never parsed or executed. All
//! cross-request coordination happens through the filesystem; nothing
//! is kept in memory between requests.

use std::path::PathBuf;

use axum::body::Bytes;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::pathguard;

/// Upper bound on the declared chunk count of a session.
pub const MAX_CHUNKS: usize = 100_000;

/// Staging store for upload chunks
#[derive(Clone)]
pub struct ChunkStore {
    staging_root: PathBuf,
}

impl ChunkStore {
    pub fn new(staging_root: PathBuf) -> Self {
        Self { staging_root }
    }

    pub fn staging_root(&self) -> &PathBuf {
        &self.staging_root
    }

    /// Resolve the staging directory for a (sanitized) session token.
    pub fn session_dir(&self, token: &str) -> PathBuf {
        self.staging_root.join(token)
    }

    /// Resolve the slot file for one chunk index.
    pub fn slot_path(&self, token: &str, index: usize) -> PathBuf {
        self.session_dir(token).join(format!("{:08}.chunk", index))
    }

    /// Store one chunk payload.
    ///
    /// The session directory is created implicitly on the first chunk;
    /// a concurrent first chunk racing on the mkdir is tolerated. The
    /// payload is written to a temp file and renamed into its slot, so
    /// a retry of the same index atomically replaces any prior write
    /// and a concurrent finalize never reads a partial slot.
    pub async fn put_chunk(
        &self,
        session: &str,
        index: usize,
        total: usize,
        data: Bytes,
    ) -> Result<()> {
        let token = pathguard::session_token(session)?;

        if total == 0 || total > MAX_CHUNKS {
            return Err(AppError::Validation(format!(
                "chunk count {} out of range (max {})",
                total, MAX_CHUNKS
            )));
        }
        if index >= total {
            return Err(AppError::Validation(format!(
                "chunk index {} out of range for {} chunks",
                index, total
            )));
        }
        if data.is_empty() {
            return Err(AppError::Chunk(format!(
                "empty payload for chunk {}",
                index
            )));
        }

        let dir = self.session_dir(&token);
        tokio::fs::create_dir_all(&dir).await?;
        pathguard::verify_contained(&self.staging_root, &dir)?;

        let tmp = dir.join(format!(".{:08}.{}.part", index, Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, self.slot_path(&token, index)).await?;

        tracing::debug!(
            session = %token,
            chunk_index = index,
            bytes = data.len(),
            "chunk staged"
        );

        Ok(())
    }

    /// True iff a slot file exists for every index in `[0, total)`.
    pub async fn session_complete(&self, session: &str, total: usize) -> Result<bool> {
        let token = pathguard::session_token(session)?;
        for index in 0..total {
            match tokio::fs::try_exists(self.slot_path(&token, index)).await {
                Ok(true) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Remove a session directory and everything in it.
    pub async fn remove_session(&self, session: &str) -> Result<()> {
        let token = pathguard::session_token(session)?;
        let dir = self.session_dir(&token);
        match pathguard::verify_contained(&self.staging_root, &dir) {
            Ok(resolved) => {
                tokio::fs::remove_dir_all(&resolved).await?;
                Ok(())
            }
            // Already gone: nothing to remove.
            Err(_) if !dir.exists() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ChunkStore) {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[tokio::test]
    async fn put_and_complete_out_of_order() {
        let (_dir, store) = store();

        store
            .put_chunk("sess1", 2, 3, Bytes::from_static(b"cc"))
            .await
            .unwrap();
        store
            .put_chunk("sess1", 0, 3, Bytes::from_static(b"aa"))
            .await
            .unwrap();
        assert!(!store.session_complete("sess1", 3).await.unwrap());

        store
            .put_chunk("sess1", 1, 3, Bytes::from_static(b"bb"))
            .await
            .unwrap();
        assert!(store.session_complete("sess1", 3).await.unwrap());
    }

    #[tokio::test]
    async fn retry_replaces_slot() {
        let (_dir, store) = store();

        store
            .put_chunk("sess1", 0, 1, Bytes::from_static(b"first"))
            .await
            .unwrap();
        store
            .put_chunk("sess1", 0, 1, Bytes::from_static(b"second"))
            .await
            .unwrap();

        let bytes = tokio::fs::read(store.slot_path("sess1", 0)).await.unwrap();
        assert_eq!(bytes, b"second");
    }

    #[tokio::test]
    async fn rejects_out_of_range_index() {
        let (_dir, store) = store();

        let result = store
            .put_chunk("sess1", 3, 3, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let result = store
            .put_chunk("sess1", 0, MAX_CHUNKS + 1, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn rejects_empty_payload() {
        let (_dir, store) = store();
        let result = store.put_chunk("sess1", 0, 1, Bytes::new()).await;
        assert!(matches!(result, Err(AppError::Chunk(_))));
    }

    #[tokio::test]
    async fn hostile_session_id_is_confined() {
        let (_dir, store) = store();

        store
            .put_chunk("../../escape", 0, 1, Bytes::from_static(b"x"))
            .await
            .unwrap();

        // The filtered token lands inside the staging root.
        assert!(store.session_dir("escape").join("00000000.chunk").exists());
    }

    #[tokio::test]
    async fn remove_session_is_idempotent() {
        let (_dir, store) = store();
        store
            .put_chunk("sess1", 0, 1, Bytes::from_static(b"x"))
            .await
            .unwrap();
        store.remove_session("sess1").await.unwrap();
        assert!(!store.session_dir("sess1").exists());
        store.remove_session("sess1").await.unwrap();
    }
}
