//! Assembler
//!
//! Turns a complete chunk session into a share. This is the only
//! multi-step operation in the system and the only place a true race
//! is possible: two finalize calls on the same session id must
//! serialize on a per-session lock so at most one of them consumes
//! the chunk set and produces a share.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::ShareConfig;
use crate::error::{AppError, Result};
use crate::pathguard;
use crate::share::{Share, ShareStore};

use super::chunk_store::ChunkStore;
use super::validator;

#[derive(Clone)]
pub struct Assembler {
    inner: Arc<AssemblerInner>,
}

struct AssemblerInner {
    chunks: ChunkStore,
    shares: ShareStore,
    max_file_size: u64,
    allowed_extensions: Vec<String>,
    /// Per-session finalize locks, keyed by sanitized session token.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Assembler {
    pub fn new(chunks: ChunkStore, shares: ShareStore, share_config: &ShareConfig) -> Self {
        Self {
            inner: Arc::new(AssemblerInner {
                chunks,
                shares,
                max_file_size: share_config.max_file_size,
                allowed_extensions: share_config.allowed_extensions.clone(),
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Consume a session's chunks and materialize a share.
    ///
    /// Every exit path, success or failure, leaves neither a dangling
    /// session directory nor a half-written share directory behind.
    pub async fn finalize(
        &self,
        session: &str,
        total: usize,
        declared_name: &str,
        sender: Option<String>,
    ) -> Result<Share> {
        let token = pathguard::session_token(session)?;
        if total == 0 || total > super::chunk_store::MAX_CHUNKS {
            return Err(AppError::Validation(format!(
                "chunk count {} out of range",
                total
            )));
        }

        let lock = self.session_lock(&token).await;
        let guard = lock.lock().await;

        let result = self
            .finalize_locked(&token, total, declared_name, sender)
            .await;

        // The local clone must go before the count check in release.
        drop(guard);
        drop(lock);
        self.release_session_lock(&token).await;
        result
    }

    async fn finalize_locked(
        &self,
        token: &str,
        total: usize,
        declared_name: &str,
        sender: Option<String>,
    ) -> Result<Share> {
        let session_dir = self.inner.chunks.session_dir(token);
        if !session_dir.is_dir() {
            // A concurrent finalize already consumed this session.
            return Err(AppError::NotFound(format!("unknown session {}", token)));
        }

        // Gate on completeness before any chunk is consumed, so an
        // incomplete session is reported without creating the artifact.
        // Uploads do not hold the finalize lock, so a chunk may still
        // land between this scan and the rescan; only a gap confirmed
        // by both fails the session.
        if !self.inner.chunks.session_complete(token, total).await? {
            if let Some(missing) = self.smallest_missing(token, total).await {
                if let Err(e) = self.inner.chunks.remove_session(token).await {
                    tracing::warn!(session = %token, error = %e, "failed to discard incomplete session");
                }
                return Err(AppError::MissingChunk(missing));
            }
        }

        let artifact = session_dir.join(".artifact");
        if let Err(e) = self.concatenate(token, total, &artifact).await {
            self.discard(token, &artifact).await;
            return Err(e);
        }

        let display_name = pathguard::display_name(declared_name);
        let size = match validator::check(
            &display_name,
            &artifact,
            self.inner.max_file_size,
            &self.inner.allowed_extensions,
        )
        .await
        {
            Ok(size) => size,
            Err(e) => {
                self.discard(token, &artifact).await;
                return Err(e);
            }
        };

        let sender = sender.as_deref().and_then(pathguard::sender_name);

        let share = match self
            .inner
            .shares
            .create(&artifact, display_name, sender, size)
            .await
        {
            Ok(share) => share,
            Err(e) => {
                self.discard(token, &artifact).await;
                return Err(e);
            }
        };

        // Chunks are gone and the artifact was moved out; only the
        // empty session directory is left.
        let _ = self.inner.chunks.remove_session(token).await;

        tracing::info!(
            session = %token,
            share_id = %share.id,
            chunks = total,
            size = size,
            "session finalized"
        );

        Ok(share)
    }

    /// Stream-concatenate slots `0..total` in ascending index order.
    ///
    /// Aborts with `MissingChunk(i)` at the first absent slot. Each
    /// slot is deleted right after it is consumed, so peak disk usage
    /// stays bounded to one artifact copy beyond the remaining chunks.
    async fn concatenate(&self, token: &str, total: usize, artifact: &PathBuf) -> Result<()> {
        let mut out = tokio::fs::File::create(artifact).await?;

        for index in 0..total {
            let slot = self.inner.chunks.slot_path(token, index);
            let mut reader = match tokio::fs::File::open(&slot).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(AppError::MissingChunk(index));
                }
                Err(e) => return Err(e.into()),
            };
            tokio::io::copy(&mut reader, &mut out).await?;
            tokio::fs::remove_file(&slot).await?;
        }

        out.flush().await?;
        Ok(())
    }

    async fn smallest_missing(&self, token: &str, total: usize) -> Option<usize> {
        for index in 0..total {
            match tokio::fs::try_exists(self.inner.chunks.slot_path(token, index)).await {
                Ok(true) => {}
                _ => return Some(index),
            }
        }
        None
    }

    async fn discard(&self, token: &str, artifact: &PathBuf) {
        let _ = tokio::fs::remove_file(artifact).await;
        if let Err(e) = self.inner.chunks.remove_session(token).await {
            tracing::warn!(session = %token, error = %e, "failed to discard session");
        }
    }

    async fn session_lock(&self, token: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_session_lock(&self, token: &str) {
        let mut locks = self.inner.locks.lock().await;
        if let Some(lock) = locks.get(token) {
            // Drop the entry once no finalize call still holds a clone.
            if Arc::strong_count(lock) == 1 {
                locks.remove(token);
            }
        }
    }
}
