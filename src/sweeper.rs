//! Expiration Sweeper
//!
//! Periodic reclamation task, independent of request handling: shares
//! whose expiry has passed are deleted wholesale, and staging
//! directories abandoned by uploads that never finalized are removed
//! once they go stale. One bad record never aborts a sweep; it is
//! logged and skipped. Every deletion is containment-checked.

use std::path::PathBuf;
use std::time::Duration;

use crate::pathguard;
use crate::share::ShareStore;
use crate::upload::ChunkStore;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired_shares: usize,
    pub stale_sessions: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    shares: ShareStore,
    staging_root: PathBuf,
    interval: Duration,
    session_stale: chrono::Duration,
}

impl Sweeper {
    pub fn new(
        shares: ShareStore,
        chunks: &ChunkStore,
        interval_secs: u64,
        session_stale_hours: i64,
    ) -> Self {
        Self {
            shares,
            staging_root: chunks.staging_root().clone(),
            interval: Duration::from_secs(interval_secs),
            session_stale: chrono::Duration::hours(session_stale_hours),
        }
    }

    /// Spawn the periodic sweep loop.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let stats = self.sweep_once().await;
                if stats.expired_shares > 0 || stats.stale_sessions > 0 {
                    tracing::info!(
                        expired_shares = stats.expired_shares,
                        stale_sessions = stats.stale_sessions,
                        "sweep reclaimed storage"
                    );
                }
            }
        })
    }

    /// Run one full sweep pass.
    pub async fn sweep_once(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        stats.expired_shares = self.sweep_shares().await;
        stats.stale_sessions = self.sweep_sessions().await;
        stats
    }

    async fn sweep_shares(&self) -> usize {
        let ids = match self.shares.list_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "sweep: cannot enumerate share records");
                return 0;
            }
        };

        let mut removed = 0;
        for id in ids {
            let share = match self.shares.load(&id).await {
                Ok(Some(share)) => share,
                // Corrupt records are logged by the store; skip them
                // rather than guessing at a deletion.
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(share_id = %id, error = %e, "sweep: unreadable record skipped");
                    continue;
                }
            };

            if !share.is_expired() {
                continue;
            }

            match self.shares.delete(&id).await {
                Ok(()) => {
                    tracing::info!(share_id = %id, expired_at = %share.expires_at, "expired share deleted");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(share_id = %id, error = %e, "sweep: share deletion failed");
                }
            }
        }
        removed
    }

    /// Reclaim session directories whose last modification is older
    /// than the staleness window (crashed or abandoned uploads).
    async fn sweep_sessions(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.staging_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(error = %e, "sweep: cannot enumerate staging area");
                return 0;
            }
        };

        let cutoff = std::time::SystemTime::now()
            - Duration::from_secs(self.session_stale.num_seconds().max(0) as u64);

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "sweep: staging enumeration error");
                    break;
                }
            };

            let path = entry.path();
            // Besides session directories, the staging root can hold a
            // bundle container orphaned by a crash before its unlink;
            // both go stale on the same cutoff.
            let (is_dir, stale) = match entry.metadata().await {
                Ok(meta) => (
                    meta.is_dir(),
                    matches!(meta.modified(), Ok(modified) if modified < cutoff),
                ),
                Err(_) => continue,
            };
            if !stale {
                continue;
            }

            let resolved = match pathguard::verify_contained(&self.staging_root, &path) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "sweep: entry outside staging root skipped");
                    continue;
                }
            };

            let result = if is_dir {
                tokio::fs::remove_dir_all(&resolved).await
            } else {
                tokio::fs::remove_file(&resolved).await
            };
            match result {
                Ok(()) => {
                    tracing::info!(entry = %resolved.display(), "stale staging entry reclaimed");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(entry = %resolved.display(), error = %e, "sweep: staging removal failed");
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Bytes;
    use tempfile::TempDir;

    fn setup(dir: &TempDir, stale_hours: i64) -> (ChunkStore, ShareStore, Sweeper) {
        let mut config = Config::default();
        config.storage.archive_root = dir.path().join("files");
        config.storage.staging_root = dir.path().join("staging");
        config.storage.meta_root = dir.path().join("meta");

        let chunks = ChunkStore::new(config.storage.staging_root.clone());
        let shares = ShareStore::new(&config.storage, &config.share);
        let sweeper = Sweeper::new(shares.clone(), &chunks, 3600, stale_hours);
        (chunks, shares, sweeper)
    }

    async fn make_share(dir: &TempDir, shares: &ShareStore) -> crate::share::Share {
        let artifact = dir.path().join(format!("artifact-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&artifact, b"PK\x03\x04data").await.unwrap();
        shares
            .create(&artifact, "a.zip".to_string(), None, 8)
            .await
            .unwrap()
    }

    async fn expire(dir: &TempDir, shares: &ShareStore, id: &str) {
        let mut share = shares.load(id).await.unwrap().unwrap();
        share.expires_at = chrono::Utc::now() - chrono::Duration::hours(1);
        let record = dir.path().join("meta").join(format!("{}.json", id));
        tokio::fs::write(&record, serde_json::to_vec(&share).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_share_is_reclaimed_fresh_one_untouched() {
        let dir = TempDir::new().unwrap();
        let (_, shares, sweeper) = setup(&dir, 24);

        let doomed = make_share(&dir, &shares).await;
        let fresh = make_share(&dir, &shares).await;
        expire(&dir, &shares, &doomed.id).await;

        let stats = sweeper.sweep_once().await;
        assert_eq!(stats.expired_shares, 1);

        assert!(shares.load(&doomed.id).await.unwrap().is_none());
        assert!(!dir.path().join("files").join(&doomed.id).exists());

        assert!(shares.load(&fresh.id).await.unwrap().is_some());
        assert!(dir.path().join("files").join(&fresh.id).exists());
    }

    #[tokio::test]
    async fn corrupt_record_does_not_abort_the_sweep() {
        let dir = TempDir::new().unwrap();
        let (_, shares, sweeper) = setup(&dir, 24);

        let doomed = make_share(&dir, &shares).await;
        expire(&dir, &shares, &doomed.id).await;

        // A corrupt record sorts before or after the doomed one; the
        // sweep must get past it either way.
        tokio::fs::write(
            dir.path().join("meta").join("00000000deadbeef.json"),
            b"{broken",
        )
        .await
        .unwrap();

        let stats = sweeper.sweep_once().await;
        assert_eq!(stats.expired_shares, 1);
        // The corrupt record is skipped, not deleted.
        assert!(dir
            .path()
            .join("meta")
            .join("00000000deadbeef.json")
            .exists());
    }

    #[tokio::test]
    async fn stale_session_directory_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        // Zero-hour staleness: anything already on disk counts as stale.
        let (chunks, _, sweeper) = setup(&dir, 0);

        chunks
            .put_chunk("left-behind", 0, 2, Bytes::from_static(b"x"))
            .await
            .unwrap();

        let stats = sweeper.sweep_once().await;
        assert_eq!(stats.stale_sessions, 1);
        assert!(!chunks.session_dir("left-behind").exists());
    }

    #[tokio::test]
    async fn orphaned_bundle_container_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let (chunks, _, sweeper) = setup(&dir, 0);

        // A bundle container left behind by a crash between creation
        // and unlink is a plain file in the staging root.
        tokio::fs::create_dir_all(chunks.staging_root())
            .await
            .unwrap();
        let orphan = chunks
            .staging_root()
            .join(format!(".bundle-{}.zip", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&orphan, b"PK\x03\x04half-written")
            .await
            .unwrap();

        let stats = sweeper.sweep_once().await;
        assert_eq!(stats.stale_sessions, 1);
        assert!(!orphan.exists());
    }

    #[tokio::test]
    async fn young_session_directory_survives() {
        let dir = TempDir::new().unwrap();
        let (chunks, _, sweeper) = setup(&dir, 24);

        chunks
            .put_chunk("in-flight", 0, 2, Bytes::from_static(b"x"))
            .await
            .unwrap();

        let stats = sweeper.sweep_once().await;
        assert_eq!(stats.stale_sessions, 0);
        assert!(chunks.session_dir("in-flight").exists());
    }
}
