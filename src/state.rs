//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::share::ShareStore;
use crate::upload::{Assembler, ChunkStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    chunk_store: ChunkStore,
    share_store: ShareStore,
    assembler: Assembler,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let chunk_store = ChunkStore::new(config.storage.staging_root.clone());
        let share_store = ShareStore::new(&config.storage, &config.share);
        let assembler = Assembler::new(chunk_store.clone(), share_store.clone(), &config.share);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                chunk_store,
                share_store,
                assembler,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.inner.chunk_store
    }

    pub fn share_store(&self) -> &ShareStore {
        &self.inner.share_store
    }

    pub fn assembler(&self) -> &Assembler {
        &self.inner.assembler
    }

    /// Absolute link for a freshly created share.
    pub fn share_url(&self, share_id: &str) -> String {
        format!(
            "{}/?s={}",
            self.inner.config.server.public_url.trim_end_matches('/'),
            share_id
        )
    }
}
