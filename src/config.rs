//! Configuration management for the Dropbay server

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub share: ShareConfig,
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL used when building share links returned to clients.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory of stored files per share.
    pub archive_root: PathBuf,
    /// Root directory holding one staging subdirectory per upload session.
    pub staging_root: PathBuf,
    /// Root directory holding one JSON metadata record per share.
    pub meta_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// Length of a share id in lowercase hex characters.
    pub id_len: usize,
    /// Maximum size of an assembled artifact in bytes.
    pub max_file_size: u64,
    /// Chunk size used for chunked downloads, in bytes.
    pub chunk_size: u64,
    /// How long a share stays downloadable.
    pub ttl_hours: i64,
    /// Allowed artifact extensions (lowercase, no dot).
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Seconds between expiration sweeps.
    pub interval_secs: u64,
    /// Hours after which an unfinalized upload session is reclaimed.
    pub session_stale_hours: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                public_url: "http://localhost:8080".to_string(),
            },
            storage: StorageConfig {
                archive_root: PathBuf::from("./data/files"),
                staging_root: PathBuf::from("./data/staging"),
                meta_root: PathBuf::from("./data/meta"),
            },
            share: ShareConfig {
                id_len: 16,
                max_file_size: 2 * 1024 * 1024 * 1024,
                chunk_size: 20 * 1024 * 1024,
                ttl_hours: 168,
                allowed_extensions: vec!["zip".to_string(), "rar".to_string()],
            },
            sweep: SweepConfig {
                interval_secs: 3600,
                session_stale_hours: 24,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env_parse("SERVER_PORT", defaults.server.port),
                public_url: env::var("PUBLIC_URL").unwrap_or(defaults.server.public_url),
            },
            storage: StorageConfig {
                archive_root: env_path("ARCHIVE_ROOT", defaults.storage.archive_root),
                staging_root: env_path("STAGING_ROOT", defaults.storage.staging_root),
                meta_root: env_path("META_ROOT", defaults.storage.meta_root),
            },
            share: ShareConfig {
                id_len: env_parse("SHARE_ID_LEN", defaults.share.id_len),
                max_file_size: env_parse("MAX_FILE_SIZE", defaults.share.max_file_size),
                chunk_size: env_parse("CHUNK_SIZE", defaults.share.chunk_size),
                ttl_hours: env_parse("SHARE_TTL_HOURS", defaults.share.ttl_hours),
                allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                    .map(|v| {
                        v.split(',')
                            .map(|s| s.trim().to_lowercase())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or(defaults.share.allowed_extensions),
            },
            sweep: SweepConfig {
                interval_secs: env_parse("SWEEP_INTERVAL_SECS", defaults.sweep.interval_secs),
                session_stale_hours: env_parse(
                    "SESSION_STALE_HOURS",
                    defaults.sweep.session_stale_hours,
                ),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.share.id_len, 16);
        assert_eq!(config.share.allowed_extensions, vec!["zip", "rar"]);
        assert!(config.share.chunk_size > 0);
        assert!(config.share.ttl_hours > 0);
    }
}
