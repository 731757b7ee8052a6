//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates a temp directory holding a
//! file-backed WAL database and the cache directory, a complete config, an
//! in-memory remote backend, and the full [`AppContext`].

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use imgrelay::context::AppContext;
use imgrelay::images::UploadRequest;
use imgrelay::remote::MemoryBackend;
use imgrelay_core::config::Config;
use tempfile::TempDir;

pub const KEY: &str = "8f2c5d0e6a1b4c3d9e7f0a2b4c6d8e0f1a3b5c7d9e1f3a5b7c9d1e3f5a7b9c1d";
pub const IV: &str = "0123456789abcdef0123456789abcdef";
pub const REMOTE_BASE: &str = "https://dav.example.com/remote.php/webdav";

/// A complete configuration rooted in `dir`.
pub fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.db_path = dir.join("data").join("imgrelay.db");
    config.storage.cache_dir = dir.join("cache");
    config.token.encryption_key = Some(KEY.into());
    config.token.encryption_iv = Some(IV.into());
    config.remote.url = REMOTE_BASE.into();
    config.remote.username = Some("relay".into());
    config.remote.password = Some("secret".into());
    config
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub backend: Arc<MemoryBackend>,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Build with a customised configuration.
    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = test_config(dir.path());
        tweak(&mut config);

        let backend = Arc::new(MemoryBackend::new(REMOTE_BASE));
        let ctx = AppContext::with_backend(config, backend.clone())
            .expect("failed to build context");

        Self { ctx, backend, dir }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.ctx.config.storage.cache_dir.clone()
    }

    /// Write `bytes` to a fresh staging file and describe it as an upload.
    pub fn staged(&self, original_name: &str, bytes: &[u8]) -> UploadRequest {
        let staging = self.dir.path().join("staging");
        std::fs::create_dir_all(&staging).expect("failed to create staging dir");
        let path = staging.join(format!("upload-{}.tmp", rand_suffix()));
        std::fs::write(&path, bytes).expect("failed to write staged file");

        UploadRequest {
            temp_path: path,
            original_name: original_name.to_string(),
            mime_type: None,
        }
    }

    /// Files currently in the cache directory.
    pub fn cached_files(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(self.cache_dir()) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

fn rand_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}
