//! Application context.
//!
//! [`AppContext`] wires every component from a [`Config`]: the token codec,
//! the metadata store, the remote adapter, the image service and the
//! maintenance scheduler. Handles are `Arc`s so the context is cheap to
//! clone into tasks.

use std::sync::Arc;

use imgrelay_core::config::Config;
use imgrelay_core::Result;
use imgrelay_db::pool::init_pool;

use crate::images::{ImageService, LocalCache};
use crate::maintenance::Scheduler;
use crate::remote::{ObjectBackend, RemoteAdapter};
use crate::store::MetadataStore;
use crate::token::TokenCodec;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub codec: Arc<TokenCodec>,
    pub store: MetadataStore,
    pub remote: Arc<RemoteAdapter>,
    pub images: Arc<ImageService>,
    pub scheduler: Arc<Scheduler>,
}

impl AppContext {
    /// Build the context against the configured WebDAV server.
    ///
    /// Fails with [`imgrelay_core::Error::Config`] when the key material or
    /// remote credentials are missing.
    pub fn init(config: Config) -> Result<Self> {
        config.require_secrets()?;
        let remote = RemoteAdapter::from_config(&config.remote)?;
        Self::with_remote(config, remote)
    }

    /// Build the context over any object backend.
    pub fn with_backend(config: Config, backend: Arc<dyn ObjectBackend>) -> Result<Self> {
        let remote = RemoteAdapter::new(
            backend,
            &config.remote.prefix,
            config.remote.public_base_url.clone(),
        );
        Self::with_remote(config, remote)
    }

    fn with_remote(config: Config, remote: RemoteAdapter) -> Result<Self> {
        config.require_secrets()?;
        let codec = Arc::new(TokenCodec::from_config(&config.token)?);

        if let Some(parent) = config.storage.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db_path = config.storage.db_path.to_string_lossy();
        tracing::info!("Opening database at {db_path}");
        let pool = init_pool(&db_path, config.storage.pool_size)?;
        let store = MetadataStore::new(pool, config.storage.write_retries);

        let remote = Arc::new(remote);
        let cache = LocalCache::new(config.storage.cache_dir.clone());

        let images = Arc::new(ImageService::new(
            codec.clone(),
            store.clone(),
            remote.clone(),
            cache.clone(),
            config.upload.clone(),
        ));
        let scheduler = Arc::new(Scheduler::with_default_jobs(
            &config.maintenance,
            store.clone(),
            cache,
        ));

        Ok(Self {
            config: Arc::new(config),
            codec,
            store,
            remote,
            images,
            scheduler,
        })
    }

    /// Create the cache directory and the remote collection.
    pub async fn prepare(&self) -> Result<()> {
        self.images.cache().ensure_dir().await?;
        self.remote.ensure_prefix().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryBackend;
    use imgrelay_core::Error;

    #[test]
    fn missing_secrets_refuse_to_start() {
        let backend = Arc::new(MemoryBackend::new("https://dav.example.com"));
        assert!(matches!(
            AppContext::with_backend(Config::default(), backend),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            AppContext::init(Config::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn malformed_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.db_path = dir.path().join("db.sqlite");
        config.token.encryption_key = Some("not-hex".into());
        config.token.encryption_iv = Some("00".repeat(16));
        config.remote.url = "https://dav.example.com".into();
        config.remote.username = Some("u".into());
        config.remote.password = Some("p".into());

        let backend = Arc::new(MemoryBackend::new("https://dav.example.com"));
        assert!(matches!(
            AppContext::with_backend(config, backend),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn init_uses_configured_webdav_remote() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.db_path = dir.path().join("data").join("db.sqlite");
        config.storage.cache_dir = dir.path().join("cache");
        config.token.encryption_key = Some("11".repeat(32));
        config.token.encryption_iv = Some("00".repeat(16));
        config.remote.url = "https://dav.example.com/dav/".into();
        config.remote.username = Some("u".into());
        config.remote.password = Some("p".into());

        let ctx = AppContext::init(config).unwrap();
        let path = ctx.remote.object_path("ab12cd34.png");
        assert_eq!(
            ctx.remote.object_url(&path),
            "https://dav.example.com/dav/images/ab12cd34.png"
        );
        assert!(dir.path().join("data").is_dir());
    }
}
