//! Remote object store access.
//!
//! [`ObjectBackend`] is the protocol seam: [`WebDavBackend`] talks to a real
//! WebDAV server and [`MemoryBackend`] keeps objects in process. The
//! [`RemoteAdapter`] wraps a backend with path and URL composition, logging,
//! and the `exists` semantics the orchestrator and jobs rely on.

mod memory;
mod webdav;

pub use memory::MemoryBackend;
pub use webdav::WebDavBackend;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use imgrelay_core::config::RemoteConfig;
use imgrelay_core::Result;
use parking_lot::Mutex;

/// Minimal object protocol: overwrite, existence check, delete.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Store `body` at `path`, replacing any existing object.
    async fn put(&self, path: &str, body: Bytes) -> Result<()>;

    /// `Ok(true)` if present, `Ok(false)` if definitively absent.
    async fn head(&self, path: &str) -> Result<bool>;

    /// Remove the object. An already absent object is not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Create the collection at `path` if the protocol has such a notion.
    async fn ensure_collection(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    /// Base URL objects are addressed under.
    fn base_url(&self) -> &str;
}

/// Compose `base` and `path` with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Wraps an [`ObjectBackend`] with the relay's path layout.
pub struct RemoteAdapter {
    backend: Arc<dyn ObjectBackend>,
    prefix: String,
    public_base_url: String,
    last_error: Mutex<Option<String>>,
}

impl RemoteAdapter {
    /// `prefix` is the collection objects live in; `public_base_url`
    /// defaults to the backend's base URL.
    pub fn new(
        backend: Arc<dyn ObjectBackend>,
        prefix: &str,
        public_base_url: Option<String>,
    ) -> Self {
        let public_base_url = public_base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| backend.base_url().to_string());
        let prefix = prefix.trim_matches('/');
        Self {
            backend,
            prefix: if prefix.is_empty() {
                String::new()
            } else {
                format!("/{prefix}")
            },
            public_base_url,
            last_error: Mutex::new(None),
        }
    }

    /// Adapter over a [`WebDavBackend`] built from config.
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let backend = WebDavBackend::new(config)?;
        Ok(Self::new(
            Arc::new(backend),
            &config.prefix,
            config.public_base_url.clone(),
        ))
    }

    /// Remote path for a file in the configured prefix.
    pub fn object_path(&self, filename: &str) -> String {
        format!("{}/{}", self.prefix, filename.trim_start_matches('/'))
    }

    /// Public URL of an object.
    pub fn object_url(&self, remote_path: &str) -> String {
        join_url(&self.public_base_url, remote_path)
    }

    /// Create the prefix collection. Failure is logged, not returned.
    pub async fn ensure_prefix(&self) {
        if self.prefix.is_empty() {
            return;
        }
        match self.backend.ensure_collection(&self.prefix).await {
            Ok(()) => tracing::debug!(prefix = %self.prefix, "remote collection ready"),
            Err(e) => tracing::warn!(prefix = %self.prefix, error = %e, "failed to create remote collection"),
        }
    }

    /// Upload an object, overwriting.
    pub async fn put(&self, path: &str, body: Bytes) -> Result<()> {
        let size = body.len();
        match self.backend.put(path, body).await {
            Ok(()) => {
                tracing::info!(path, size, "uploaded object");
                Ok(())
            }
            Err(e) => {
                tracing::error!(path, error = %e, "upload failed");
                Err(e)
            }
        }
    }

    /// Whether the object exists. A failed check is logged, kept as
    /// [`last_error`](Self::last_error) and reported as `false`.
    pub async fn exists(&self, path: &str) -> bool {
        self.probe(path).await.unwrap_or(false)
    }

    /// Existence check that keeps an unreachable store distinct from a
    /// missing object.
    pub async fn probe(&self, path: &str) -> Result<bool> {
        match self.backend.head(path).await {
            Ok(present) => {
                *self.last_error.lock() = None;
                Ok(present)
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "existence check failed");
                *self.last_error.lock() = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Delete an object. An already absent object counts as deleted.
    pub async fn delete(&self, path: &str) -> Result<()> {
        match self.backend.delete(path).await {
            Ok(()) => {
                tracing::info!(path, "deleted object");
                Ok(())
            }
            Err(e) => {
                tracing::error!(path, error = %e, "delete failed");
                Err(e)
            }
        }
    }

    /// The failure from the most recent existence check, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use imgrelay_core::Error;

    fn adapter(backend: Arc<MemoryBackend>) -> RemoteAdapter {
        RemoteAdapter::new(backend, "/images/", None)
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://dav.example.com/webdav/", "/images/a.png"),
            "https://dav.example.com/webdav/images/a.png"
        );
        assert_eq!(
            join_url("https://dav.example.com", "images/a.png"),
            "https://dav.example.com/images/a.png"
        );
        assert_eq!(
            join_url("https://dav.example.com//", "//a.png"),
            "https://dav.example.com/a.png"
        );
    }

    #[test]
    fn object_paths_and_urls() {
        let backend = Arc::new(MemoryBackend::new("https://dav.example.com/root/"));
        let remote = adapter(backend.clone());
        assert_eq!(remote.object_path("ab12cd34.png"), "/images/ab12cd34.png");
        assert_eq!(
            remote.object_url("/images/ab12cd34.png"),
            "https://dav.example.com/root/images/ab12cd34.png"
        );

        let bare = RemoteAdapter::new(backend, "", Some("https://cdn.example.com".into()));
        assert_eq!(bare.object_path("x.png"), "/x.png");
        assert_eq!(bare.object_url("/x.png"), "https://cdn.example.com/x.png");
    }

    #[tokio::test]
    async fn put_exists_delete() {
        let backend = Arc::new(MemoryBackend::new("https://dav.example.com"));
        let remote = adapter(backend.clone());

        assert!(!remote.exists("/images/a.png").await);
        remote
            .put("/images/a.png", Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert!(remote.exists("/images/a.png").await);
        assert!(remote.last_error().is_none());

        remote.delete("/images/a.png").await.unwrap();
        assert!(!remote.exists("/images/a.png").await);
        // Deleting again is fine.
        remote.delete("/images/a.png").await.unwrap();
    }

    #[tokio::test]
    async fn failed_check_is_false_with_last_error() {
        let backend = Arc::new(MemoryBackend::new("https://dav.example.com"));
        let remote = adapter(backend.clone());
        remote
            .put("/images/a.png", Bytes::from_static(b"png"))
            .await
            .unwrap();

        backend.fail_heads(true);
        assert!(!remote.exists("/images/a.png").await);
        assert!(remote.last_error().is_some());
        assert_matches!(
            remote.probe("/images/a.png").await,
            Err(Error::RemoteUnavailable(_))
        );

        backend.fail_heads(false);
        assert!(remote.exists("/images/a.png").await);
        assert!(remote.last_error().is_none());
    }

    #[tokio::test]
    async fn put_and_delete_failures_propagate() {
        let backend = Arc::new(MemoryBackend::new("https://dav.example.com"));
        let remote = adapter(backend.clone());

        backend.fail_puts(true);
        assert_matches!(
            remote.put("/images/a.png", Bytes::new()).await,
            Err(Error::RemoteUnavailable(_))
        );
        assert!(backend.is_empty());

        backend.fail_deletes(true);
        assert_matches!(
            remote.delete("/images/a.png").await,
            Err(Error::RemoteUnavailable(_))
        );
    }
}
