use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use imgrelay_core::{Error, Result};
use parking_lot::Mutex;

use super::ObjectBackend;

/// In-process object store with switchable failures.
///
/// Used by the test suites and by the CLI's `--dry-remote` mode.
pub struct MemoryBackend {
    base_url: String,
    objects: Mutex<HashMap<String, Bytes>>,
    fail_puts: AtomicBool,
    fail_heads: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_heads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_heads(&self, fail: bool) {
        self.fail_heads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every operation fail, as if the server were down.
    pub fn set_unavailable(&self, down: bool) {
        self.fail_puts(down);
        self.fail_heads(down);
        self.fail_deletes(down);
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().get(path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().contains_key(path)
    }

    /// Drop an object behind the adapter's back.
    pub fn remove(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().remove(path)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    fn check(flag: &AtomicBool, op: &str, path: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            Err(Error::remote(format!("{op} {path}: injected failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn put(&self, path: &str, body: Bytes) -> Result<()> {
        Self::check(&self.fail_puts, "PUT", path)?;
        self.objects.lock().insert(path.to_string(), body);
        Ok(())
    }

    async fn head(&self, path: &str) -> Result<bool> {
        Self::check(&self.fail_heads, "HEAD", path)?;
        Ok(self.contains(path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        Self::check(&self.fail_deletes, "DELETE", path)?;
        self.objects.lock().remove(path);
        Ok(())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
