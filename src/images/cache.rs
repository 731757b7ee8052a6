//! Local cache directory holding a copy of each upload.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use imgrelay_core::Result;

/// Longest extension kept from an original filename.
const MAX_EXTENSION_LEN: usize = 10;

/// Fallback when neither the caller nor the extension tells us the type.
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Lowercased extension of `original_name`, if it is short and alphanumeric.
pub fn extension_of(original_name: &str) -> Option<String> {
    let (stem, ext) = original_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// MIME type for a known image extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        _ => return None,
    };
    Some(mime)
}

/// The declared type if present, else a guess from the extension.
pub fn resolve_mime(declared: Option<&str>, ext: Option<&str>) -> String {
    declared
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .or_else(|| ext.and_then(mime_for_extension).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_MIME.to_string())
}

/// Flat directory of cached uploads, keyed by internal filename.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Copy `source` into the cache as `filename`, returning the size.
    pub async fn store_from(&self, source: &Path, filename: &str) -> Result<u64> {
        self.ensure_dir().await?;
        let size = tokio::fs::copy(source, self.path_for(filename)).await?;
        Ok(size)
    }

    pub async fn read(&self, filename: &str) -> Result<Bytes> {
        let data = tokio::fs::read(self.path_for(filename)).await?;
        Ok(Bytes::from(data))
    }

    /// Remove a cached file. `Ok(false)` if it was already gone.
    pub async fn remove(&self, filename: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(filename)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
