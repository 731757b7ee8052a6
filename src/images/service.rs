//! Image service coordinating the cache, the remote store and metadata.
//!
//! The three resources fail independently, so every operation orders its
//! steps such that a committed metadata record always implies a completed
//! remote write. Leftovers from aborted uploads live only in the cache and
//! are collected by the orphan sweep.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use imgrelay_core::config::UploadConfig;
use imgrelay_core::{Error, ImageId, Result};
use imgrelay_db::models::{ImageRecord, ListQuery, NewImage, RequestInfo};
use serde::Serialize;

use super::cache::{extension_of, resolve_mime, LocalCache};
use crate::remote::RemoteAdapter;
use crate::store::MetadataStore;
use crate::token::{GeneratedName, TokenCodec, MARKER};

/// A file the caller has already received and staged on disk.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub temp_path: PathBuf,
    pub original_name: String,
    /// Declared content type; guessed from the extension when absent.
    pub mime_type: Option<String>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedImage {
    pub id: ImageId,
    pub internal_filename: String,
    pub public_token: String,
    pub public_filename: String,
    pub url: String,
    pub size: u64,
    pub mime_type: String,
}

/// What a fetch by token returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageView {
    pub id: ImageId,
    pub internal_filename: String,
    pub public_token: String,
    pub url: String,
    pub size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    /// Includes the access that produced this view when it was recorded.
    pub access_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageList {
    pub items: Vec<ImageRecord>,
    pub pagination: Pagination,
}

/// Remote state of one record's object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RemoteStatus {
    Present,
    Missing,
    Unreachable(String),
}

/// Upload, fetch, delete and list images.
pub struct ImageService {
    codec: Arc<TokenCodec>,
    store: MetadataStore,
    remote: Arc<RemoteAdapter>,
    cache: LocalCache,
    upload: UploadConfig,
}

impl ImageService {
    pub fn new(
        codec: Arc<TokenCodec>,
        store: MetadataStore,
        remote: Arc<RemoteAdapter>,
        cache: LocalCache,
        upload: UploadConfig,
    ) -> Self {
        Self {
            codec,
            store,
            remote,
            cache,
            upload,
        }
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Pick a name that has never been issued, regenerating on collision.
    async fn fresh_name(&self, extension: Option<&str>) -> Result<GeneratedName> {
        let attempts = self.upload.max_name_attempts.max(1);
        for attempt in 1..=attempts {
            let name = self.codec.generate_name(extension)?;
            if !self
                .store
                .name_in_use(&name.internal_filename, &name.public_token)
                .await?
            {
                return Ok(name);
            }
            tracing::debug!(attempt, name = %name.internal_filename, "generated name taken, retrying");
        }
        Err(Error::Conflict(format!(
            "no unused name after {attempts} attempts"
        )))
    }

    /// Cache the staged file, push it to the remote store, then record it.
    ///
    /// No record is created unless the remote write succeeded. A failed
    /// remote write leaves the cached copy for the orphan sweep.
    pub async fn upload_image(&self, req: UploadRequest) -> Result<UploadedImage> {
        match tokio::fs::metadata(&req.temp_path).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return Err(Error::Validation(format!(
                    "uploaded file not found: {}",
                    req.temp_path.display()
                )))
            }
        }

        let extension = extension_of(&req.original_name);
        let mime_type = resolve_mime(req.mime_type.as_deref(), extension.as_deref());
        let name = self.fresh_name(extension.as_deref()).await?;

        let size = self
            .cache
            .store_from(&req.temp_path, &name.internal_filename)
            .await?;
        if self.upload.remove_temp_file {
            if let Err(e) = tokio::fs::remove_file(&req.temp_path).await {
                tracing::debug!(path = %req.temp_path.display(), error = %e, "could not remove temp file");
            }
        }

        let remote_path = self.remote.object_path(&name.internal_filename);
        let body = self.cache.read(&name.internal_filename).await?;
        self.remote.put(&remote_path, body).await?;

        let url = self.remote.object_url(&remote_path);
        let record = self
            .store
            .create(NewImage {
                internal_filename: name.internal_filename.clone(),
                original_name: req.original_name.clone(),
                public_token: name.public_token.clone(),
                size_bytes: size,
                mime_type: mime_type.clone(),
                remote_path,
                public_url: url.clone(),
            })
            .await?;

        tracing::info!(
            image_id = %record.id,
            name = %record.internal_filename,
            size,
            "image uploaded"
        );

        Ok(UploadedImage {
            id: record.id,
            internal_filename: record.internal_filename,
            public_token: record.public_token,
            public_filename: name.public_filename,
            url,
            size,
            mime_type,
        })
    }

    /// Resolve a public token (optionally with extension) to its image.
    ///
    /// A record whose remote object is gone is [`Error::RemoteDrift`], not
    /// [`Error::NotFound`].
    pub async fn get_image(&self, public_filename: &str, info: RequestInfo) -> Result<ImageView> {
        let token = TokenCodec::strip_extension(public_filename.trim());
        let marked = self.codec.decode(token)?;
        if !marked.ends_with(MARKER) {
            return Err(Error::Validation("token does not identify an image".into()));
        }

        let record = self
            .store
            .get_by_public_token(token)
            .await?
            .ok_or_else(|| Error::not_found("image", token))?;

        if !self.remote.probe(&record.remote_path).await? {
            tracing::warn!(image_id = %record.id, path = %record.remote_path, "remote object missing");
            return Err(Error::remote_drift(record.remote_path));
        }

        let access_count = match self.store.record_access(record.id, info).await {
            Ok(true) => record.access_count + 1,
            Ok(false) => record.access_count,
            Err(e) => {
                tracing::warn!(image_id = %record.id, error = %e, "failed to record access");
                record.access_count
            }
        };

        Ok(ImageView {
            id: record.id,
            internal_filename: record.internal_filename,
            public_token: record.public_token,
            url: record.public_url,
            size: record.size_bytes,
            mime_type: record.mime_type,
            created_at: record.created_at,
            access_count,
        })
    }

    /// Delete remotely, drop the cached copy, then soft-delete the record.
    ///
    /// A remote failure aborts before metadata is touched.
    pub async fn delete_image(&self, id: ImageId) -> Result<bool> {
        let record = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("image", id))?;

        self.remote.delete(&record.remote_path).await?;
        self.drop_cached(&record).await;

        let changed = self.store.soft_delete(id).await?;
        tracing::info!(image_id = %id, "image deleted");
        Ok(changed)
    }

    /// Remove a record and its access history for good.
    ///
    /// A record that is still live has its remote object and cached copy
    /// removed first, as in [`delete_image`](Self::delete_image).
    pub async fn purge_image(&self, id: ImageId) -> Result<bool> {
        if let Some(record) = self.store.get_by_id(id).await? {
            self.remote.delete(&record.remote_path).await?;
            self.drop_cached(&record).await;
        }

        let removed = self.store.hard_delete(id).await?;
        if removed {
            tracing::info!(image_id = %id, "image purged");
        }
        Ok(removed)
    }

    async fn drop_cached(&self, record: &ImageRecord) {
        if let Err(e) = self.cache.remove(&record.internal_filename).await {
            tracing::warn!(image_id = %record.id, error = %e, "failed to remove cached file");
        }
    }

    pub async fn list_images(&self, query: ListQuery) -> Result<ImageList> {
        let query = query.normalized();
        let items = self.store.list(query.clone()).await?;
        let total = self.store.count(query.include_deleted).await?;
        let limit = u64::from(query.limit);

        Ok(ImageList {
            items,
            pagination: Pagination {
                total,
                page: query.page,
                limit: query.limit,
                total_pages: total.div_ceil(limit),
            },
        })
    }

    /// Report whether a live record's object is present remotely.
    pub async fn check_remote(&self, id: ImageId) -> Result<RemoteStatus> {
        let record = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found("image", id))?;

        if self.remote.exists(&record.remote_path).await {
            return Ok(RemoteStatus::Present);
        }
        Ok(match self.remote.last_error() {
            Some(reason) => RemoteStatus::Unreachable(reason),
            None => RemoteStatus::Missing,
        })
    }
}
