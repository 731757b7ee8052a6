//! Image relay operations.
//!
//! [`ImageService`] composes the token codec, the metadata store, the
//! remote adapter and the [`LocalCache`] into upload, fetch, delete and
//! list.

mod cache;
mod service;

pub use cache::{extension_of, mime_for_extension, resolve_mime, LocalCache, DEFAULT_MIME};
pub use service::{
    ImageList, ImageService, ImageView, Pagination, RemoteStatus, UploadRequest, UploadedImage,
};
