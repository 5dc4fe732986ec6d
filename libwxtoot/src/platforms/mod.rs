//! Posting destinations
//!
//! A [`Platform`] uploads media and publishes statuses. The Mastodon client
//! talks to a real instance; the mock is scriptable and counts every call so
//! retry behaviour can be checked without network access.

use async_trait::async_trait;

use crate::error::Result;
use crate::images::CollectedImage;
use crate::types::{ImageMimeType, StatusRequest};

pub mod mastodon;

// Available outside tests so integration tests and binaries can use it
pub mod mock;

/// Unified interface for a status-posting service
#[async_trait]
pub trait Platform: Send + Sync {
    /// Verify credentials with the service
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` when the credentials are rejected.
    async fn authenticate(&mut self) -> Result<()>;

    /// Upload one image and return the media id to attach to a status
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Media` when the file cannot be read or the
    /// upload is rejected, `PlatformError::Network` on transport failures.
    async fn upload_media(&self, image: &CollectedImage) -> Result<String>;

    /// Publish a status and return its id
    async fn post_status(&self, request: &StatusRequest) -> Result<String>;

    /// Lowercase identifier (e.g. "mastodon")
    fn name(&self) -> &str;

    /// Maximum media attachments per status. Default is 4 (Mastodon limit).
    fn max_attachments(&self) -> usize {
        4
    }

    fn supported_mime_types(&self) -> Vec<ImageMimeType> {
        vec![
            ImageMimeType::Jpeg,
            ImageMimeType::Png,
            ImageMimeType::Gif,
            ImageMimeType::WebP,
        ]
    }
}
