//! Image collection for posts
//!
//! Every post attempt gathers a fresh [`ImageSet`] from up to three sources,
//! in precedence order:
//!
//! 1. an image fetched from an HTTP server (written to a scratch file),
//! 2. explicitly named files inside the image directory, or, when no names
//!    are configured, a sorted scan of that directory,
//!
//! truncated to [`MAX_IMAGES`]. A failing source is logged and skipped; only
//! a missing image directory is fatal, and that is caught at startup.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::ImagesConfig;
use crate::error::{ConfigError, ImageError, Result};
use crate::types::ImageMimeType;

/// Media attachments allowed per status
pub const MAX_IMAGES: usize = 4;

/// File name prefix of fetched server images; excluded from directory scans
pub const SCRATCH_PREFIX: &str = "wxgraphic";

/// One image ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedImage {
    pub path: PathBuf,
    pub mime_type: ImageMimeType,
    /// Alt text sent with the upload
    pub description: Option<String>,
}

impl CollectedImage {
    fn from_path(path: PathBuf) -> Option<Self> {
        let mime_type = ImageMimeType::from_path(&path)?;
        let description = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Some(Self {
            path,
            mime_type,
            description,
        })
    }
}

/// Where the images of a set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Server,
    Named,
    Directory,
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Server => write!(f, "With server image"),
            ImageSource::Named => write!(f, "With named images"),
            ImageSource::Directory => write!(f, "With unnamed images"),
        }
    }
}

/// Images gathered for one post attempt
///
/// Owns the scratch file of a server fetch and removes it when dropped.
#[derive(Debug, Default)]
pub struct ImageSet {
    images: Vec<CollectedImage>,
    sources: Vec<ImageSource>,
    scratch: Option<PathBuf>,
}

impl ImageSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn images(&self) -> &[CollectedImage] {
        &self.images
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectedImage> {
        self.images.iter()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn sources(&self) -> &[ImageSource] {
        &self.sources
    }

    fn push_source(&mut self, source: ImageSource, images: Vec<CollectedImage>) {
        if !images.is_empty() {
            self.sources.push(source);
        }
        self.images.extend(images);
    }
}

impl Drop for ImageSet {
    fn drop(&mut self) {
        if let Some(scratch) = self.scratch.take() {
            if let Err(e) = std::fs::remove_file(&scratch) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("could not remove {}: {}", scratch.display(), e);
                }
            }
        }
    }
}

/// Gathers the images attached to each post
#[derive(Debug, Clone)]
pub struct ImageCollector {
    server_url: Option<String>,
    directory: Option<PathBuf>,
    names: Vec<String>,
    scratch_path: PathBuf,
    client: reqwest::Client,
}

impl ImageCollector {
    /// Build a collector from configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ImageDirectory` when the image directory does
    /// not exist or is not a directory.
    pub fn new(config: &ImagesConfig, timeout: Duration) -> Result<Self> {
        let directory = config.directory_path()?;
        if let Some(dir) = &directory {
            if !dir.is_dir() {
                return Err(ConfigError::ImageDirectory(dir.display().to_string()).into());
            }
        }

        // unique per collector so concurrent destinations never share a file
        let scratch_dir = directory.clone().unwrap_or_else(std::env::temp_dir);
        let scratch_path =
            scratch_dir.join(format!("{}-{}.png", SCRATCH_PREFIX, uuid::Uuid::new_v4()));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImageError::Fetch {
                url: config.server_url.clone().unwrap_or_default(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            server_url: config.server_url.clone(),
            directory,
            names: config.names.clone(),
            scratch_path,
            client,
        })
    }

    pub fn scratch_path(&self) -> &Path {
        &self.scratch_path
    }

    /// Gather images for one attempt, at most [`MAX_IMAGES`]
    pub async fn collect(&self) -> ImageSet {
        let mut set = ImageSet::empty();

        if let Some(url) = &self.server_url {
            match self.fetch(url).await {
                Ok(()) => {
                    debug!("Image server fetched {}", self.scratch_path.display());
                    let image = CollectedImage {
                        path: self.scratch_path.clone(),
                        mime_type: ImageMimeType::Png,
                        description: Some("weather graphic".to_string()),
                    };
                    set.scratch = Some(self.scratch_path.clone());
                    set.push_source(ImageSource::Server, vec![image]);
                }
                Err(e) => warn!("Skipping server image: {}", e),
            }
        }

        if let Some(dir) = &self.directory {
            if !self.names.is_empty() {
                set.push_source(ImageSource::Named, self.named_images(dir));
            } else {
                match scan_directory(dir).await {
                    Ok(images) => set.push_source(ImageSource::Directory, images),
                    Err(e) => warn!("image directory scan of {} failed: {}", dir.display(), e),
                }
            }
        }

        set.images.truncate(MAX_IMAGES);
        debug!("number of images for upload {}", set.len());
        set
    }

    /// Stream the server image into the scratch file; only HTTP 200 counts.
    async fn fetch(&self, url: &str) -> std::result::Result<(), ImageError> {
        let fetch_error = |e: reqwest::Error| ImageError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ImageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let file = tokio::fs::File::create(&self.scratch_path).await?;
        if let Err(e) = write_body(file, response).await {
            let _ = tokio::fs::remove_file(&self.scratch_path).await;
            return Err(match e {
                BodyError::Stream(e) => fetch_error(e),
                BodyError::Io(e) => ImageError::Io(e),
            });
        }
        Ok(())
    }

    /// Named files in the given order; missing files are dropped at upload.
    fn named_images(&self, dir: &Path) -> Vec<CollectedImage> {
        self.names
            .iter()
            .filter_map(|name| {
                let path = dir.join(name);
                let image = CollectedImage::from_path(path);
                if image.is_none() {
                    warn!("Skipping {}: not a supported image type", name);
                }
                image
            })
            .collect()
    }
}

enum BodyError {
    Stream(reqwest::Error),
    Io(std::io::Error),
}

/// Copy the response body into `file`; the caller removes the file on error.
async fn write_body(
    mut file: tokio::fs::File,
    response: reqwest::Response,
) -> std::result::Result<(), BodyError> {
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(BodyError::Stream)?;
        file.write_all(&chunk).await.map_err(BodyError::Io)?;
    }
    file.flush().await.map_err(BodyError::Io)?;
    Ok(())
}

/// `wxgraphic.png` or a collector's `wxgraphic-<uuid>.png`
pub fn is_scratch_name(name: &str) -> bool {
    if name == format!("{}.png", SCRATCH_PREFIX) {
        return true;
    }
    name.strip_prefix(SCRATCH_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.strip_suffix(".png"))
        .is_some_and(|id| uuid::Uuid::parse_str(id).is_ok())
}

/// Supported images directly inside `dir`, sorted by file name
async fn scan_directory(dir: &Path) -> std::io::Result<Vec<CollectedImage>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_scratch = path
            .file_name()
            .map(|name| is_scratch_name(&name.to_string_lossy()))
            .unwrap_or(true);
        if is_scratch || !entry.file_type().await?.is_file() {
            continue;
        }
        paths.push(path);
    }

    paths.sort();
    if !paths.is_empty() {
        info!("image directory holds {} candidate(s)", paths.len());
    }
    Ok(paths
        .into_iter()
        .filter_map(CollectedImage::from_path)
        .collect())
}
