//! Mock platform implementation for testing
//!
//! A scriptable stand-in for a Mastodon instance. It can fail a given number
//! of uploads or posts before succeeding, and records every call so retry
//! counts and attached media can be verified without network access.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::images::CollectedImage;
use crate::platforms::Platform;
use crate::types::StatusRequest;

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,

    /// Error returned by `authenticate`, if any
    pub auth_error: Option<PlatformError>,

    /// Number of uploads that fail before uploads start succeeding
    pub upload_failures: usize,
    pub upload_error: PlatformError,

    /// Number of posts that fail before posts start succeeding
    pub post_failures: usize,
    pub post_error: PlatformError,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    pub auth_call_count: Arc<Mutex<usize>>,
    pub upload_call_count: Arc<Mutex<usize>>,
    pub post_call_count: Arc<Mutex<usize>>,

    /// Files that were uploaded, in order
    pub uploaded: Arc<Mutex<Vec<PathBuf>>>,

    /// Statuses that were published
    pub posted: Arc<Mutex<Vec<StatusRequest>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            auth_error: None,
            upload_failures: 0,
            upload_error: PlatformError::Media("Mock upload failed".to_string()),
            post_failures: 0,
            post_error: PlatformError::Posting("Mock posting failed".to_string()),
            delay: Duration::from_millis(0),
            auth_call_count: Arc::new(Mutex::new(0)),
            upload_call_count: Arc::new(Mutex::new(0)),
            post_call_count: Arc::new(Mutex::new(0)),
            uploaded: Arc::new(Mutex::new(Vec::new())),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
///
/// Cloning shares the call counters, so a test can keep a handle while the
/// poster owns the platform.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform whose status posts always fail with `error`
    pub fn post_failure(name: &str, error: PlatformError) -> Self {
        Self::flaky_post(name, usize::MAX, error)
    }

    /// Create a mock platform that fails `failures` posts, then succeeds
    pub fn flaky_post(name: &str, failures: usize, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_failures: failures,
            post_error: error,
            ..Default::default()
        })
    }

    /// Create a mock platform whose media uploads always fail
    pub fn upload_failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            upload_failures: usize::MAX,
            upload_error: error,
            ..Default::default()
        })
    }

    /// Create a mock platform that rejects its credentials
    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_error: Some(PlatformError::Authentication(error.to_string())),
            ..Default::default()
        })
    }

    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    pub fn auth_call_count(&self) -> usize {
        *self.config.auth_call_count.lock().unwrap()
    }

    pub fn upload_call_count(&self) -> usize {
        *self.config.upload_call_count.lock().unwrap()
    }

    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.config.uploaded.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<StatusRequest> {
        self.config.posted.lock().unwrap().clone()
    }

    async fn simulate_latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn authenticate(&mut self) -> Result<()> {
        *self.config.auth_call_count.lock().unwrap() += 1;
        self.simulate_latency().await;

        match &self.config.auth_error {
            Some(error) => Err(error.clone().into()),
            None => Ok(()),
        }
    }

    async fn upload_media(&self, image: &CollectedImage) -> Result<String> {
        let call = {
            let mut count = self.config.upload_call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.simulate_latency().await;

        if call <= self.config.upload_failures {
            return Err(self.config.upload_error.clone().into());
        }

        self.config.uploaded.lock().unwrap().push(image.path.clone());
        Ok(format!("{}:media-{}", self.config.name, call))
    }

    async fn post_status(&self, request: &StatusRequest) -> Result<String> {
        let call = {
            let mut count = self.config.post_call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.simulate_latency().await;

        if call <= self.config.post_failures {
            return Err(self.config.post_error.clone().into());
        }

        self.config.posted.lock().unwrap().push(request.clone());
        Ok(format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()))
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WxTootError;
    use crate::types::{ImageMimeType, Visibility};

    fn request(text: &str) -> StatusRequest {
        StatusRequest {
            status: text.to_string(),
            media_ids: vec![],
            visibility: Visibility::Unlisted,
        }
    }

    fn image(path: &str) -> CollectedImage {
        CollectedImage {
            path: PathBuf::from(path),
            mime_type: ImageMimeType::Png,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_mock_success() {
        let mut platform = MockPlatform::success("test");
        platform.authenticate().await.unwrap();
        assert_eq!(platform.auth_call_count(), 1);

        let media_id = platform.upload_media(&image("/tmp/a.png")).await.unwrap();
        assert_eq!(media_id, "test:media-1");

        let post_id = platform.post_status(&request("Test content")).await.unwrap();
        assert!(post_id.starts_with("test:mock-"));
        assert_eq!(platform.post_call_count(), 1);
        assert_eq!(platform.posted()[0].status, "Test content");
        assert_eq!(platform.uploaded(), vec![PathBuf::from("/tmp/a.png")]);
    }

    #[tokio::test]
    async fn test_mock_flaky_post_recovers() {
        let platform =
            MockPlatform::flaky_post("test", 2, PlatformError::Network("timeout".to_string()));

        assert!(platform.post_status(&request("one")).await.is_err());
        assert!(platform.post_status(&request("two")).await.is_err());
        assert!(platform.post_status(&request("three")).await.is_ok());
        assert_eq!(platform.post_call_count(), 3);
        assert_eq!(platform.posted().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_upload_failure() {
        let platform =
            MockPlatform::upload_failure("test", PlatformError::Media("too big".to_string()));
        let result = platform.upload_media(&image("/tmp/a.png")).await;
        assert!(matches!(
            result,
            Err(WxTootError::Platform(PlatformError::Media(_)))
        ));
        assert!(platform.uploaded().is_empty());
    }

    #[tokio::test]
    async fn test_mock_auth_failure() {
        let mut platform = MockPlatform::auth_failure("test", "Invalid credentials");
        let err = platform.authenticate().await.unwrap_err();
        assert!(err.to_string().contains("Invalid credentials"));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let platform = MockPlatform::success("test");
        let handle = platform.clone();
        platform.post_status(&request("x")).await.unwrap();
        assert_eq!(handle.post_call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let platform = MockPlatform::with_delay("test", Duration::from_millis(30));
        let start = std::time::Instant::now();
        platform.post_status(&request("x")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
