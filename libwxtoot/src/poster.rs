//! Posting with bounded retry
//!
//! One attempt collects images, uploads each of them, then creates the
//! status. Any failure discards the attempt and the next one starts over
//! from image collection. After `max_tries` failed attempts the caller gets
//! [`WxTootError::MaxRetriesExceeded`].

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{Config, PostingConfig};
use crate::error::{PlatformError, Result, WxTootError};
use crate::images::ImageCollector;
use crate::platforms::{mastodon::MastodonClient, Platform};
use crate::types::{StatusRequest, Visibility};

/// How often and how patiently a message is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    /// Constant wait between attempts
    pub retry_wait: Duration,
    /// Give up at once on authentication and validation failures
    pub fail_fast_on_auth: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 3,
            retry_wait: Duration::from_secs(5),
            fail_fast_on_auth: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &PostingConfig) -> Self {
        Self {
            max_tries: config.max_tries.max(1),
            retry_wait: config.retry_wait(),
            fail_fast_on_auth: config.fail_fast_on_auth,
        }
    }
}

/// What happened to a message handed to [`Poster::post`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    Posted {
        post_id: String,
        attempts: u32,
        media_count: usize,
    },
    /// Upload is disabled; nothing left the process
    Skipped,
}

/// Uploads media and posts statuses to one platform
pub struct Poster {
    platform: Box<dyn Platform>,
    collector: Option<ImageCollector>,
    visibility: Visibility,
    policy: RetryPolicy,
    skip_upload: bool,
    dev_label: Option<String>,
}

impl Poster {
    pub fn new(platform: Box<dyn Platform>, policy: RetryPolicy) -> Self {
        Self {
            platform,
            collector: None,
            visibility: Visibility::Unlisted,
            policy,
            skip_upload: false,
            dev_label: None,
        }
    }

    pub fn with_collector(mut self, collector: Option<ImageCollector>) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_skip_upload(mut self, skip_upload: bool) -> Self {
        self.skip_upload = skip_upload;
        self
    }

    /// Append a `DEV_MODE` trailer naming the image sources and `label`
    pub fn with_dev_mode(mut self, label: Option<String>) -> Self {
        self.dev_label = label;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    /// Post `message`, retrying whole attempts up to `max_tries` times.
    ///
    /// # Errors
    ///
    /// Returns `WxTootError::MaxRetriesExceeded` when every attempt failed,
    /// or the platform error itself when a permanent failure stops early.
    pub async fn post(&self, message: &str) -> Result<PostOutcome> {
        if self.skip_upload {
            info!("skip_upload is set, not posting");
            debug!("message: {}", message);
            return Ok(PostOutcome::Skipped);
        }

        let max_tries = self.policy.max_tries.max(1);
        let platform_name = self.platform.name().to_string();
        let mut last_error = None;

        for attempt in 1..=max_tries {
            match self.attempt(message).await {
                Ok((post_id, media_count)) => {
                    if attempt > 1 {
                        info!(
                            "Successfully posted to {} on attempt {}",
                            platform_name, attempt
                        );
                    }
                    info!("posted {} with {} image(s)", post_id, media_count);
                    return Ok(PostOutcome::Posted {
                        post_id,
                        attempts: attempt,
                        media_count,
                    });
                }
                Err(e) => {
                    if self.policy.fail_fast_on_auth && e.is_permanent() {
                        warn!("Permanent error posting to {}: {}", platform_name, e);
                        return Err(e.into());
                    }
                    warn!(
                        "Failed to post to {} (attempt {}/{}): {}",
                        platform_name, attempt, max_tries, e
                    );
                    last_error = Some(e);
                    if attempt < max_tries && !self.policy.retry_wait.is_zero() {
                        sleep(self.policy.retry_wait).await;
                    }
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            PlatformError::Posting(format!("Failed to post to {}", platform_name))
        });
        Err(WxTootError::MaxRetriesExceeded {
            tries: max_tries,
            last,
        })
    }

    async fn attempt(&self, message: &str) -> std::result::Result<(String, usize), PlatformError> {
        let images = match &self.collector {
            Some(collector) => collector.collect().await,
            None => Default::default(),
        };

        let mut media_ids = Vec::with_capacity(images.len());
        for image in images.iter().take(self.platform.max_attachments()) {
            if !image.path.is_file() {
                debug!("media is not a file: {}", image.path.display());
                continue;
            }
            let media_id = self
                .platform
                .upload_media(image)
                .await
                .map_err(into_platform_error)?;
            debug!("uploaded {} as {}", image.path.display(), media_id);
            media_ids.push(media_id);
        }

        let mut status = message.to_string();
        if let Some(label) = &self.dev_label {
            let mut trailer = String::from("DEV_MODE");
            for source in images.sources() {
                trailer.push_str(&format!(" : {}", source));
            }
            trailer.push_str(&format!(" : {}", label));
            status.push('\n');
            status.push_str(&trailer);
        }

        let request = StatusRequest {
            status,
            media_ids,
            visibility: self.visibility,
        };
        let post_id = self
            .platform
            .post_status(&request)
            .await
            .map_err(into_platform_error)?;

        Ok((post_id, request.media_ids.len()))
    }
}

fn into_platform_error(error: WxTootError) -> PlatformError {
    match error {
        WxTootError::Platform(e) => e,
        other => PlatformError::Posting(other.to_string()),
    }
}

/// Create the Mastodon client for `config`
pub fn create_platform(config: &Config) -> Result<Box<dyn Platform>> {
    info!("Creating Mastodon platform client");
    let client = MastodonClient::from_config(&config.mastodon, config.posting.timeout())?;
    Ok(Box::new(client))
}

/// Wire a poster for `platform` from configuration
pub fn create_poster(config: &Config, platform: Box<dyn Platform>) -> Result<Poster> {
    let collector = if config.images.is_configured() {
        Some(ImageCollector::new(&config.images, config.posting.timeout())?)
    } else {
        None
    };
    let dev_label = config
        .posting
        .dev_mode
        .then(|| config.format.choice.to_string());

    Ok(Poster::new(platform, RetryPolicy::from_config(&config.posting))
        .with_collector(collector)
        .with_visibility(config.posting.visibility())
        .with_skip_upload(config.posting.skip_upload)
        .with_dev_mode(dev_label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;

    fn policy(max_tries: u32) -> RetryPolicy {
        RetryPolicy {
            max_tries,
            retry_wait: Duration::ZERO,
            fail_fast_on_auth: true,
        }
    }

    fn network_error() -> PlatformError {
        PlatformError::Network("connection reset".to_string())
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let mock = MockPlatform::success("mock");
        let poster = Poster::new(Box::new(mock.clone()), policy(3));

        let outcome = poster.post("hello").await.unwrap();
        match outcome {
            PostOutcome::Posted {
                attempts,
                media_count,
                ..
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(media_count, 0);
            }
            other => panic!("Expected posted, got {:?}", other),
        }
        assert_eq!(mock.post_call_count(), 1);
        let posted = mock.posted();
        assert_eq!(posted[0].status, "hello");
        assert_eq!(posted[0].visibility, Visibility::Unlisted);
    }

    #[tokio::test]
    async fn test_exhausts_exactly_max_tries() {
        let mock = MockPlatform::post_failure("mock", network_error());
        let poster = Poster::new(Box::new(mock.clone()), policy(3));

        let err = poster.post("hello").await.unwrap_err();
        assert_eq!(mock.post_call_count(), 3);
        match err {
            WxTootError::MaxRetriesExceeded { tries, last } => {
                assert_eq!(tries, 3);
                assert!(matches!(last, PlatformError::Network(_)));
            }
            other => panic!("Expected max retries, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let mock = MockPlatform::flaky_post("mock", 2, network_error());
        let poster = Poster::new(Box::new(mock.clone()), policy(3));

        let outcome = poster.post("hello").await.unwrap();
        assert!(matches!(outcome, PostOutcome::Posted { attempts: 3, .. }));
        assert_eq!(mock.post_call_count(), 3);
    }

    #[tokio::test]
    async fn test_single_try_policy() {
        let mock = MockPlatform::post_failure("mock", network_error());
        let poster = Poster::new(Box::new(mock.clone()), policy(1));
        assert!(poster.post("hello").await.is_err());
        assert_eq!(mock.post_call_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_fails_fast() {
        let mock = MockPlatform::post_failure(
            "mock",
            PlatformError::Authentication("HTTP 401".to_string()),
        );
        let poster = Poster::new(Box::new(mock.clone()), policy(3));

        let err = poster.post("hello").await.unwrap_err();
        assert!(matches!(
            err,
            WxTootError::Platform(PlatformError::Authentication(_))
        ));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(mock.post_call_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_retried_when_fail_fast_disabled() {
        let mock = MockPlatform::post_failure(
            "mock",
            PlatformError::Authentication("HTTP 401".to_string()),
        );
        let policy = RetryPolicy {
            fail_fast_on_auth: false,
            ..policy(2)
        };
        let poster = Poster::new(Box::new(mock.clone()), policy);

        let err = poster.post("hello").await.unwrap_err();
        assert!(matches!(err, WxTootError::MaxRetriesExceeded { tries: 2, .. }));
        assert_eq!(mock.post_call_count(), 2);
    }

    #[tokio::test]
    async fn test_skip_upload_makes_no_calls() {
        let mock = MockPlatform::success("mock");
        let poster = Poster::new(Box::new(mock.clone()), policy(3)).with_skip_upload(true);

        assert_eq!(poster.post("hello").await.unwrap(), PostOutcome::Skipped);
        assert_eq!(mock.post_call_count(), 0);
        assert_eq!(mock.upload_call_count(), 0);
    }

    #[tokio::test]
    async fn test_retry_wait_between_attempts() {
        let mock = MockPlatform::post_failure("mock", network_error());
        let policy = RetryPolicy {
            retry_wait: Duration::from_millis(20),
            ..policy(3)
        };
        let poster = Poster::new(Box::new(mock.clone()), policy);

        let start = std::time::Instant::now();
        assert!(poster.post("hello").await.is_err());
        // two waits for three attempts
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_dev_mode_trailer() {
        let mock = MockPlatform::success("mock");
        let poster = Poster::new(Box::new(mock.clone()), policy(1))
            .with_visibility(Visibility::Direct)
            .with_dev_mode(Some("full".to_string()));

        poster.post("hello").await.unwrap();
        let posted = mock.posted();
        assert_eq!(posted[0].status, "hello\nDEV_MODE : full");
        assert_eq!(posted[0].visibility, Visibility::Direct);
    }
}
