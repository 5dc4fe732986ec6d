//! Mastodon platform implementation
//!
//! Media uploads and status posts go through the megalodon library, so any
//! server speaking the Mastodon API (Pleroma, Akkoma, GoToSocial) works too.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use megalodon::entities::{StatusVisibility, UploadMedia};
use megalodon::megalodon::{PostStatusInputOptions, PostStatusOutput, UploadMediaInputOptions};
use megalodon::{Megalodon, SNS};
use tracing::debug;

use crate::config::MastodonConfig;
use crate::error::{PlatformError, Result};
use crate::images::CollectedImage;
use crate::platforms::Platform;
use crate::types::{StatusRequest, Visibility};

/// Mastodon platform client
pub struct MastodonClient {
    client: Box<dyn Megalodon + Send + Sync>,

    /// The instance URL (e.g., "https://mastodon.social")
    instance_url: String,

    /// Upper bound on every request
    timeout: Duration,
}

impl MastodonClient {
    /// Create a new Mastodon client
    ///
    /// # Arguments
    ///
    /// * `instance_url` - Base URL of the instance (e.g., "https://mastodon.social")
    /// * `access_token` - OAuth access token for the posting account
    /// * `timeout` - Limit applied to each upload and post request
    pub fn new(instance_url: String, access_token: String, timeout: Duration) -> Result<Self> {
        let client = megalodon::generator(
            SNS::Mastodon,
            instance_url.clone(),
            Some(access_token),
            None,
        )
        .map_err(|e| {
            PlatformError::Authentication(format!("Failed to create Mastodon client: {:?}", e))
        })?;

        Ok(Self {
            client,
            instance_url,
            timeout,
        })
    }

    /// Create a Mastodon client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is missing, or no token can be found
    /// in the config or the token file.
    pub fn from_config(config: &MastodonConfig, timeout: Duration) -> Result<Self> {
        let instance_url = config.instance_url()?;
        let token = config.resolve_token()?;
        Self::new(instance_url, token, timeout)
    }

    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    async fn with_timeout<T, F>(&self, context: &str, request: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, megalodon::error::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(|e| map_megalodon_error(e, context).into()),
            Err(_) => Err(PlatformError::Network(format!(
                "Mastodon request timed out after {}s ({})",
                self.timeout.as_secs(),
                context
            ))
            .into()),
        }
    }
}

fn status_visibility(visibility: Visibility) -> StatusVisibility {
    match visibility {
        Visibility::Public => StatusVisibility::Public,
        Visibility::Unlisted => StatusVisibility::Unlisted,
        Visibility::Private => StatusVisibility::Private,
        Visibility::Direct => StatusVisibility::Direct,
    }
}

#[async_trait]
impl Platform for MastodonClient {
    async fn authenticate(&mut self) -> Result<()> {
        self.with_timeout("authenticate", self.client.verify_account_credentials())
            .await?;
        Ok(())
    }

    async fn upload_media(&self, image: &CollectedImage) -> Result<String> {
        if !image.path.is_file() {
            return Err(PlatformError::Media(format!(
                "{} does not exist",
                image.path.display()
            ))
            .into());
        }

        let options = UploadMediaInputOptions {
            description: image.description.clone(),
            ..Default::default()
        };
        let path = image.path.to_string_lossy().into_owned();
        debug!("uploading {} ({})", path, image.mime_type);

        let response = self
            .with_timeout(
                "upload media",
                self.client.upload_media(path, Some(&options)),
            )
            .await?;

        // Large files are processed asynchronously but the id is usable right away
        let media_id = match response.json {
            UploadMedia::Attachment(attachment) => attachment.id,
            UploadMedia::AsyncAttachment(attachment) => attachment.id,
        };
        Ok(media_id)
    }

    async fn post_status(&self, request: &StatusRequest) -> Result<String> {
        if request.status.trim().is_empty() {
            return Err(PlatformError::Validation("Status cannot be empty".to_string()).into());
        }

        let options = PostStatusInputOptions {
            media_ids: if request.media_ids.is_empty() {
                None
            } else {
                Some(request.media_ids.clone())
            },
            visibility: Some(status_visibility(request.visibility)),
            sensitive: Some(false),
            ..Default::default()
        };

        let response = self
            .with_timeout(
                "post status",
                self.client
                    .post_status(request.status.clone(), Some(&options)),
            )
            .await?;

        let post_id = match response.json {
            PostStatusOutput::Status(status) => status.id,
            PostStatusOutput::ScheduledStatus(scheduled) => scheduled.id,
        };

        Ok(post_id)
    }

    fn name(&self) -> &str {
        "mastodon"
    }
}

/// Map megalodon errors to PlatformError
///
/// - HTTP 401/403 → `PlatformError::Authentication`
/// - HTTP 422 → `PlatformError::Validation`
/// - HTTP 429 → `PlatformError::RateLimit`
/// - HTTP 5xx and other HTTP codes → `PlatformError::Network`
/// - Without a status code the message text decides
fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> PlatformError {
    classify_error(&error.to_string(), context)
}

fn classify_error(error_str: &str, context: &str) -> PlatformError {
    let error_lower = error_str.to_lowercase();

    match extract_http_status(error_str) {
        Some(401) | Some(403) => PlatformError::Authentication(format!(
            "Mastodon authentication failed ({}): {}. \
                    Suggestion: Verify your access token is valid and has write scope.",
            context, error_str
        )),
        Some(422) => PlatformError::Validation(format!(
            "Mastodon validation failed ({}): {}",
            context, error_str
        )),
        Some(429) => PlatformError::RateLimit(format!(
            "Mastodon rate limit exceeded ({}): {}",
            context, error_str
        )),
        Some(500..=599) => PlatformError::Network(format!(
            "Mastodon server error ({}): {}",
            context, error_str
        )),
        Some(_) => {
            PlatformError::Network(format!("Mastodon HTTP error ({}): {}", context, error_str))
        }
        None => {
            if error_lower.contains("unauthorized")
                || error_lower.contains("forbidden")
                || error_lower.contains("authentication")
            {
                PlatformError::Authentication(format!(
                    "Mastodon authentication failed ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("rate limit")
                || error_lower.contains("too many requests")
            {
                PlatformError::RateLimit(format!(
                    "Mastodon rate limit exceeded ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("validation") || error_lower.contains("unprocessable")
            {
                PlatformError::Validation(format!(
                    "Mastodon validation failed ({}): {}",
                    context, error_str
                ))
            } else if context.contains("media") {
                PlatformError::Media(format!("{}: {}", context, error_str))
            } else if error_lower.contains("parse")
                || error_lower.contains("json")
                || error_lower.contains("deserialize")
            {
                PlatformError::Posting(format!(
                    "Mastodon response parse error ({}): {}",
                    context, error_str
                ))
            } else {
                PlatformError::Network(format!(
                    "Mastodon error ({}): {}. \
                        Suggestion: Check your network connection and instance availability.",
                    context, error_str
                ))
            }
        }
    }
}

/// Extract an HTTP status code from an error message
///
/// Looks for patterns like "HTTP 401", "status 403", "401:".
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code) = after_prefix.get(0..3).and_then(|s| s.parse::<u16>().ok()) {
                if (100..=599).contains(&code) {
                    return Some(code);
                }
            }
        }
    }

    // standalone three digits followed by ':' or ' '
    let bytes = error_str.as_bytes();
    for (i, window) in bytes.windows(4).enumerate() {
        if window[..3].iter().all(u8::is_ascii_digit) && (window[3] == b':' || window[3] == b' ')
        {
            if i > 0 && bytes[i - 1].is_ascii_digit() {
                continue;
            }
            let code = std::str::from_utf8(&window[..3])
                .ok()
                .and_then(|s| s.parse::<u16>().ok());
            if let Some(code) = code.filter(|c| (100..=599).contains(c)) {
                return Some(code);
            }
        }
    }

    None
}
