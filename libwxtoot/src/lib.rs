//! wxtoot - weather station observations posted to Mastodon
//!
//! This library renders station records through `{field:format}` templates,
//! gathers graph images and posts the result to a Mastodon instance with
//! bounded retries.

pub mod config;
pub mod error;
pub mod format;
pub mod images;
pub mod logging;
pub mod message;
pub mod ordinal;
pub mod platforms;
pub mod poster;
pub mod service;
pub mod types;
pub mod units;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, WxTootError};
pub use format::{FormatEngine, RenderOptions, Template};
pub use images::{CollectedImage, ImageCollector, ImageSet};
pub use message::MessageBuilder;
pub use poster::{PostOutcome, Poster, RetryPolicy};
pub use service::{Destination, RecordQueue, Worker};
pub use types::{Binding, ObservationValue, Record, StatusRequest, Visibility};
