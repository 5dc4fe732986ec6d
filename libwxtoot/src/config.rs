//! Configuration management for wxtoot
//!
//! Every recognised option is a field here, with its default applied by serde
//! and checked once by [`Config::validate`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ConfigError, PlatformError, Result};
use crate::format::{RenderOptions, Template};
use crate::message::{builtin_template, MessageSource};
use crate::ordinal::OrdinalTable;
use crate::types::{Binding, FormatChoice, Visibility};
use crate::units::UnitSystem;

pub const CONFIG_ENV: &str = "WXTOOT_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mastodon: MastodonConfig,
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub posting: PostingConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct MastodonConfig {
    /// Instance base URL, e.g. `https://mastodon.social`
    pub instance: Option<String>,
    pub access_token: Option<String>,
    /// File holding the access token, used when `access_token` is unset
    pub token_file: Option<String>,
}

impl fmt::Debug for MastodonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MastodonConfig")
            .field("instance", &self.instance)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "removed for privacy"),
            )
            .field("token_file", &self.token_file)
            .finish()
    }
}

impl MastodonConfig {
    /// Instance URL with an `https://` scheme added when none was given
    pub fn instance_url(&self) -> Result<String> {
        let instance = self
            .instance
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingField("mastodon.instance".to_string()))?;
        let url = if instance.starts_with("http://") || instance.starts_with("https://") {
            instance.to_string()
        } else {
            format!("https://{}", instance)
        };
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Access token from the config, else from `token_file`
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = self.access_token.as_deref().map(str::trim) {
            if !token.is_empty() {
                return Ok(token.to_string());
            }
        }
        let token_file = self
            .token_file
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField("mastodon.access_token".to_string()))?;
        let path = expand_path(token_file)?;
        let token = std::fs::read_to_string(&path)
            .map_err(|e| {
                PlatformError::Authentication(format!(
                    "Failed to read Mastodon token file {}: {}",
                    path.display(),
                    e
                ))
            })?
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(
                PlatformError::Authentication("Mastodon token file is empty".to_string()).into(),
            );
        }
        Ok(token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(default = "default_station_name")]
    pub name: String,
    /// Convert records to this system before rendering
    pub unit_system: Option<UnitSystem>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: default_station_name(),
            unit_system: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default = "default_format_choice")]
    pub choice: FormatChoice,
    /// Overrides the template of `choice`
    pub template: Option<String>,
    #[serde(default = "default_none_token")]
    pub none: String,
    #[serde(default)]
    pub utc: bool,
    #[serde(default = "default_true")]
    pub cardinal: bool,
    #[serde(default = "default_true")]
    pub units: bool,
    pub ordinals: Option<Vec<String>>,
    pub template_file: Option<String>,
    pub summary_file: Option<String>,
    #[serde(default = "default_summary_hour")]
    pub summary_hour: u32,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            choice: default_format_choice(),
            template: None,
            none: default_none_token(),
            utc: false,
            cardinal: true,
            units: true,
            ordinals: None,
            template_file: None,
            summary_file: None,
            summary_hour: default_summary_hour(),
        }
    }
}

impl FormatConfig {
    pub fn render_options(&self, station: &StationConfig) -> RenderOptions {
        RenderOptions {
            none_token: self.none.clone(),
            utc: self.utc,
            cardinal: self.cardinal,
            units: self.units,
            unit_system: station.unit_system,
            ordinals: self
                .ordinals
                .clone()
                .map(OrdinalTable::new)
                .unwrap_or_default(),
        }
    }

    pub fn message_source(&self) -> Result<MessageSource> {
        if self.choice == FormatChoice::Template {
            if let Some(template_file) = &self.template_file {
                return Ok(MessageSource::File {
                    template_file: expand_path(template_file)?,
                    summary_file: self.summary_file.as_deref().map(expand_path).transpose()?,
                    summary_hour: self.summary_hour,
                });
            }
        }
        let template = self
            .template
            .as_deref()
            .unwrap_or_else(|| builtin_template(&self.choice));
        Ok(MessageSource::Render(Template::parse(template)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Image fetched on every attempt and posted first
    pub server_url: Option<String>,
    pub directory: Option<String>,
    /// File names inside `directory`; a directory scan is used when empty
    #[serde(default, deserialize_with = "one_or_many")]
    pub names: Vec<String>,
}

impl ImagesConfig {
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() || self.directory.is_some()
    }

    pub fn directory_path(&self) -> Result<Option<PathBuf>> {
        self.directory.as_deref().map(expand_path).transpose()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingConfig {
    pub visibility: Option<Visibility>,
    #[serde(default = "default_binding", deserialize_with = "one_or_many")]
    pub binding: Vec<Binding>,
    /// Minimum seconds between posts; defaults to an hour (a minute in dev mode)
    pub post_interval: Option<u64>,
    /// Oldest queued records are dropped beyond this many
    pub max_backlog: Option<usize>,
    /// Records older than this many seconds are dropped
    pub stale: Option<u64>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,
    /// Seconds to wait between attempts
    #[serde(default = "default_retry_wait")]
    pub retry_wait: u64,
    #[serde(default)]
    pub skip_upload: bool,
    /// Stop retrying on authentication and validation failures
    #[serde(default = "default_true")]
    pub fail_fast_on_auth: bool,
    #[serde(default)]
    pub dev_mode: bool,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            visibility: None,
            binding: default_binding(),
            post_interval: None,
            max_backlog: None,
            stale: None,
            timeout: default_timeout(),
            max_tries: default_max_tries(),
            retry_wait: default_retry_wait(),
            skip_upload: false,
            fail_fast_on_auth: true,
            dev_mode: false,
        }
    }
}

impl PostingConfig {
    pub fn visibility(&self) -> Visibility {
        self.visibility.unwrap_or(if self.dev_mode {
            Visibility::Direct
        } else {
            Visibility::Unlisted
        })
    }

    pub fn post_interval(&self) -> Duration {
        let default = if self.dev_mode { 60 } else { 3600 };
        Duration::from_secs(self.post_interval.unwrap_or(default))
    }

    pub fn stale(&self) -> Option<Duration> {
        self.stale.filter(|s| *s > 0).map(Duration::from_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.retry_wait)
    }
}

fn default_station_name() -> String {
    "weather".to_string()
}

fn default_format_choice() -> FormatChoice {
    FormatChoice::Full
}

fn default_none_token() -> String {
    "-".to_string()
}

fn default_true() -> bool {
    true
}

fn default_summary_hour() -> u32 {
    9
}

fn default_binding() -> Vec<Binding> {
    vec![Binding::Archive]
}

fn default_timeout() -> u64 {
    60
}

fn default_max_tries() -> u32 {
    3
}

fn default_retry_wait() -> u64 {
    5
}

/// Accept either a single value or a list
fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).map_err(|e| ConfigError::InvalidValue {
        field: path.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without validating it, so callers can
    /// apply overrides first
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Ok(toml::from_str(&content).map_err(ConfigError::ParseError)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the whole configuration once; a failure disables the destination.
    pub fn validate(&self) -> Result<()> {
        if self.posting.max_tries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "posting.max_tries".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.format.summary_hour > 23 {
            return Err(ConfigError::InvalidValue {
                field: "format.summary_hour".to_string(),
                reason: format!("{} is not an hour of the day", self.format.summary_hour),
            }
            .into());
        }
        if self.posting.binding.is_empty() {
            return Err(ConfigError::MissingField("posting.binding".to_string()).into());
        }

        if !self.posting.skip_upload {
            self.mastodon.instance_url()?;
            let has_token = self
                .mastodon
                .access_token
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            if !has_token && self.mastodon.token_file.is_none() {
                return Err(ConfigError::MissingField("mastodon.access_token".to_string()).into());
            }
        }

        if self.format.choice == FormatChoice::Template && self.format.template_file.is_none() {
            return Err(ConfigError::MissingField("format.template_file".to_string()).into());
        }

        if !self.images.names.is_empty() && self.images.directory.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "images.names".to_string(),
                reason: "named images need images.directory".to_string(),
            }
            .into());
        }
        if let Some(dir) = self.images.directory_path()? {
            if !dir.is_dir() {
                return Err(ConfigError::ImageDirectory(dir.display().to_string()).into());
            }
        }

        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return expand_path(&path);
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("wxtoot").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WxTootError;
    use serial_test::serial;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[mastodon]
instance = "mastodon.example"
access_token = "secret-token"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.station.name, "weather");
        assert_eq!(config.format.choice, FormatChoice::Full);
        assert_eq!(config.format.none, "-");
        assert!(!config.format.utc);
        assert!(config.format.cardinal);
        assert_eq!(config.posting.binding, vec![Binding::Archive]);
        assert_eq!(config.posting.max_tries, 3);
        assert_eq!(config.posting.retry_wait(), Duration::from_secs(5));
        assert_eq!(config.posting.timeout(), Duration::from_secs(60));
        assert_eq!(config.posting.post_interval(), Duration::from_secs(3600));
        assert_eq!(config.posting.visibility(), Visibility::Unlisted);
        assert!(config.posting.stale().is_none());
        assert!(!config.images.is_configured());
    }

    #[test]
    fn test_dev_mode_defaults() {
        let config = Config::from_toml_str(&format!("{}\n[posting]\ndev_mode = true\n", MINIMAL))
            .unwrap();
        assert_eq!(config.posting.visibility(), Visibility::Direct);
        assert_eq!(config.posting.post_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_full_config_parses() {
        let dir = TempDir::new().unwrap();
        let toml = format!(
            r#"
[mastodon]
instance = "https://mastodon.example/"
access_token = "secret-token"

[station]
name = "HAL9000"
unit_system = "metricwx"

[format]
choice = "simple"
none = "n/a"
utc = true
cardinal = false

[images]
server_url = "http://localhost/graph.png"
directory = "{}"
names = "daytempdew.png"

[posting]
visibility = "public"
binding = ["loop", "archive"]
post_interval = 0
max_backlog = 10
stale = 600
max_tries = 5
retry_wait = 1
"#,
            dir.path().display()
        );

        let config = Config::from_toml_str(&toml).unwrap();
        assert_eq!(config.station.unit_system, Some(UnitSystem::MetricWx));
        assert_eq!(config.mastodon.instance_url().unwrap(), "https://mastodon.example");
        assert_eq!(config.images.names, vec!["daytempdew.png".to_string()]);
        assert_eq!(config.posting.binding, vec![Binding::Loop, Binding::Archive]);
        assert_eq!(config.posting.visibility(), Visibility::Public);
        assert_eq!(config.posting.post_interval(), Duration::ZERO);
        assert_eq!(config.posting.stale(), Some(Duration::from_secs(600)));

        let options = config.format.render_options(&config.station);
        assert_eq!(options.none_token, "n/a");
        assert!(options.utc);
        assert!(!options.cardinal);
        assert_eq!(options.unit_system, Some(UnitSystem::MetricWx));
    }

    #[test]
    fn test_debug_output_redacts_token() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("removed for privacy"));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result = Config::from_toml_str("[mastodon]\ninstance = \"mastodon.example\"\n");
        match result {
            Err(WxTootError::Config(ConfigError::MissingField(field))) => {
                assert_eq!(field, "mastodon.access_token")
            }
            other => panic!("Expected missing access token, got {:?}", other),
        }

        let result = Config::from_toml_str("[mastodon]\naccess_token = \"x\"\n");
        assert!(matches!(
            result,
            Err(WxTootError::Config(ConfigError::MissingField(_)))
        ));
    }

    #[test]
    fn test_skip_upload_needs_no_credentials() {
        let config = Config::from_toml_str("[posting]\nskip_upload = true\n").unwrap();
        assert!(config.posting.skip_upload);
    }

    #[test]
    fn test_zero_max_tries_rejected() {
        let result = Config::from_toml_str(&format!("{}\n[posting]\nmax_tries = 0\n", MINIMAL));
        assert!(matches!(
            result,
            Err(WxTootError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_missing_image_directory_is_fatal() {
        let result = Config::from_toml_str(&format!(
            "{}\n[images]\ndirectory = \"/nonexistent/wxtoot/images\"\n",
            MINIMAL
        ));
        match result {
            Err(WxTootError::Config(ConfigError::ImageDirectory(path))) => {
                assert!(path.contains("/nonexistent/wxtoot/images"))
            }
            other => panic!("Expected image directory error, got {:?}", other),
        }
    }

    #[test]
    fn test_named_images_need_directory() {
        let result = Config::from_toml_str(&format!("{}\n[images]\nnames = [\"a.png\"]\n", MINIMAL));
        assert!(matches!(
            result,
            Err(WxTootError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_template_choice_requires_file() {
        let result = Config::from_toml_str(&format!("{}\n[format]\nchoice = \"template\"\n", MINIMAL));
        assert!(matches!(
            result,
            Err(WxTootError::Config(ConfigError::MissingField(_)))
        ));
    }

    #[test]
    fn test_message_source_selection() {
        let mut format = FormatConfig::default();
        assert!(matches!(format.message_source().unwrap(), MessageSource::Render(_)));

        format.choice = FormatChoice::Template;
        format.template_file = Some("/srv/wx/toot.txt".to_string());
        format.summary_file = Some("/srv/wx/summary.txt".to_string());
        match format.message_source().unwrap() {
            MessageSource::File {
                template_file,
                summary_file,
                summary_hour,
            } => {
                assert_eq!(template_file, PathBuf::from("/srv/wx/toot.txt"));
                assert_eq!(summary_file, Some(PathBuf::from("/srv/wx/summary.txt")));
                assert_eq!(summary_hour, 9);
            }
            other => panic!("Expected file source, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_template_overrides_choice() {
        let format = FormatConfig {
            template: Some("{station}: {outTemp}".to_string()),
            ..FormatConfig::default()
        };
        match format.message_source().unwrap() {
            MessageSource::Render(template) => assert_eq!(template.placeholders().count(), 2),
            other => panic!("Expected render source, got {:?}", other),
        }
    }

    #[test]
    fn test_token_file_resolution() {
        let dir = TempDir::new().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "  file-token \n").unwrap();

        let mastodon = MastodonConfig {
            instance: Some("mastodon.example".to_string()),
            access_token: None,
            token_file: Some(token_path.display().to_string()),
        };
        assert_eq!(mastodon.resolve_token().unwrap(), "file-token");

        std::fs::write(&token_path, "").unwrap();
        assert!(matches!(
            mastodon.resolve_token(),
            Err(WxTootError::Platform(PlatformError::Authentication(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_from_env() {
        std::env::set_var(CONFIG_ENV, "/etc/wxtoot/station.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var(CONFIG_ENV);
        assert_eq!(path, PathBuf::from("/etc/wxtoot/station.toml"));
    }

    #[test]
    #[serial]
    fn test_load_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.mastodon.access_token.as_deref(), Some("secret-token"));

        let missing = Config::load_from_path(&dir.path().join("nope.toml"));
        assert!(matches!(
            missing,
            Err(WxTootError::Config(ConfigError::ReadError(_)))
        ));
    }
}
