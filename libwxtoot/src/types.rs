//! Core types for wxtoot

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Record field holding the Unix epoch timestamp of the observation
pub const DATE_TIME: &str = "dateTime";
/// Synthetic record field carrying the station identifier
pub const STATION: &str = "station";
/// Record field naming the unit system the values are expressed in
pub const US_UNITS: &str = "usUnits";
pub const WIND_DIR: &str = "windDir";

// ============================================================================
// Records
// ============================================================================

/// A single observation value; any field may be null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ObservationValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ObservationValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObservationValue::Integer(v) => Some(*v as f64),
            ObservationValue::Float(v) => Some(*v),
            ObservationValue::Text(s) => s.trim().parse().ok(),
            ObservationValue::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ObservationValue::Integer(v) => Some(*v),
            ObservationValue::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            ObservationValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for ObservationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationValue::Null => write!(f, "None"),
            ObservationValue::Integer(v) => write!(f, "{}", v),
            // whole floats keep their ".0", as station software prints them
            ObservationValue::Float(v) if v.is_finite() && v.fract() == 0.0 => {
                write!(f, "{:.1}", v)
            }
            ObservationValue::Float(v) => write!(f, "{}", v),
            ObservationValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for ObservationValue {
    fn from(v: f64) -> Self {
        ObservationValue::Float(v)
    }
}

impl From<i64> for ObservationValue {
    fn from(v: i64) -> Self {
        ObservationValue::Integer(v)
    }
}

impl From<i32> for ObservationValue {
    fn from(v: i32) -> Self {
        ObservationValue::Integer(v.into())
    }
}

impl From<String> for ObservationValue {
    fn from(v: String) -> Self {
        ObservationValue::Text(v)
    }
}

impl From<&str> for ObservationValue {
    fn from(v: &str) -> Self {
        ObservationValue::Text(v.to_string())
    }
}

impl<T: Into<ObservationValue>> From<Option<T>> for ObservationValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ObservationValue::Null)
    }
}

/// One timestamped set of weather observations, keyed by observation name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, ObservationValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for tests and fixtures
    pub fn with(mut self, name: &str, value: impl Into<ObservationValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ObservationValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ObservationValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ObservationValue> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObservationValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observation time in Unix epoch seconds
    pub fn date_time(&self) -> Option<i64> {
        self.get(DATE_TIME).and_then(ObservationValue::as_i64)
    }
}

// ============================================================================
// Posting
// ============================================================================

/// Audience scope of a posted status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "unlisted" => Ok(Visibility::Unlisted),
            "private" => Ok(Visibility::Private),
            "direct" => Ok(Visibility::Direct),
            _ => Err(format!(
                "Invalid visibility: '{}'. Valid options: public, unlisted, private, direct",
                s
            )),
        }
    }
}

/// Everything the status endpoint needs for one post
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRequest {
    pub status: String,
    pub media_ids: Vec<String>,
    pub visibility: Visibility,
}

/// Host event type that delivers records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    Loop,
    Archive,
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Loop => write!(f, "loop"),
            Binding::Archive => write!(f, "archive"),
        }
    }
}

/// One line of record input: `{"binding": "loop", "record": {...}}` or a
/// bare record, which counts as an archive record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RecordEnvelope {
    Tagged { binding: Binding, record: Record },
    Bare(Record),
}

impl RecordEnvelope {
    pub fn parse(line: &str) -> crate::error::Result<Self> {
        serde_json::from_str(line).map_err(|e| {
            crate::error::WxTootError::InvalidInput(format!("Invalid record JSON: {}", e))
        })
    }

    pub fn into_parts(self) -> (Binding, Record) {
        match self {
            RecordEnvelope::Tagged { binding, record } => (binding, record),
            RecordEnvelope::Bare(record) => (Binding::Archive, record),
        }
    }
}

/// Which message template is used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FormatChoice {
    Simple,
    Full,
    /// Message comes verbatim from a template file
    Template,
    /// Anything unrecognised: wind only
    Short,
}

impl From<String> for FormatChoice {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "simple" => FormatChoice::Simple,
            "full" => FormatChoice::Full,
            "template" => FormatChoice::Template,
            _ => FormatChoice::Short,
        }
    }
}

impl From<FormatChoice> for String {
    fn from(choice: FormatChoice) -> Self {
        match choice {
            FormatChoice::Simple => "simple",
            FormatChoice::Full => "full",
            FormatChoice::Template => "template",
            FormatChoice::Short => "short",
        }
        .to_string()
    }
}

impl fmt::Display for FormatChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

// ============================================================================
// Images
// ============================================================================

/// Image types the media endpoint accepts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
