//! Compass ordinals for wind direction

use serde::{Deserialize, Serialize};

/// Degrees covered by one ordinal sector
const SECTOR_DEGREES: f64 = 22.5;

/// Ordered compass labels indexed by `round(degrees / 22.5)`.
///
/// Index 16 repeats north so that 360° maps back to "N"; the last entry is the
/// fallback returned for anything that cannot be mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrdinalTable(Vec<String>);

impl Default for OrdinalTable {
    fn default() -> Self {
        Self(
            [
                "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W",
                "WNW", "NW", "NNW", "N", "-",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }
}

impl OrdinalTable {
    /// An empty list is replaced by the default table; the fallback must exist.
    pub fn new(labels: Vec<String>) -> Self {
        if labels.is_empty() {
            Self::default()
        } else {
            Self(labels)
        }
    }

    pub fn fallback(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("-")
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Label for a compass bearing. Never fails: NaN, infinities, negative
    /// bearings and indices past the end all give the fallback entry.
    pub fn ordinal(&self, degrees: f64) -> &str {
        let index = (degrees / SECTOR_DEGREES).round();
        if !index.is_finite() || index < 0.0 {
            return self.fallback();
        }
        self.get(index as usize).unwrap_or_else(|| self.fallback())
    }
}

/// Ordinal label for an optional bearing; unparseable input gives the fallback.
pub fn ordinal(degrees: Option<f64>, table: &OrdinalTable) -> &str {
    match degrees {
        Some(d) => table.ordinal(d),
        None => table.fallback(),
    }
}
