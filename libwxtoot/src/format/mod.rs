//! Message rendering
//!
//! Turns a `{name}` / `{name:spec}` template and a station record into the
//! text of a status. Rendering never fails: a spec that cannot be applied
//! falls back to the plain value text.
//!
//! # Examples
//!
//! ```
//! use libwxtoot::format::{render, RenderOptions};
//! use libwxtoot::types::Record;
//!
//! let record = Record::new().with("station", "hal").with("windSpeed", 12.345);
//! let text = render("{station}: Ws: {windSpeed:%.1f}", &record, &RenderOptions::default());
//! assert_eq!(text, "hal: Ws: 12.3");
//! ```

pub mod printf;
pub mod template;

use std::fmt::Display;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone};
use tracing::debug;

use crate::ordinal::OrdinalTable;
use crate::types::{ObservationValue, Record, DATE_TIME, STATION, WIND_DIR};
use crate::units::{abbreviate, StandardUnits, UnitLookup, UnitSystem};

pub use template::{Placeholder, Segment, Template};

/// Spec that asks for a compass ordinal on `windDir`
const ORDINAL_SPEC: &str = "ord";
/// `dateTime` without a spec renders as epoch seconds
const DEFAULT_TIME_SPEC: &str = "%s";
const DEFAULT_VALUE_SPEC: &str = "%s";

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Text substituted for null values
    pub none_token: String,
    /// Render `dateTime` in UTC instead of the local zone
    pub utc: bool,
    /// Always render `windDir` as an ordinal, whatever its spec
    pub cardinal: bool,
    /// Append unit abbreviations after observation values
    pub units: bool,
    /// Unit system used to label values; the record's own system when `None`
    pub unit_system: Option<UnitSystem>,
    pub ordinals: OrdinalTable,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            none_token: "-".to_string(),
            utc: true,
            cardinal: false,
            units: false,
            unit_system: None,
            ordinals: OrdinalTable::default(),
        }
    }
}

/// Renders templates against records with a fixed set of options
#[derive(Clone)]
pub struct FormatEngine {
    options: RenderOptions,
    units: Arc<dyn UnitLookup>,
}

impl std::fmt::Debug for FormatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatEngine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl FormatEngine {
    pub fn new(options: RenderOptions) -> Self {
        Self::with_units(options, Arc::new(StandardUnits))
    }

    pub fn with_units(options: RenderOptions, units: Arc<dyn UnitLookup>) -> Self {
        Self { options, units }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render(&self, template: &str, record: &Record) -> String {
        self.render_template(&Template::parse(template), record)
    }

    /// Render a pre-parsed template. Placeholders naming fields the record
    /// lacks are left exactly as written.
    pub fn render_template(&self, template: &Template, record: &Record) -> String {
        let mut out = String::new();
        for segment in template.segments() {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => match record.get(&p.name) {
                    Some(value) => out.push_str(&self.render_placeholder(p, value, record)),
                    None => out.push_str(&p.raw),
                },
            }
        }
        debug!("format msg: {}", out);
        out
    }

    fn render_placeholder(&self, p: &Placeholder, value: &ObservationValue, record: &Record) -> String {
        if value.is_null() {
            return self.options.none_token.clone();
        }
        let spec = p.spec.as_deref();

        match p.name.as_str() {
            DATE_TIME => self.render_time(spec.unwrap_or(DEFAULT_TIME_SPEC), value),
            STATION => apply_spec(spec.unwrap_or(DEFAULT_VALUE_SPEC), value),
            WIND_DIR
                if self.options.cardinal
                    || spec.is_some_and(|s| s.eq_ignore_ascii_case(ORDINAL_SPEC)) =>
            {
                crate::ordinal::ordinal(value.as_f64(), &self.options.ordinals).to_string()
            }
            name => {
                let text = apply_spec(spec.unwrap_or(DEFAULT_VALUE_SPEC), value);
                match self.unit_suffix(name, record) {
                    Some(suffix) => format!("{} {}", text, suffix),
                    None => text,
                }
            }
        }
    }

    fn unit_suffix(&self, name: &str, record: &Record) -> Option<String> {
        if !self.options.units {
            return None;
        }
        if name == WIND_DIR {
            return Some("deg".to_string());
        }
        let system = self
            .options
            .unit_system
            .unwrap_or_else(|| UnitSystem::of_record(record));
        let unit_type = self.units.unit_type(system, name)?;
        abbreviate(unit_type).map(str::to_string)
    }

    fn render_time(&self, spec: &str, value: &ObservationValue) -> String {
        let formatted = value
            .as_i64()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .and_then(|utc| {
                if self.options.utc {
                    strftime(&utc, spec)
                } else {
                    strftime(&utc.with_timezone(&Local), spec)
                }
            });
        formatted.unwrap_or_else(|| value.to_string())
    }
}

/// Render `template` with the standard unit table
pub fn render(template: &str, record: &Record, options: &RenderOptions) -> String {
    FormatEngine::new(options.clone()).render(template, record)
}

fn apply_spec(spec: &str, value: &ObservationValue) -> String {
    printf::format_value(spec, value).unwrap_or_else(|e| {
        debug!("format spec '{}' not applied: {}", spec, e);
        value.to_string()
    })
}

/// strftime that reports bad patterns instead of panicking on display
fn strftime<Tz: TimeZone>(dt: &DateTime<Tz>, spec: &str) -> Option<String>
where
    Tz::Offset: Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(spec).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        debug!("time spec '{}' not applied", spec);
        return None;
    }
    Some(dt.format_with_items(items.into_iter()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::US_UNITS;

    fn options() -> RenderOptions {
        RenderOptions::default()
    }

    #[test]
    fn test_station_truncation_and_wind_speed() {
        let record = Record::new()
            .with("station", "HAL9000")
            .with("windSpeed", 12.345);
        assert_eq!(
            render("{station:%.8s}: Ws: {windSpeed:%.1f}", &record, &options()),
            "HAL9000: Ws: 12.3"
        );

        let long = Record::new().with("station", "HAL9000-rooftop");
        assert_eq!(render("{station:%.8s}:", &long, &options()), "HAL9000-:");
    }

    #[test]
    fn test_null_uses_token_regardless_of_spec() {
        let record = Record::new()
            .with("windSpeed", None::<f64>)
            .with("dateTime", None::<i64>)
            .with("windDir", None::<f64>);
        assert_eq!(render("{windSpeed:%.1f}", &record, &options()), "-");
        assert_eq!(render("{dateTime:%H:%M}", &record, &options()), "-");
        assert_eq!(render("{windDir:ORD}", &record, &options()), "-");

        let custom = RenderOptions {
            none_token: "n/a".to_string(),
            units: true,
            ..options()
        };
        assert_eq!(render("Ws: {windSpeed}", &record, &custom), "Ws: n/a");
    }

    #[test]
    fn test_missing_fields_left_verbatim() {
        let record = Record::new().with("outTemp", 21.04);
        assert_eq!(
            render("T {outTemp:%.1f} H {outHumidity:%.0f}", &record, &options()),
            "T 21.0 H {outHumidity:%.0f}"
        );
    }

    #[test]
    fn test_no_placeholders_remain_for_present_keys() {
        let record = Record::new()
            .with("station", "hal")
            .with("dateTime", 1413994070)
            .with("windSpeed", 3.0)
            .with("windDir", 90.0)
            .with("windGust", None::<f64>)
            .with("outTemp", 12.0);
        let text = render(
            "{station} {dateTime} {dateTime:%H:%M} {windSpeed:%.1f} {windDir:ORD} \
             {windDir:%03.0f} {windGust} {outTemp} {outTemp:%.2f}",
            &record,
            &options(),
        );
        assert!(!text.contains('{'), "unrendered placeholder in {:?}", text);
        assert!(!text.contains('}'), "unrendered placeholder in {:?}", text);
    }

    #[test]
    fn test_every_occurrence_is_rendered() {
        let record = Record::new().with("outTemp", 12.0);
        assert_eq!(
            render("{outTemp:%.0f} / {outTemp:%.1f} / {outTemp}", &record, &options()),
            "12 / 12.0 / 12.0"
        );
    }

    #[test]
    fn test_values_resembling_placeholders_are_not_rewritten() {
        let record = Record::new()
            .with("station", "{outTemp}")
            .with("outTemp", 5.0);
        assert_eq!(
            render("{station} {outTemp:%.0f}", &record, &options()),
            "{outTemp} 5"
        );
    }

    #[test]
    fn test_date_time_formats_in_utc() {
        let record = Record::new().with("dateTime", 1413994070);
        assert_eq!(render("ts: {dateTime}", &record, &options()), "ts: 1413994070");
        assert_eq!(
            render("ts: {dateTime:%H:%M:%S}", &record, &options()),
            "ts: 16:07:50"
        );
        assert_eq!(
            render("{dateTime:%d %b %Y %H:%M}", &record, &options()),
            "22 Oct 2014 16:07"
        );
    }

    #[test]
    fn test_date_time_local_matches_chrono_local() {
        let record = Record::new().with("dateTime", 1413994070);
        let local = RenderOptions {
            utc: false,
            ..options()
        };
        let expected = DateTime::from_timestamp(1413994070, 0)
            .unwrap()
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string();
        assert_eq!(render("{dateTime:%H:%M}", &record, &local), expected);
    }

    #[test]
    fn test_bad_time_spec_falls_back_to_value() {
        let record = Record::new().with("dateTime", 1413994070);
        assert_eq!(render("{dateTime:%Q}", &record, &options()), "1413994070");
    }

    #[test]
    fn test_bad_numeric_spec_falls_back_to_value() {
        let record = Record::new().with("outTemp", 12.5).with("station", "hal");
        assert_eq!(render("{outTemp:%q}", &record, &options()), "12.5");
        assert_eq!(render("{station:%.1f}", &record, &options()), "hal");
    }

    #[test]
    fn test_wind_direction_ordinal_spec_case_insensitive() {
        let record = Record::new().with("windDir", 45.0);
        assert_eq!(render("{windDir:ORD}", &record, &options()), "NE");
        assert_eq!(render("{windDir:ord}", &record, &options()), "NE");
        assert_eq!(render("{windDir:%03.0f}", &record, &options()), "045");
    }

    #[test]
    fn test_cardinal_flag_overrides_numeric_spec() {
        let record = Record::new().with("windDir", 90.0);
        let cardinal = RenderOptions {
            cardinal: true,
            units: true,
            ..options()
        };
        assert_eq!(render("Wd: {windDir:%03.0f}", &record, &cardinal), "Wd: E");
    }

    #[test]
    fn test_unit_suffixes() {
        let record = Record::new()
            .with(US_UNITS, 17)
            .with("station", "hal")
            .with("outTemp", 7.0)
            .with("windSpeed", 4.9)
            .with("outHumidity", 41.95)
            .with("barometer", 1014.587)
            .with("windDir", 90.0)
            .with("UV", 3.0)
            .with("dateTime", 1413994070);
        let with_units = RenderOptions {
            units: true,
            ..options()
        };
        assert_eq!(
            render(
                "{station} {outTemp:%.1f}; {windSpeed:%.1f}; {outHumidity:%.2f}; \
                 {barometer:%.3f}; {windDir:%03.0f}; {UV:%.0f}; {dateTime:%H}",
                &record,
                &with_units
            ),
            "hal 7.0 C; 4.9 mps; 41.95 %; 1014.587 mbar; 090 deg; 3; 16"
        );
    }

    #[test]
    fn test_unit_system_option_overrides_record() {
        let record = Record::new().with("outTemp", 7.0);
        let metric = RenderOptions {
            units: true,
            unit_system: Some(UnitSystem::Metric),
            ..options()
        };
        assert_eq!(render("{outTemp}", &record, &metric), "7.0 C");
        let us = RenderOptions {
            units: true,
            ..options()
        };
        assert_eq!(render("{outTemp}", &record, &us), "7.0 F");
    }

    #[test]
    fn test_engine_with_custom_unit_lookup() {
        struct Knots;
        impl UnitLookup for Knots {
            fn unit_type(&self, _: UnitSystem, obs: &str) -> Option<&'static str> {
                (obs == "windSpeed").then_some("knot")
            }
            fn convert(&self, record: &Record, _: UnitSystem) -> Record {
                record.clone()
            }
        }
        let engine = FormatEngine::with_units(
            RenderOptions {
                units: true,
                ..options()
            },
            Arc::new(Knots),
        );
        let record = Record::new().with("windSpeed", 10.0).with("rain", 0.0);
        assert_eq!(
            engine.render("{windSpeed:%.0f} {rain:%.1f}", &record),
            "10 knot 0.0"
        );
    }
}
