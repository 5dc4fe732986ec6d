//! Unit systems, unit labels and record conversion
//!
//! Station records state the system their values are in through the
//! `usUnits` field. `StandardUnits` knows the unit group of the usual station
//! observations, which is enough to label a value and to move a whole record
//! between systems before it is rendered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{ObservationValue, Record, US_UNITS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UnitSystem {
    Us,
    Metric,
    MetricWx,
}

impl UnitSystem {
    /// Numeric code carried in a record's `usUnits` field
    pub fn code(&self) -> i64 {
        match self {
            UnitSystem::Us => 1,
            UnitSystem::Metric => 16,
            UnitSystem::MetricWx => 17,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(UnitSystem::Us),
            16 => Some(UnitSystem::Metric),
            17 => Some(UnitSystem::MetricWx),
            _ => None,
        }
    }

    /// The system a record is expressed in; records without `usUnits` are US.
    pub fn of_record(record: &Record) -> Self {
        record
            .get(US_UNITS)
            .and_then(ObservationValue::as_i64)
            .and_then(Self::from_code)
            .unwrap_or(UnitSystem::Us)
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitSystem::Us => write!(f, "US"),
            UnitSystem::Metric => write!(f, "METRIC"),
            UnitSystem::MetricWx => write!(f, "METRICWX"),
        }
    }
}

impl FromStr for UnitSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "US" => Ok(UnitSystem::Us),
            "METRIC" => Ok(UnitSystem::Metric),
            "METRICWX" => Ok(UnitSystem::MetricWx),
            _ => Err(format!(
                "Unknown unit system: '{}'. Valid options: US, METRIC, METRICWX",
                s
            )),
        }
    }
}

impl TryFrom<String> for UnitSystem {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<UnitSystem> for String {
    fn from(system: UnitSystem) -> Self {
        system.to_string()
    }
}

/// Unit knowledge consumed by the renderer and the destination worker.
pub trait UnitLookup: Send + Sync {
    /// Unit-type label (e.g. `degree_C`) of an observation in a unit system
    fn unit_type(&self, system: UnitSystem, obs: &str) -> Option<&'static str>;

    /// Copy of `record` with every known observation expressed in `target`
    fn convert(&self, record: &Record, target: UnitSystem) -> Record;
}

/// Short suffix for a unit-type label. Labels mapped to nothing yield `None`;
/// labels not in the table are used as they are.
pub fn abbreviate(unit_type: &str) -> Option<&str> {
    match unit_type {
        "degree_F" => Some("F"),
        "degree_C" => Some("C"),
        "inch" => Some("in"),
        "mile_per_hour" | "mile_per_hour2" => Some("mph"),
        "km_per_hour" | "km_per_hour2" => Some("kph"),
        "meter_per_second" | "meter_per_second2" => Some("mps"),
        "watt_per_meter_squared" => Some("Wpm2"),
        "percent" => Some("%"),
        "degree_compass" | "uv_index" | "unix_epoch" => None,
        other => Some(other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitGroup {
    Temperature,
    Speed,
    Direction,
    Percent,
    Pressure,
    Rain,
    RainRate,
    Radiation,
    Uv,
    Time,
}

impl UnitGroup {
    fn of(obs: &str) -> Option<Self> {
        let group = match obs {
            "outTemp" | "inTemp" | "dewpoint" | "windchill" | "heatindex" | "appTemp"
            | "humidex" => UnitGroup::Temperature,
            "windSpeed" | "windGust" | "windSpeed10" => UnitGroup::Speed,
            "windDir" | "windGustDir" => UnitGroup::Direction,
            "outHumidity" | "inHumidity" => UnitGroup::Percent,
            "barometer" | "pressure" | "altimeter" => UnitGroup::Pressure,
            "rain" | "hourRain" | "dayRain" | "rain24" | "stormRain" => UnitGroup::Rain,
            "rainRate" => UnitGroup::RainRate,
            "radiation" => UnitGroup::Radiation,
            "UV" => UnitGroup::Uv,
            "dateTime" => UnitGroup::Time,
            other if other.starts_with("extraTemp")
                || other.starts_with("soilTemp")
                || other.starts_with("leafTemp") =>
            {
                UnitGroup::Temperature
            }
            other if other.starts_with("extraHumid") => UnitGroup::Percent,
            _ => return None,
        };
        Some(group)
    }

    fn unit(&self, system: UnitSystem) -> &'static str {
        use UnitSystem::*;
        match (self, system) {
            (UnitGroup::Temperature, Us) => "degree_F",
            (UnitGroup::Temperature, _) => "degree_C",
            (UnitGroup::Speed, Us) => "mile_per_hour",
            (UnitGroup::Speed, Metric) => "km_per_hour",
            (UnitGroup::Speed, MetricWx) => "meter_per_second",
            (UnitGroup::Direction, _) => "degree_compass",
            (UnitGroup::Percent, _) => "percent",
            (UnitGroup::Pressure, Us) => "inHg",
            (UnitGroup::Pressure, _) => "mbar",
            (UnitGroup::Rain, Us) => "inch",
            (UnitGroup::Rain, Metric) => "cm",
            (UnitGroup::Rain, MetricWx) => "mm",
            (UnitGroup::RainRate, Us) => "inch_per_hour",
            (UnitGroup::RainRate, Metric) => "cm_per_hour",
            (UnitGroup::RainRate, MetricWx) => "mm_per_hour",
            (UnitGroup::Radiation, _) => "watt_per_meter_squared",
            (UnitGroup::Uv, _) => "uv_index",
            (UnitGroup::Time, _) => "unix_epoch",
        }
    }
}

/// Value in `unit` expressed in its group's base unit (C, m/s, mbar, mm, mm/h)
fn to_base(unit: &str, v: f64) -> f64 {
    match unit {
        "degree_F" => (v - 32.0) * 5.0 / 9.0,
        "mile_per_hour" => v * 0.44704,
        "km_per_hour" => v / 3.6,
        "inHg" => v * 33.863886667,
        "inch" | "inch_per_hour" => v * 25.4,
        "cm" | "cm_per_hour" => v * 10.0,
        _ => v,
    }
}

fn from_base(unit: &str, v: f64) -> f64 {
    match unit {
        "degree_F" => v * 9.0 / 5.0 + 32.0,
        "mile_per_hour" => v / 0.44704,
        "km_per_hour" => v * 3.6,
        "inHg" => v / 33.863886667,
        "inch" | "inch_per_hour" => v / 25.4,
        "cm" | "cm_per_hour" => v / 10.0,
        _ => v,
    }
}

/// Unit table covering the common station observations
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUnits;

impl UnitLookup for StandardUnits {
    fn unit_type(&self, system: UnitSystem, obs: &str) -> Option<&'static str> {
        UnitGroup::of(obs).map(|group| group.unit(system))
    }

    fn convert(&self, record: &Record, target: UnitSystem) -> Record {
        let source = UnitSystem::of_record(record);
        let mut converted = record.clone();
        if source != target {
            for (name, value) in record.iter() {
                let Some(group) = UnitGroup::of(name) else {
                    continue;
                };
                let (from, to) = (group.unit(source), group.unit(target));
                if from == to {
                    continue;
                }
                if let ObservationValue::Integer(_) | ObservationValue::Float(_) = value {
                    if let Some(v) = value.as_f64() {
                        converted.insert(name, from_base(to, to_base(from, v)));
                    }
                }
            }
        }
        converted.insert(US_UNITS, target.code());
        converted
    }
}
