//! Unit systems, conversions and compass helpers.
//!
//! Adapters report values in whatever unit the provider delivered and record
//! that unit in [`UnitLabels`]. [`UnitConverter`] then brings the whole
//! snapshot to the display units in one pass.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{DayRecord, HourlyRecord, UnitLabels, WeatherSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
        }
    }

    pub fn temperature(&self) -> TemperatureUnit {
        match self {
            UnitSystem::Metric => TemperatureUnit::Celsius,
            UnitSystem::Imperial => TemperatureUnit::Fahrenheit,
        }
    }

    /// Unit visibility is displayed in.
    pub fn distance(&self) -> DistanceUnit {
        match self {
            UnitSystem::Metric => DistanceUnit::Kilometers,
            UnitSystem::Imperial => DistanceUnit::Miles,
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn label(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WindUnit {
    #[default]
    #[serde(rename = "km/h")]
    KilometersPerHour,
    #[serde(rename = "m/s")]
    MetersPerSecond,
    #[serde(rename = "mph")]
    MilesPerHour,
    #[serde(rename = "kn")]
    Knots,
}

impl WindUnit {
    pub fn label(&self) -> &'static str {
        match self {
            WindUnit::KilometersPerHour => "km/h",
            WindUnit::MetersPerSecond => "m/s",
            WindUnit::MilesPerHour => "mph",
            WindUnit::Knots => "kn",
        }
    }

    pub const fn all() -> &'static [WindUnit] {
        &[
            WindUnit::KilometersPerHour,
            WindUnit::MetersPerSecond,
            WindUnit::MilesPerHour,
            WindUnit::Knots,
        ]
    }

    fn meters_per_second(&self) -> f64 {
        match self {
            WindUnit::KilometersPerHour => 1.0 / 3.6,
            WindUnit::MetersPerSecond => 1.0,
            WindUnit::MilesPerHour => 0.44704,
            WindUnit::Knots => 1852.0 / 3600.0,
        }
    }
}

impl fmt::Display for WindUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WindUnit {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "km/h" | "kmh" | "kph" => Ok(WindUnit::KilometersPerHour),
            "m/s" | "ms" => Ok(WindUnit::MetersPerSecond),
            "mph" => Ok(WindUnit::MilesPerHour),
            "kn" | "kt" | "knots" => Ok(WindUnit::Knots),
            _ => Err(anyhow::anyhow!(
                "Unknown wind unit '{value}'. Supported units: km/h, m/s, mph, kn."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceUnit {
    Meters,
    Feet,
    Kilometers,
    Miles,
}

impl DistanceUnit {
    pub fn label(&self) -> &'static str {
        match self {
            DistanceUnit::Meters => "m",
            DistanceUnit::Feet => "ft",
            DistanceUnit::Kilometers => "km",
            DistanceUnit::Miles => "mi",
        }
    }

    fn meters(&self) -> f64 {
        match self {
            DistanceUnit::Meters => 1.0,
            DistanceUnit::Feet => 0.3048,
            DistanceUnit::Kilometers => 1000.0,
            DistanceUnit::Miles => 1609.344,
        }
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

pub fn convert_temperature(value: f64, from: TemperatureUnit, to: TemperatureUnit) -> f64 {
    match (from, to) {
        (TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit) => celsius_to_fahrenheit(value),
        (TemperatureUnit::Fahrenheit, TemperatureUnit::Celsius) => fahrenheit_to_celsius(value),
        _ => value,
    }
}

pub fn convert_wind(value: f64, from: WindUnit, to: WindUnit) -> f64 {
    if from == to {
        return value;
    }
    value * from.meters_per_second() / to.meters_per_second()
}

pub fn convert_distance(value: f64, from: DistanceUnit, to: DistanceUnit) -> f64 {
    if from == to {
        return value;
    }
    value * from.meters() / to.meters()
}

const COMPASS: [(&str, &str, &str); 8] = [
    ("N", "↓", "North"),
    ("NE", "↙", "Northeast"),
    ("E", "←", "East"),
    ("SE", "↖", "Southeast"),
    ("S", "↑", "South"),
    ("SW", "↗", "Southwest"),
    ("W", "→", "West"),
    ("NW", "↘", "Northwest"),
];

fn compass_index(degrees: f64) -> usize {
    let sector = (degrees.rem_euclid(360.0) / 45.0).round() as usize;
    sector % COMPASS.len()
}

/// 8-point abbreviation for a meteorological wind direction (where the wind comes from).
pub fn compass_point(degrees: f64) -> &'static str {
    COMPASS[compass_index(degrees)].0
}

/// Arrow pointing downwind followed by the compass abbreviation, e.g. `↗ SW`.
pub fn wind_sign(degrees: f64) -> String {
    let (abbr, arrow, _) = COMPASS[compass_index(degrees)];
    format!("{arrow} {abbr}")
}

/// Full name for a compass abbreviation; unknown abbreviations are returned as-is.
pub fn compass_name(abbr: &str) -> &str {
    COMPASS
        .iter()
        .find(|(short, _, _)| *short == abbr)
        .map(|(_, _, name)| *name)
        .unwrap_or(abbr)
}

/// Brings a freshly normalized snapshot to the configured display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConverter {
    system: UnitSystem,
    wind: WindUnit,
}

impl UnitConverter {
    pub fn new(system: UnitSystem, wind: WindUnit) -> Self {
        Self { system, wind }
    }

    pub fn apply(&self, snapshot: WeatherSnapshot) -> WeatherSnapshot {
        let source = snapshot.units.clone();
        let target = UnitLabels {
            temperature: self.system.temperature(),
            wind: self.wind,
            visibility: self.system.distance(),
            pressure: source.pressure.clone(),
            precipitation: source.precipitation.clone(),
        };

        WeatherSnapshot {
            current: self.hourly(snapshot.current, &source, &target),
            days: snapshot
                .days
                .into_iter()
                .map(|day| self.day(day, &source, &target))
                .collect(),
            units: target,
            ..snapshot
        }
    }

    fn hourly(&self, record: HourlyRecord, from: &UnitLabels, to: &UnitLabels) -> HourlyRecord {
        let temp = |v: Option<f64>| {
            v.map(|v| convert_temperature(v, from.temperature, to.temperature))
        };
        let wind = |v: Option<f64>| v.map(|v| convert_wind(v, from.wind, to.wind));
        HourlyRecord {
            temperature: temp(record.temperature),
            feels_like: temp(record.feels_like),
            wind_speed: wind(record.wind_speed),
            wind_gusts: wind(record.wind_gusts),
            visibility: record
                .visibility
                .map(|v| convert_distance(v, from.visibility, to.visibility)),
            ..record
        }
    }

    fn day(&self, day: DayRecord, from: &UnitLabels, to: &UnitLabels) -> DayRecord {
        let temp = |v: Option<f64>| {
            v.map(|v| convert_temperature(v, from.temperature, to.temperature))
        };
        let wind = |v: Option<f64>| v.map(|v| convert_wind(v, from.wind, to.wind));
        DayRecord {
            min_temp: temp(day.min_temp),
            max_temp: temp(day.max_temp),
            min_feels_like: temp(day.min_feels_like),
            max_feels_like: temp(day.max_feels_like),
            wind_speed: wind(day.wind_speed),
            max_gusts: wind(day.max_gusts),
            max_visibility: day
                .max_visibility
                .map(|v| convert_distance(v, from.visibility, to.visibility)),
            ..day
        }
    }
}
