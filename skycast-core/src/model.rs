use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::astro::MoonInfo;
use crate::provider::ProviderKind;
use crate::units::{DistanceUnit, TemperatureUnit, UnitSystem, WindUnit};

/// Rendered in place of any value the provider did not deliver.
pub const NOT_AVAILABLE: &str = "n/a";

/// Two locations closer than this (in degrees, Euclidean on lon/lat) are the same place.
pub const SAME_PLACE_THRESHOLD: f64 = 0.02;

/// A named point on the globe.
///
/// `PartialEq` compares coordinates only; the name is display metadata. Use
/// [`is_different_location`] for the tolerant "same place" check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.lon == other.lon && self.lat == other.lat
    }
}

impl Location {
    pub fn new(name: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self {
            name: name.into(),
            lon,
            lat,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::new("Hamburg, DE", 10.000654, 53.550341)
    }
}

/// True unless `a` and `b` lie within [`SAME_PLACE_THRESHOLD`] of each other.
pub fn is_different_location(a: &Location, b: &Location) -> bool {
    (a.lon - b.lon).hypot(a.lat - b.lat) >= SAME_PLACE_THRESHOLD
}

/// Everything a fetch collaborator needs for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub units: UnitSystem,
    /// Language/scheme tag such as `de-de`.
    pub language: String,
    pub location: Location,
    /// Ask the provider for a smaller payload.
    pub reduced: bool,
}

/// Canonical icon codes: the numeric "Yahoo+" code and the MetrixIcons glyph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconCodes {
    pub yahoo: String,
    pub meteo: String,
}

impl IconCodes {
    pub fn new(yahoo: impl Into<String>, meteo: impl Into<String>) -> Self {
        Self {
            yahoo: yahoo.into(),
            meteo: meteo.into(),
        }
    }

    /// Codes used when the provider reported no condition at all.
    pub fn unknown() -> Self {
        Self::new("44", "NA")
    }
}

/// One observation or forecast step. Timestamps are local to the location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRecord {
    pub time: NaiveDateTime,
    pub pressure: Option<f64>,
    pub temperature: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    /// Arrow plus compass abbreviation, e.g. `↗ SW`.
    pub wind_sign: Option<String>,
    pub wind_gusts: Option<f64>,
    pub uv_index: Option<f64>,
    pub visibility: Option<f64>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub icon: IconCodes,
    pub is_night: bool,
}

impl HourlyRecord {
    /// A record with every measurement absent.
    pub fn empty(time: NaiveDateTime) -> Self {
        Self {
            time,
            pressure: None,
            temperature: None,
            feels_like: None,
            humidity: None,
            precipitation_probability: None,
            wind_speed: None,
            wind_direction: None,
            wind_sign: None,
            wind_gusts: None,
            uv_index: None,
            visibility: None,
            short_description: None,
            long_description: None,
            icon: IconCodes::unknown(),
            is_night: false,
        }
    }
}

/// Aggregate of all records that fall on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub min_feels_like: Option<f64>,
    pub max_feels_like: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub wind_sign: Option<String>,
    pub max_gusts: Option<f64>,
    pub max_uv: Option<f64>,
    pub max_visibility: Option<f64>,
    /// Highest precipitation probability of the day, in percent.
    pub precipitation: Option<f64>,
    pub weekday: String,
    pub short_weekday: String,
    pub summary: Option<String>,
    pub icon: IconCodes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ephemeris {
    pub date: NaiveDate,
    pub sunrise: Option<NaiveDateTime>,
    pub sunset: Option<NaiveDateTime>,
    pub moonrise: Option<NaiveDateTime>,
    pub moonset: Option<NaiveDateTime>,
    pub moon: MoonInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitLabels {
    pub temperature: TemperatureUnit,
    pub wind: WindUnit,
    pub visibility: DistanceUnit,
    pub pressure: String,
    pub precipitation: String,
}

impl UnitLabels {
    pub fn temperature_label(&self) -> &'static str {
        self.temperature.label()
    }

    pub fn wind_label(&self) -> &'static str {
        self.wind.label()
    }

    pub fn visibility_label(&self) -> &'static str {
        self.visibility.label()
    }
}

/// The canonical, provider-independent result of one successful fetch.
///
/// Always replaced wholesale; never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub current: HourlyRecord,
    /// Index 0 is today.
    pub days: Vec<DayRecord>,
    /// Same indexing as `days`.
    pub ephemeris: Vec<Ephemeris>,
    pub location: Location,
    pub units: UnitLabels,
    pub provider: ProviderKind,
    pub created_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    pub fn provider_name(&self) -> &'static str {
        self.provider.display_name()
    }

    pub fn day(&self, index: usize) -> Option<&DayRecord> {
        self.days.get(index)
    }

    pub fn temperature_text(&self, value: Option<f64>) -> String {
        display_value(value, self.units.temperature_label())
    }

    pub fn wind_text(&self, value: Option<f64>) -> String {
        display_value(value, self.units.wind_label())
    }

    pub fn visibility_text(&self, value: Option<f64>) -> String {
        display_value(value, self.units.visibility_label())
    }
}

/// Data availability as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidityState {
    #[default]
    Startup,
    Valid,
    /// A request failed and a quick retry is pending.
    Pending,
    /// Retries exhausted for now; data is stale or missing.
    Unavailable,
}

/// Formats `value unit`, or the sentinel when the value is absent.
pub fn display_value(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => {
            let rounded = (v * 10.0).round() / 10.0;
            // avoid printing "-0"
            let rounded = if rounded == 0.0 { 0.0 } else { rounded };
            format!("{rounded} {unit}")
        }
        None => NOT_AVAILABLE.to_string(),
    }
}
