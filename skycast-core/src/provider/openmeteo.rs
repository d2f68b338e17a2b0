//! Open-Meteo forecast adapter.
//!
//! Column-oriented payload (`hourly.time[i]`, `hourly.temperature_2m[i]`, ...).
//! The service delivers no condition texts and no moon times.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    error::WeatherError,
    icons::ProviderCodeTable,
    model::{FetchConfig, HourlyRecord, IconCodes, UnitLabels, WeatherSnapshot},
    normalize::{
        self, Almanac, NormalizeContext, Parts, cell, lenient_f64, lenient_series, lenient_texts,
    },
    provider::ProviderKind,
    units::{DistanceUnit, UnitSystem, WindUnit, wind_sign},
};

pub const ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";

const HOURLY_FIELDS: &str = "temperature_2m,apparent_temperature,relativehumidity_2m,\
precipitation_probability,weathercode,windspeed_10m,winddirection_10m,windgusts_10m,\
uv_index,visibility,pressure_msl";

/// WMO weather interpretation code → (yahoo, meteo).
pub static CODES: ProviderCodeTable = &[
    ("0", ("32", "B")),
    ("1", ("34", "1")),
    ("2", ("30", "H")),
    ("3", ("26", "Y")),
    ("45", ("20", "M")),
    ("48", ("20", "M")),
    ("51", ("9", "Q")),
    ("53", ("9", "Q")),
    ("55", ("9", "R")),
    ("56", ("8", "X")),
    ("57", ("8", "X")),
    ("61", ("11", "Q")),
    ("63", ("12", "R")),
    ("65", ("40", "R")),
    ("66", ("10", "X")),
    ("67", ("10", "X")),
    ("71", ("13", "U")),
    ("73", ("16", "U")),
    ("75", ("42", "W")),
    ("77", ("13", "U")),
    ("80", ("39", "Q")),
    ("81", ("11", "R")),
    ("82", ("40", "R")),
    ("85", ("41", "U")),
    ("86", ("42", "W")),
    ("95", ("4", "P")),
    ("96", ("38", "O")),
    ("99", ("3", "O")),
];

pub(crate) fn query(request: &FetchConfig) -> Vec<(&'static str, String)> {
    let (temperature_unit, windspeed_unit) = match request.units {
        UnitSystem::Metric => ("celsius", "kmh"),
        UnitSystem::Imperial => ("fahrenheit", "mph"),
    };
    vec![
        ("latitude", request.location.lat.to_string()),
        ("longitude", request.location.lon.to_string()),
        ("hourly", HOURLY_FIELDS.to_string()),
        ("daily", "sunrise,sunset".to_string()),
        ("timezone", "auto".to_string()),
        ("forecast_days", if request.reduced { "6" } else { "14" }.to_string()),
        ("temperature_unit", temperature_unit.to_string()),
        ("windspeed_unit", windspeed_unit.to_string()),
    ]
}

#[derive(Debug, Deserialize)]
struct OmResponse {
    #[serde(default, deserialize_with = "lenient_f64")]
    utc_offset_seconds: Option<f64>,
    hourly: Option<OmHourly>,
    #[serde(default)]
    daily: OmDaily,
}

#[derive(Debug, Default, Deserialize)]
struct OmHourly {
    #[serde(default, deserialize_with = "lenient_texts")]
    time: Vec<Option<String>>,
    #[serde(default, deserialize_with = "lenient_series")]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    apparent_temperature: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    relativehumidity_2m: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    weathercode: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    windspeed_10m: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    winddirection_10m: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    windgusts_10m: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    uv_index: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    visibility: Vec<Option<f64>>,
    #[serde(default, deserialize_with = "lenient_series")]
    pressure_msl: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct OmDaily {
    #[serde(default, deserialize_with = "lenient_texts")]
    time: Vec<Option<String>>,
    #[serde(default, deserialize_with = "lenient_texts")]
    sunrise: Vec<Option<String>>,
    #[serde(default, deserialize_with = "lenient_texts")]
    sunset: Vec<Option<String>>,
}

fn almanac(daily: &OmDaily) -> BTreeMap<chrono::NaiveDate, Almanac> {
    let rows = daily.time.len().max(daily.sunrise.len()).max(daily.sunset.len());
    let mut almanac = BTreeMap::new();
    for i in 0..rows {
        let sunrise = cell(&daily.sunrise, i).and_then(|s| normalize::parse_local(&s));
        let sunset = cell(&daily.sunset, i).and_then(|s| normalize::parse_local(&s));
        let date = cell(&daily.time, i)
            .and_then(|s| normalize::parse_local(&s))
            .or(sunrise)
            .or(sunset)
            .map(|t| t.date());
        if let Some(date) = date {
            almanac.insert(
                date,
                Almanac {
                    sunrise,
                    sunset,
                    ..Almanac::default()
                },
            );
        }
    }
    almanac
}

fn units(system: UnitSystem) -> UnitLabels {
    let (wind, visibility) = match system {
        UnitSystem::Metric => (WindUnit::KilometersPerHour, DistanceUnit::Meters),
        UnitSystem::Imperial => (WindUnit::MilesPerHour, DistanceUnit::Feet),
    };
    UnitLabels {
        temperature: system.temperature(),
        wind,
        visibility,
        pressure: "hPa".to_string(),
        precipitation: "%".to_string(),
    }
}

pub(crate) fn normalize(
    raw: &str,
    ctx: &NormalizeContext,
) -> Result<WeatherSnapshot, WeatherError> {
    let parsed: OmResponse = serde_json::from_str(raw)
        .map_err(|e| WeatherError::Parse(format!("Open-Meteo payload: {e}")))?;

    let hourly = parsed
        .hourly
        .ok_or_else(|| {
            WeatherError::Parse("Open-Meteo payload contained no hourly data".to_string())
        })?;
    let utc_offset = parsed.utc_offset_seconds.map_or(0, |s| s as i32);
    let almanac = almanac(&parsed.daily);

    let mut records = Vec::with_capacity(hourly.time.len());
    for (i, time) in hourly.time.iter().enumerate() {
        let Some(time) = time.as_deref().and_then(normalize::parse_local) else {
            continue;
        };
        let code = cell(&hourly.weathercode, i).map(|c| format!("{}", c as i64));
        let night = normalize::is_night_at(time, &almanac);
        let wind_direction = cell(&hourly.winddirection_10m, i);

        records.push(HourlyRecord {
            pressure: cell(&hourly.pressure_msl, i),
            temperature: cell(&hourly.temperature_2m, i),
            feels_like: cell(&hourly.apparent_temperature, i),
            humidity: cell(&hourly.relativehumidity_2m, i),
            precipitation_probability: cell(&hourly.precipitation_probability, i),
            wind_speed: cell(&hourly.windspeed_10m, i),
            wind_direction,
            wind_sign: wind_direction.map(wind_sign),
            wind_gusts: cell(&hourly.windgusts_10m, i),
            uv_index: cell(&hourly.uv_index, i),
            visibility: cell(&hourly.visibility, i),
            icon: IconCodes::from_native(CODES, code.as_deref()).translate(night, ctx.night_icons),
            is_night: night,
            ..HourlyRecord::empty(time)
        });
    }

    let now = normalize::local_time(ctx.now, utc_offset);
    let current = normalize::nearest(&records, now)
        .cloned()
        .ok_or_else(|| {
            WeatherError::Parse("Open-Meteo payload had no usable hourly records".to_string())
        })?;

    let parts = Parts {
        current,
        hourly: records,
        almanac,
        summaries: BTreeMap::new(),
        utc_offset,
        units: units(ctx.units),
    };
    Ok(normalize::assemble(parts, ProviderKind::OpenMeteo, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icons::{METEO, YAHOO};
    use crate::model::{Location, NOT_AVAILABLE, display_value};
    use chrono::{TimeZone, Utc};

    fn ctx(now: chrono::DateTime<Utc>) -> NormalizeContext {
        NormalizeContext {
            units: UnitSystem::Metric,
            night_icons: true,
            now,
            location: Location::new("Hamburg, DE", 10.000654, 53.550341),
        }
    }

    const EVENING: &str = r#"{
        "daily": {"sunrise": ["2024-01-01T08:30"], "sunset": ["2024-01-01T16:27"]},
        "hourly": {"time": ["2024-01-01T20:00"], "temperature_2m": [3], "weathercode": [1]}
    }"#;

    #[test]
    fn evening_record_after_sunset_gets_night_icons() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        let snapshot = normalize(EVENING, &ctx(now)).unwrap();

        let current = &snapshot.current;
        assert!(current.is_night);
        assert_eq!(current.icon.meteo, METEO.night_variant("1").unwrap());
        assert_eq!(current.icon.yahoo, YAHOO.night_variant("34").unwrap());
        assert_eq!(snapshot.temperature_text(current.temperature), "3 °C");
        assert_eq!(snapshot.provider, ProviderKind::OpenMeteo);
    }

    #[test]
    fn missing_fields_stay_absent() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        let snapshot = normalize(EVENING, &ctx(now)).unwrap();

        let current = &snapshot.current;
        assert_eq!(current.uv_index, None);
        assert_eq!(current.long_description, None);
        assert_eq!(current.short_description, None);
        assert_eq!(display_value(current.humidity, "%"), NOT_AVAILABLE);

        let ephemeris = &snapshot.ephemeris[0];
        assert_eq!(ephemeris.moonrise, None);
        assert_eq!(ephemeris.moonset, None);
        assert!(ephemeris.sunrise.is_some());
    }

    #[test]
    fn days_are_bucketed_with_matching_ephemerides() {
        let raw = r#"{
            "utc_offset_seconds": 3600,
            "daily": {
                "time": ["2024-06-01", "2024-06-02"],
                "sunrise": ["2024-06-01T04:56", "2024-06-02T04:55"],
                "sunset": ["2024-06-01T21:49", "2024-06-02T21:50"]
            },
            "hourly": {
                "time": ["2024-06-01T12:00", "2024-06-01T23:00", "2024-06-02T03:00", "2024-06-02T15:00"],
                "temperature_2m": [21.5, 14.0, 11.2, 24.8],
                "weathercode": [0, 0, 3, 61],
                "windspeed_10m": [10.0, 5.0, "bad", 18.0],
                "winddirection_10m": [270, 250, 240, 225],
                "uv_index": [6.1, 0.0, 0.0, 5.2],
                "precipitation_probability": [0, 0, 10, 70]
            }
        }"#;
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 5, 0).unwrap();
        let snapshot = normalize(raw, &ctx(now)).unwrap();

        assert_eq!(snapshot.days.len(), 2);
        assert_eq!(snapshot.ephemeris.len(), 2);
        assert_eq!(snapshot.days[1].date, snapshot.ephemeris[1].date);

        // 10:05 UTC is 11:05 local, the noon record is nearest
        assert_eq!(snapshot.current.temperature, Some(21.5));
        assert!(!snapshot.current.is_night);

        let tomorrow = &snapshot.days[1];
        assert_eq!(tomorrow.min_temp, Some(11.2));
        assert_eq!(tomorrow.max_temp, Some(24.8));
        assert_eq!(tomorrow.wind_speed, Some(18.0));
        assert_eq!(tomorrow.wind_sign.as_deref(), Some("↗ SW"));
        assert_eq!(tomorrow.precipitation, Some(70.0));
        assert_eq!(tomorrow.max_uv, Some(5.2));
        assert_eq!(tomorrow.weekday, "Sunday");
    }

    #[test]
    fn unknown_codes_pass_through() {
        let raw = r#"{"hourly": {"time": ["2024-01-01T12:00"], "weathercode": [42]}}"#;
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let snapshot = normalize(raw, &ctx(now)).unwrap();
        assert_eq!(snapshot.current.icon, IconCodes::new("42", "42"));
    }

    #[test]
    fn non_finite_cells_render_as_not_available() {
        let raw = r#"{"hourly": {
            "time": ["2024-01-01T12:00"],
            "temperature_2m": ["NaN"],
            "windspeed_10m": ["inf"],
            "relativehumidity_2m": ["-inf"]
        }}"#;
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let snapshot = normalize(raw, &ctx(now)).unwrap();

        let current = &snapshot.current;
        assert_eq!(current.temperature, None);
        assert_eq!(current.wind_speed, None);
        assert_eq!(current.humidity, None);
        assert_eq!(snapshot.temperature_text(current.temperature), NOT_AVAILABLE);
        assert_eq!(snapshot.wind_text(current.wind_speed), NOT_AVAILABLE);
    }

    #[test]
    fn undecodable_payloads_are_parse_errors() {
        let now = Utc::now();
        assert!(matches!(normalize("<html>", &ctx(now)), Err(WeatherError::Parse(_))));
        assert!(matches!(normalize("{}", &ctx(now)), Err(WeatherError::Parse(_))));
        assert!(matches!(
            normalize(r#"{"hourly": {"time": []}}"#, &ctx(now)),
            Err(WeatherError::Parse(_))
        ));
    }

    #[test]
    fn query_follows_units_and_detail() {
        let request = FetchConfig {
            provider: ProviderKind::OpenMeteo,
            api_key: None,
            units: UnitSystem::Imperial,
            language: "en-us".to_string(),
            location: Location::new("Boston", -71.06, 42.36),
            reduced: true,
        };
        let params = query(&request);
        assert!(params.contains(&("temperature_unit", "fahrenheit".to_string())));
        assert!(params.contains(&("forecast_days", "6".to_string())));
        assert!(params.contains(&("latitude", "42.36".to_string())));
    }
}
