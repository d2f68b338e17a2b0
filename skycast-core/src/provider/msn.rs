//! MSN weather overview adapter.
//!
//! Nested payload: `responses[0].weather[0]` carries a `current` block and
//! `forecast.days[]`, each day with an `almanac`, a `daily` summary and its
//! own `hourly` list. Condition codes are symbols such as `d2000` / `n2000`.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::{
    error::WeatherError,
    icons::ProviderCodeTable,
    model::{FetchConfig, HourlyRecord, IconCodes, UnitLabels, WeatherSnapshot},
    normalize::{self, Almanac, NormalizeContext, Parts, lenient_f64, lenient_string},
    provider::ProviderKind,
    units::{UnitSystem, WindUnit, wind_sign},
};

pub const ENDPOINT: &str = "https://assets.msn.com/service/weather/overview";

/// MSN symbol → (yahoo, meteo).
pub static CODES: ProviderCodeTable = &[
    ("d0000", ("32", "B")),
    ("n0000", ("31", "C")),
    ("d1000", ("34", "1")),
    ("n1000", ("33", "2")),
    ("d2000", ("30", "H")),
    ("n2000", ("29", "I")),
    ("d3000", ("28", "J")),
    ("n3000", ("27", "K")),
    ("d4000", ("26", "Y")),
    ("n4000", ("26", "Y")),
    ("d0900", ("20", "M")),
    ("n0900", ("20", "M")),
    ("d1100", ("39", "Q")),
    ("n1100", ("45", "Q")),
    ("d2100", ("39", "Q")),
    ("n2100", ("45", "Q")),
    ("d3100", ("11", "Q")),
    ("n3100", ("45", "Q")),
    ("d4100", ("11", "Q")),
    ("n4100", ("11", "Q")),
    ("d4200", ("12", "R")),
    ("n4200", ("12", "R")),
    ("d4300", ("40", "R")),
    ("n4300", ("40", "R")),
    ("d4110", ("9", "Q")),
    ("n4110", ("9", "Q")),
    ("d4210", ("10", "X")),
    ("n4210", ("10", "X")),
    ("d4220", ("5", "X")),
    ("n4220", ("5", "X")),
    ("d2400", ("41", "U")),
    ("n2400", ("46", "U")),
    ("d4400", ("16", "W")),
    ("n4400", ("16", "W")),
    ("d4500", ("42", "W")),
    ("n4500", ("42", "W")),
    ("d2240", ("37", "O")),
    ("n2240", ("47", "O")),
    ("d4240", ("4", "P")),
    ("n4240", ("4", "P")),
    ("d4340", ("3", "P")),
    ("n4340", ("3", "P")),
];

pub(crate) fn query(request: &FetchConfig) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(6);
    if let Some(key) = request.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
        params.push(("apikey", key.clone()));
    }
    let units = match request.units {
        UnitSystem::Metric => "C",
        UnitSystem::Imperial => "F",
    };
    params.extend([
        ("lat", request.location.lat.to_string()),
        ("lon", request.location.lon.to_string()),
        ("units", units.to_string()),
        ("locale", request.language.clone()),
        ("days", if request.reduced { "6" } else { "10" }.to_string()),
    ]);
    params
}

#[derive(Debug, Deserialize)]
struct MsnResponse {
    #[serde(default)]
    units: MsnUnits,
    #[serde(default)]
    responses: Vec<MsnEnvelope>,
}

#[derive(Debug, Default, Deserialize)]
struct MsnUnits {
    #[serde(default, deserialize_with = "lenient_string")]
    speed: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pressure: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MsnEnvelope {
    #[serde(default)]
    weather: Vec<MsnWeather>,
}

#[derive(Debug, Deserialize)]
struct MsnWeather {
    current: Option<MsnObservation>,
    #[serde(default)]
    forecast: MsnForecast,
}

#[derive(Debug, Default, Deserialize)]
struct MsnForecast {
    #[serde(default)]
    days: Vec<MsnDay>,
}

#[derive(Debug, Deserialize)]
struct MsnDay {
    #[serde(default)]
    almanac: MsnAlmanac,
    #[serde(default)]
    daily: MsnDaily,
    #[serde(default)]
    hourly: Vec<MsnObservation>,
}

#[derive(Debug, Default, Deserialize)]
struct MsnAlmanac {
    #[serde(default, deserialize_with = "lenient_string")]
    valid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    sunrise: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    sunset: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    moonrise: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    moonset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MsnDaily {
    #[serde(default, deserialize_with = "lenient_string")]
    valid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pvdr_cap: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MsnObservation {
    #[serde(default, deserialize_with = "lenient_string")]
    created: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    valid: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    feels: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    rh: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    baro: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    wind_spd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    wind_dir: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    wind_gust: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    uv: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    vis: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    precip: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    cap: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pvdr_cap: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    symbol: Option<String>,
}

impl MsnObservation {
    fn timestamp(&self) -> Option<&str> {
        self.valid.as_deref().or(self.created.as_deref())
    }

    fn into_record(
        self,
        almanac: &BTreeMap<chrono::NaiveDate, Almanac>,
        night_icons: bool,
    ) -> Option<HourlyRecord> {
        let time = self.timestamp().and_then(normalize::parse_local)?;
        let night = normalize::is_night_at(time, almanac);
        Some(HourlyRecord {
            pressure: self.baro,
            temperature: self.temp,
            feels_like: self.feels,
            humidity: self.rh,
            precipitation_probability: self.precip,
            wind_speed: self.wind_spd,
            wind_direction: self.wind_dir,
            wind_sign: self.wind_dir.map(wind_sign),
            wind_gusts: self.wind_gust,
            uv_index: self.uv,
            visibility: self.vis,
            short_description: self.cap,
            long_description: self.pvdr_cap,
            icon: IconCodes::from_native(CODES, self.symbol.as_deref())
                .translate(night, night_icons),
            is_night: night,
            ..HourlyRecord::empty(time)
        })
    }
}

fn parse_time(text: Option<&str>) -> Option<chrono::NaiveDateTime> {
    text.and_then(normalize::parse_local)
}

fn units(system: UnitSystem, reported: &MsnUnits) -> UnitLabels {
    let wind = reported
        .speed
        .as_deref()
        .and_then(|s| WindUnit::from_str(s).ok())
        .unwrap_or(match system {
            UnitSystem::Metric => WindUnit::KilometersPerHour,
            UnitSystem::Imperial => WindUnit::MilesPerHour,
        });
    let pressure = reported.pressure.clone().unwrap_or_else(|| match system {
        UnitSystem::Metric => "hPa".to_string(),
        UnitSystem::Imperial => "inHg".to_string(),
    });
    UnitLabels {
        temperature: system.temperature(),
        wind,
        visibility: system.distance(),
        pressure,
        precipitation: "%".to_string(),
    }
}

pub(crate) fn normalize(
    raw: &str,
    ctx: &NormalizeContext,
) -> Result<WeatherSnapshot, WeatherError> {
    let parsed: MsnResponse =
        serde_json::from_str(raw).map_err(|e| WeatherError::Parse(format!("MSN payload: {e}")))?;

    let report_units = units(ctx.units, &parsed.units);
    let weather = parsed
        .responses
        .into_iter()
        .next()
        .and_then(|r| r.weather.into_iter().next())
        .ok_or_else(|| WeatherError::Parse("MSN payload contained no weather block".to_string()))?;

    let utc_offset = weather
        .current
        .as_ref()
        .and_then(|c| c.timestamp())
        .or_else(|| weather.forecast.days.iter().find_map(|d| d.almanac.sunrise.as_deref()))
        .and_then(normalize::parse_offset)
        .unwrap_or(0);

    let mut almanac = BTreeMap::new();
    let mut summaries = BTreeMap::new();
    for day in &weather.forecast.days {
        let sunrise = parse_time(day.almanac.sunrise.as_deref());
        let sunset = parse_time(day.almanac.sunset.as_deref());
        let date = parse_time(day.almanac.valid.as_deref())
            .or_else(|| parse_time(day.daily.valid.as_deref()))
            .or(sunrise)
            .map(|t| t.date());
        let Some(date) = date else {
            continue;
        };
        almanac.insert(
            date,
            Almanac {
                sunrise,
                sunset,
                moonrise: parse_time(day.almanac.moonrise.as_deref()),
                moonset: parse_time(day.almanac.moonset.as_deref()),
            },
        );
        if let Some(summary) = day.daily.pvdr_cap.clone() {
            summaries.insert(date, summary);
        }
    }

    let records: Vec<HourlyRecord> = weather
        .forecast
        .days
        .into_iter()
        .flat_map(|day| day.hourly)
        .filter_map(|obs| obs.into_record(&almanac, ctx.night_icons))
        .collect();

    let current = match weather.current.and_then(|c| c.into_record(&almanac, ctx.night_icons)) {
        Some(current) => current,
        None => normalize::nearest(&records, normalize::local_time(ctx.now, utc_offset))
            .cloned()
            .ok_or_else(|| {
                WeatherError::Parse("MSN payload contained no observations".to_string())
            })?,
    };

    let parts = Parts {
        current,
        hourly: records,
        almanac,
        summaries,
        utc_offset,
        units: report_units,
    };
    Ok(normalize::assemble(parts, ProviderKind::Msn, ctx))
}
