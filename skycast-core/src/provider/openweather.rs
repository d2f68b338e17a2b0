use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    error::WeatherError,
    icons::ProviderCodeTable,
    model::{FetchConfig, HourlyRecord, IconCodes, UnitLabels, WeatherSnapshot},
    normalize::{self, Almanac, NormalizeContext, Parts, lenient_f64, lenient_string},
    provider::ProviderKind,
    units::{DistanceUnit, UnitSystem, WindUnit, wind_sign},
};

pub const ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/forecast";

/// OpenWeatherMap condition id → (yahoo, meteo).
pub static CODES: ProviderCodeTable = &[
    ("200", ("4", "O")),
    ("201", ("4", "O")),
    ("202", ("3", "P")),
    ("210", ("37", "O")),
    ("211", ("4", "P")),
    ("212", ("3", "P")),
    ("221", ("38", "P")),
    ("230", ("4", "O")),
    ("231", ("4", "O")),
    ("232", ("4", "P")),
    ("300", ("9", "Q")),
    ("301", ("9", "Q")),
    ("302", ("9", "Q")),
    ("310", ("9", "Q")),
    ("311", ("9", "Q")),
    ("312", ("9", "R")),
    ("313", ("11", "R")),
    ("314", ("11", "R")),
    ("321", ("11", "R")),
    ("500", ("11", "Q")),
    ("501", ("12", "R")),
    ("502", ("40", "R")),
    ("503", ("40", "R")),
    ("504", ("40", "R")),
    ("511", ("10", "X")),
    ("520", ("39", "Q")),
    ("521", ("11", "R")),
    ("522", ("40", "R")),
    ("531", ("40", "R")),
    ("600", ("14", "U")),
    ("601", ("16", "W")),
    ("602", ("42", "W")),
    ("611", ("18", "X")),
    ("612", ("18", "X")),
    ("613", ("18", "X")),
    ("615", ("5", "X")),
    ("616", ("5", "X")),
    ("620", ("14", "U")),
    ("621", ("16", "W")),
    ("622", ("43", "W")),
    ("701", ("20", "M")),
    ("711", ("22", "M")),
    ("721", ("21", "E")),
    ("731", ("19", "E")),
    ("741", ("20", "M")),
    ("751", ("19", "E")),
    ("761", ("19", "E")),
    ("762", ("22", "E")),
    ("771", ("24", "F")),
    ("781", ("0", "F")),
    ("800", ("32", "B")),
    ("801", ("34", "1")),
    ("802", ("30", "H")),
    ("803", ("28", "J")),
    ("804", ("26", "Y")),
];

pub(crate) fn query(request: &FetchConfig) -> Vec<(&'static str, String)> {
    vec![
        ("lat", request.location.lat.to_string()),
        ("lon", request.location.lon.to_string()),
        ("appid", request.api_key.clone().unwrap_or_default()),
        ("units", request.units.as_str().to_string()),
        ("lang", owm_language(&request.language)),
        ("cnt", if request.reduced { "16" } else { "40" }.to_string()),
    ]
}

/// `de-de` → `de`; OpenWeatherMap wants bare language codes except for a few regional ones.
fn owm_language(tag: &str) -> String {
    let tag = tag.replace('-', "_").to_lowercase();
    match tag.as_str() {
        "pt_br" | "zh_cn" | "zh_tw" => tag,
        _ => tag.split('_').next().unwrap_or("en").to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    #[serde(default)]
    list: Vec<OwForecastEntry>,
    city: Option<OwCity>,
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    #[serde(default, deserialize_with = "lenient_f64")]
    dt: Option<f64>,
    #[serde(default)]
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
    #[serde(default)]
    wind: OwWind,
    #[serde(default, deserialize_with = "lenient_f64")]
    visibility: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pop: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwMain {
    #[serde(default, deserialize_with = "lenient_f64")]
    temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    feels_like: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pressure: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    main: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OwWind {
    #[serde(default, deserialize_with = "lenient_f64")]
    speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    deg: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    gust: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwCity {
    #[serde(default, deserialize_with = "lenient_f64")]
    timezone: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    sunrise: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    sunset: Option<f64>,
}

fn units(system: UnitSystem) -> UnitLabels {
    let wind = match system {
        UnitSystem::Metric => WindUnit::MetersPerSecond,
        UnitSystem::Imperial => WindUnit::MilesPerHour,
    };
    UnitLabels {
        temperature: system.temperature(),
        wind,
        visibility: DistanceUnit::Meters,
        pressure: "hPa".to_string(),
        precipitation: "%".to_string(),
    }
}

pub(crate) fn normalize(
    raw: &str,
    ctx: &NormalizeContext,
) -> Result<WeatherSnapshot, WeatherError> {
    let parsed: OwForecastResponse = serde_json::from_str(raw)
        .map_err(|e| WeatherError::Parse(format!("OpenWeatherMap payload: {e}")))?;

    let city = parsed.city.unwrap_or_default();
    let utc_offset = city.timezone.map_or(0, |s| s as i32);

    // Sun times are only delivered for the current day.
    let sunrise = city.sunrise.and_then(|ts| normalize::unix_local(ts as i64, utc_offset));
    let sunset = city.sunset.and_then(|ts| normalize::unix_local(ts as i64, utc_offset));
    let mut almanac = BTreeMap::new();
    if let Some(date) = sunrise.or(sunset).map(|t| t.date()) {
        almanac.insert(
            date,
            Almanac {
                sunrise,
                sunset,
                ..Almanac::default()
            },
        );
    }

    let mut records = Vec::with_capacity(parsed.list.len());
    for entry in parsed.list {
        let Some(time) = entry.dt.and_then(|ts| normalize::unix_local(ts as i64, utc_offset)) else {
            continue;
        };
        let condition = entry.weather.into_iter().next();
        let code = condition.as_ref().and_then(|c| c.id.clone());
        let night = normalize::is_night_at(time, &almanac);

        records.push(HourlyRecord {
            pressure: entry.main.pressure,
            temperature: entry.main.temp,
            feels_like: entry.main.feels_like,
            humidity: entry.main.humidity,
            precipitation_probability: entry.pop.map(|p| (p * 100.0).round()),
            wind_speed: entry.wind.speed,
            wind_direction: entry.wind.deg,
            wind_sign: entry.wind.deg.map(wind_sign),
            wind_gusts: entry.wind.gust,
            visibility: entry.visibility,
            short_description: condition.as_ref().and_then(|c| c.main.clone()),
            long_description: condition.and_then(|c| c.description),
            icon: IconCodes::from_native(CODES, code.as_deref()).translate(night, ctx.night_icons),
            is_night: night,
            ..HourlyRecord::empty(time)
        });
    }

    let now = normalize::local_time(ctx.now, utc_offset);
    let current = normalize::nearest(&records, now)
        .cloned()
        .ok_or_else(|| {
            WeatherError::Parse("OpenWeatherMap payload had no forecast entries".to_string())
        })?;

    let parts = Parts {
        current,
        hourly: records,
        almanac,
        summaries: BTreeMap::new(),
        utc_offset,
        units: units(ctx.units),
    };
    Ok(normalize::assemble(parts, ProviderKind::OpenWeather, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Location;
    use chrono::{TimeZone, Utc};

    // 2024-01-01 in Hamburg (UTC+1): sunrise 08:30, sunset 16:27 local.
    const FORECAST: &str = r#"{
        "cod": "200",
        "list": [
            {
                "dt": 1704117600,
                "main": {"temp": 4.2, "feels_like": 1.0, "pressure": 1009, "humidity": 88},
                "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
                "wind": {"speed": 5.1, "deg": 230, "gust": 9.8},
                "visibility": 10000,
                "pop": 0.62
            },
            {
                "dt": 1704135600,
                "main": {"temp": 3.1, "feels_like": -0.4, "pressure": 1010, "humidity": 91},
                "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01n"}],
                "wind": {"speed": 3.0, "deg": 250},
                "pop": 0
            },
            {
                "dt": 1704200400,
                "main": {"temp": 2.0},
                "weather": [{"id": 804, "main": "Clouds", "description": "overcast clouds"}],
                "wind": {"speed": 2.0, "deg": 180}
            }
        ],
        "city": {
            "name": "Hamburg",
            "country": "DE",
            "timezone": 3600,
            "sunrise": 1704094200,
            "sunset": 1704122820
        }
    }"#;

    fn ctx(now: chrono::DateTime<Utc>) -> NormalizeContext {
        NormalizeContext {
            units: UnitSystem::Metric,
            night_icons: true,
            now,
            location: Location::new("Hamburg, DE", 10.0, 53.55),
        }
    }

    #[test]
    fn normalizes_three_hour_forecast() {
        // 14:10 UTC = 15:10 local, nearest entry is 15:00 local
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 14, 10, 0).unwrap();
        let snapshot = normalize(FORECAST, &ctx(now)).unwrap();

        let current = &snapshot.current;
        assert_eq!(current.temperature, Some(4.2));
        assert_eq!(current.short_description.as_deref(), Some("Rain"));
        assert_eq!(current.long_description.as_deref(), Some("light rain"));
        assert_eq!(current.precipitation_probability, Some(62.0));
        assert_eq!(current.wind_sign.as_deref(), Some("↗ SW"));
        assert_eq!(current.uv_index, None);
        assert!(!current.is_night);
        assert_eq!(current.icon, IconCodes::new("11", "Q"));
        assert_eq!(snapshot.units.wind, WindUnit::MetersPerSecond);
        assert_eq!(snapshot.units.visibility, DistanceUnit::Meters);
    }

    #[test]
    fn evening_entry_is_night_and_later_days_are_not() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0).unwrap();
        let snapshot = normalize(FORECAST, &ctx(now)).unwrap();

        // 20:00 local, after sunset: clear sky turns into the clear-night icon
        assert!(snapshot.current.is_night);
        assert_eq!(snapshot.current.icon, IconCodes::new("31", "C"));

        assert_eq!(snapshot.days.len(), 2);
        let ephemeris = &snapshot.ephemeris[1];
        assert_eq!(ephemeris.sunrise, None);
        assert_eq!(ephemeris.moonrise, None);
        assert!(snapshot.ephemeris[0].sunset.is_some());
    }

    #[test]
    fn forecast_without_entries_is_a_parse_error() {
        let err = normalize(r#"{"list": []}"#, &ctx(Utc::now())).unwrap_err();
        assert!(matches!(err, WeatherError::Parse(_)));
    }

    #[test]
    fn language_tags_are_shortened() {
        assert_eq!(owm_language("de-de"), "de");
        assert_eq!(owm_language("pt-BR"), "pt_br");
        assert_eq!(owm_language("en"), "en");
    }
}
