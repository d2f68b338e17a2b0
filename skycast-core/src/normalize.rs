//! Building blocks shared by the provider adapters: lenient field decoding,
//! local-time handling, day bucketing and day aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::astro::MoonInfo;
use crate::model::{
    DayRecord, Ephemeris, HourlyRecord, IconCodes, Location, UnitLabels, WeatherSnapshot,
};
use crate::provider::ProviderKind;
use crate::units::UnitSystem;

/// Inputs of a normalization besides the raw payload.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub units: UnitSystem,
    pub night_icons: bool,
    pub now: DateTime<Utc>,
    /// Location the payload was requested for.
    pub location: Location,
}

/// Sun and moon times a provider reported for one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Almanac {
    pub sunrise: Option<NaiveDateTime>,
    pub sunset: Option<NaiveDateTime>,
    pub moonrise: Option<NaiveDateTime>,
    pub moonset: Option<NaiveDateTime>,
}

/// Adapter output before days and ephemerides are derived.
#[derive(Debug)]
pub(crate) struct Parts {
    pub current: HourlyRecord,
    pub hourly: Vec<HourlyRecord>,
    pub almanac: BTreeMap<NaiveDate, Almanac>,
    /// Provider-written day summaries, keyed by date.
    pub summaries: BTreeMap<NaiveDate, String>,
    /// Seconds east of UTC for the location.
    pub utc_offset: i32,
    pub units: UnitLabels,
}

// ---- lenient decoding -------------------------------------------------------
//
// A malformed optional field turns into `None` instead of failing the payload.

fn number_from(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    // "NaN" and "inf" parse, but are no more usable than garbage
    number.filter(|v| v.is_finite())
}

fn text_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_from(&value))
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(text_from(&value))
}

pub(crate) fn lenient_series<'de, D>(deserializer: D) -> Result<Vec<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().map(number_from).collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn lenient_texts<'de, D>(deserializer: D) -> Result<Vec<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().map(text_from).collect(),
        _ => Vec::new(),
    })
}

/// Element `index` of a column, `None` when the column is short or the cell is null.
pub(crate) fn cell<T: Clone>(column: &[Option<T>], index: usize) -> Option<T> {
    column.get(index).cloned().flatten()
}

// ---- time -------------------------------------------------------------------

/// Parses provider timestamps into local wall-clock time.
///
/// Accepts RFC 3339 (the offset is dropped, local time kept), ISO 8601
/// without offset with or without seconds, and bare dates.
pub(crate) fn parse_local(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    const FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// UTC offset carried by an RFC 3339 timestamp, in seconds.
pub(crate) fn parse_offset(text: &str) -> Option<i32> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.offset().local_minus_utc())
}

pub(crate) fn local_time(t: DateTime<Utc>, utc_offset: i32) -> NaiveDateTime {
    t.naive_utc() + TimeDelta::seconds(i64::from(utc_offset))
}

pub(crate) fn utc_time(local: NaiveDateTime, utc_offset: i32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&(local - TimeDelta::seconds(i64::from(utc_offset))))
}

pub(crate) fn unix_local(ts: i64, utc_offset: i32) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(ts, 0).map(|dt| local_time(dt, utc_offset))
}

// ---- derivation -------------------------------------------------------------

/// Night when strictly before sunrise or after sunset; never night if either bound is unknown.
pub fn is_night(
    time: NaiveDateTime,
    sunrise: Option<NaiveDateTime>,
    sunset: Option<NaiveDateTime>,
) -> bool {
    match (sunrise, sunset) {
        (Some(rise), Some(set)) => time < rise || time > set,
        _ => false,
    }
}

pub(crate) fn is_night_at(time: NaiveDateTime, almanac: &BTreeMap<NaiveDate, Almanac>) -> bool {
    almanac
        .get(&time.date())
        .is_some_and(|day| is_night(time, day.sunrise, day.sunset))
}

/// Splits records into day buckets.
///
/// A new bucket starts when a record's calendar date is later than the date of
/// the bucket being filled; out-of-order earlier records stay in the current bucket.
pub fn group_by_day(records: Vec<HourlyRecord>) -> Vec<Vec<HourlyRecord>> {
    let mut buckets: Vec<(NaiveDate, Vec<HourlyRecord>)> = Vec::new();
    for record in records {
        let date = record.time.date();
        match buckets.last_mut() {
            Some((bucket_date, bucket)) if date <= *bucket_date => bucket.push(record),
            _ => buckets.push((date, vec![record])),
        }
    }
    buckets.into_iter().map(|(_, bucket)| bucket).collect()
}

/// The record closest in time to `now`.
pub(crate) fn nearest(records: &[HourlyRecord], now: NaiveDateTime) -> Option<&HourlyRecord> {
    records
        .iter()
        .min_by_key(|r| (r.time - now).num_seconds().abs())
}

fn fold_option(
    values: impl Iterator<Item = Option<f64>>,
    pick: fn(f64, f64) -> f64,
) -> Option<f64> {
    values.flatten().reduce(pick)
}

/// Most frequent value; ties go to the first seen.
fn most_frequent<'a>(values: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max()?;
    counts.into_iter().find(|(_, n)| *n == best).map(|(v, _)| v)
}

/// Aggregates one day bucket. `records` must be non-empty.
pub fn aggregate_day(
    date: NaiveDate,
    records: &[HourlyRecord],
    summary: Option<String>,
) -> DayRecord {
    let strongest = records
        .iter()
        .filter(|r| r.wind_speed.is_some())
        .max_by(|a, b| {
            a.wind_speed
                .partial_cmp(&b.wind_speed)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

    let day_icons: Vec<IconCodes> = records
        .iter()
        .map(|r| r.icon.translate(false, false))
        .collect();
    let icon = match (
        most_frequent(day_icons.iter().map(|c| c.yahoo.as_str())),
        most_frequent(day_icons.iter().map(|c| c.meteo.as_str())),
    ) {
        (Some(yahoo), Some(meteo)) => IconCodes::new(yahoo, meteo),
        _ => IconCodes::unknown(),
    };

    let summary = summary.or_else(|| {
        most_frequent(records.iter().filter_map(|r| r.short_description.as_deref()))
            .map(str::to_string)
    });

    DayRecord {
        date,
        min_temp: fold_option(records.iter().map(|r| r.temperature), f64::min),
        max_temp: fold_option(records.iter().map(|r| r.temperature), f64::max),
        min_feels_like: fold_option(records.iter().map(|r| r.feels_like), f64::min),
        max_feels_like: fold_option(records.iter().map(|r| r.feels_like), f64::max),
        wind_speed: strongest.and_then(|r| r.wind_speed),
        wind_direction: strongest.and_then(|r| r.wind_direction),
        wind_sign: strongest.and_then(|r| r.wind_sign.clone()),
        max_gusts: fold_option(records.iter().map(|r| r.wind_gusts), f64::max),
        max_uv: fold_option(records.iter().map(|r| r.uv_index), f64::max),
        max_visibility: fold_option(records.iter().map(|r| r.visibility), f64::max),
        precipitation: fold_option(records.iter().map(|r| r.precipitation_probability), f64::max),
        weekday: date.format("%A").to_string(),
        short_weekday: date.format("%a").to_string(),
        summary,
        icon,
    }
}

fn ephemeris(date: NaiveDate, almanac: Option<&Almanac>, moon_at: DateTime<Utc>) -> Ephemeris {
    let almanac = almanac.cloned().unwrap_or_default();
    Ephemeris {
        date,
        sunrise: almanac.sunrise,
        sunset: almanac.sunset,
        moonrise: almanac.moonrise,
        moonset: almanac.moonset,
        moon: MoonInfo::at(moon_at),
    }
}

/// Turns adapter output into a snapshot: day buckets, day records and
/// per-day ephemerides (moon state at local noon, or at `now` for today).
pub(crate) fn assemble(
    parts: Parts,
    provider: ProviderKind,
    ctx: &NormalizeContext,
) -> WeatherSnapshot {
    let today = local_time(ctx.now, parts.utc_offset).date();
    let mut days = Vec::new();
    let mut ephemerides = Vec::new();

    for bucket in group_by_day(parts.hourly) {
        let Some(first) = bucket.first() else {
            continue;
        };
        let date = first.time.date();
        let moon_at = if date == today {
            ctx.now
        } else {
            date.and_hms_opt(12, 0, 0)
                .map(|noon| utc_time(noon, parts.utc_offset))
                .unwrap_or(ctx.now)
        };
        days.push(aggregate_day(date, &bucket, parts.summaries.get(&date).cloned()));
        ephemerides.push(ephemeris(date, parts.almanac.get(&date), moon_at));
    }

    WeatherSnapshot {
        current: parts.current,
        days,
        ephemeris: ephemerides,
        location: ctx.location.clone(),
        units: parts.units,
        provider,
        created_at: ctx.now,
    }
}
