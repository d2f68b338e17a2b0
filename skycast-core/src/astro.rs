//! Closed-form moon ephemeris: lunation position, phase, illumination and distance.

use std::f64::consts::PI;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// 2001-01-01T00:00:00Z, reference for the lunation series.
const LUNATION_EPOCH_SECS: i64 = 978_307_200;
/// Fraction of a lunation elapsed at the epoch.
const LUNATION_AT_EPOCH: f64 = 0.204_397_31;
/// Lunations per day (1 / synodic month).
const LUNATIONS_PER_DAY: f64 = 0.033_863_192_69;

/// 2000-01-01T12:00:00Z (J2000.0).
const J2000_SECS: i64 = 946_728_000;
const DAYS_PER_CENTURY: f64 = 36_525.0;

const SECS_PER_DAY: f64 = 86_400.0;

fn days_since(t: DateTime<Utc>, epoch_secs: i64) -> f64 {
    (t.timestamp_millis() - epoch_secs * 1000) as f64 / (SECS_PER_DAY * 1000.0)
}

/// Fraction of the current lunation in `[0, 1)`; 0 is new moon, 0.5 full moon.
pub fn moon_position(t: DateTime<Utc>) -> f64 {
    let lunations = LUNATION_AT_EPOCH + days_since(t, LUNATION_EPOCH_SECS) * LUNATIONS_PER_DAY;
    let position = lunations.rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    if position >= 1.0 { 0.0 } else { position }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoonPhase {
    New,
    WaxingCrescent,
    FirstQuarter,
    WaxingGibbous,
    Full,
    WaningGibbous,
    LastQuarter,
    WaningCrescent,
}

impl MoonPhase {
    const ALL: [MoonPhase; 8] = [
        MoonPhase::New,
        MoonPhase::WaxingCrescent,
        MoonPhase::FirstQuarter,
        MoonPhase::WaxingGibbous,
        MoonPhase::Full,
        MoonPhase::WaningGibbous,
        MoonPhase::LastQuarter,
        MoonPhase::WaningCrescent,
    ];

    pub fn from_position(position: f64) -> Self {
        Self::ALL[usize::from(moon_phase_index(position))]
    }

    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            MoonPhase::New => "New moon",
            MoonPhase::WaxingCrescent => "Waxing crescent",
            MoonPhase::FirstQuarter => "First quarter",
            MoonPhase::WaxingGibbous => "Waxing gibbous",
            MoonPhase::Full => "Full moon",
            MoonPhase::WaningGibbous => "Waning gibbous",
            MoonPhase::LastQuarter => "Last quarter",
            MoonPhase::WaningCrescent => "Waning crescent",
        }
    }
}

impl fmt::Display for MoonPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One of 8 phase buckets, 0 = new moon, 4 = full moon.
pub fn moon_phase_index(position: f64) -> u8 {
    ((position * 8.0 + 0.5).floor() as i64 & 7) as u8
}

/// Illuminated fraction of the disc in percent.
pub fn moon_illumination(position: f64) -> f64 {
    let dark = (PI * position).cos().abs().powf(1.7) * 100.0;
    let lit = 100.0 - dark;
    if lit < 1e-9 { 0.0 } else { lit.min(100.0) }
}

/// Earth-moon distance in km from a truncated Chapront series.
pub fn moon_distance(t: DateTime<Utc>) -> f64 {
    let centuries = days_since(t, J2000_SECS) / DAYS_PER_CENTURY;
    // mean elongation of the moon
    let dd = (297.850_192_1 + 445_267.111_403_4 * centuries).to_radians();
    // mean anomaly of the moon
    let m = (134.963_396_4 + 477_198.867_505_5 * centuries).to_radians();

    385_000.56
        - 20_905.355 * m.cos()
        - 3_699.111 * (2.0 * dd - m).cos()
        - 2_955.968 * (2.0 * dd).cos()
        - 569.925 * (2.0 * m).cos()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Rising,
    Falling,
    Steady,
}

/// Compares a value against the same value one hour earlier.
pub fn trend(current: f64, previous: f64) -> Trend {
    if current > previous {
        Trend::Rising
    } else if current < previous {
        Trend::Falling
    } else {
        Trend::Steady
    }
}

/// Glyphs substituted for trends when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendGlyphs {
    pub enabled: bool,
    pub rising: String,
    pub falling: String,
    pub neutral: String,
}

impl Default for TrendGlyphs {
    fn default() -> Self {
        Self {
            enabled: true,
            rising: "↑".to_string(),
            falling: "↓".to_string(),
            neutral: String::new(),
        }
    }
}

impl TrendGlyphs {
    pub fn glyph(&self, trend: Trend) -> &str {
        if !self.enabled {
            return &self.neutral;
        }
        match trend {
            Trend::Rising => &self.rising,
            Trend::Falling => &self.falling,
            Trend::Steady => &self.neutral,
        }
    }
}

/// Moon state at one instant, with trends against the previous hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoonInfo {
    pub position: f64,
    pub phase: MoonPhase,
    pub illumination: f64,
    pub distance_km: f64,
    pub illumination_trend: Trend,
    pub distance_trend: Trend,
}

impl MoonInfo {
    pub fn at(t: DateTime<Utc>) -> Self {
        let earlier = t - TimeDelta::hours(1);
        let position = moon_position(t);
        let illumination = moon_illumination(position);
        let distance_km = moon_distance(t);

        Self {
            position,
            phase: MoonPhase::from_position(position),
            illumination,
            distance_km,
            illumination_trend: trend(illumination, moon_illumination(moon_position(earlier))),
            distance_trend: trend(distance_km, moon_distance(earlier)),
        }
    }
}
