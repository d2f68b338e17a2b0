//! Plain-text rendering of snapshots and moon data.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use skycast_core::{
    MoonInfo, TrendGlyphs, ValidityState, WeatherSnapshot,
    model::{NOT_AVAILABLE, display_value},
    units::{compass_name, compass_point},
};

fn clock(time: Option<NaiveDateTime>) -> String {
    time.map_or_else(|| NOT_AVAILABLE.to_string(), |t| t.format("%H:%M").to_string())
}

fn text(value: Option<&str>) -> &str {
    value.unwrap_or(NOT_AVAILABLE)
}

pub fn validity_text(state: ValidityState) -> &'static str {
    match state {
        ValidityState::Startup => "starting up",
        ValidityState::Valid => "valid",
        ValidityState::Pending => "pending, retrying shortly",
        ValidityState::Unavailable => "unavailable",
    }
}

pub fn print_snapshot(snapshot: &WeatherSnapshot, glyphs: &TrendGlyphs) {
    let updated = snapshot.created_at.with_timezone(&Local);
    println!(
        "{} via {} (updated {})",
        snapshot.location.name,
        snapshot.provider_name(),
        updated.format("%Y-%m-%d %H:%M")
    );

    let now = &snapshot.current;
    let direction = now
        .wind_direction
        .map(|deg| compass_name(compass_point(deg)).to_string());
    println!(
        "  {}  {} (feels like {})",
        text(now.short_description.as_deref()),
        snapshot.temperature_text(now.temperature),
        snapshot.temperature_text(now.feels_like),
    );
    println!(
        "  wind {} {} from {}, gusts {}",
        snapshot.wind_text(now.wind_speed),
        text(now.wind_sign.as_deref()),
        text(direction.as_deref()),
        snapshot.wind_text(now.wind_gusts),
    );
    println!(
        "  humidity {}  pressure {}  uv {}  visibility {}  precipitation {}",
        display_value(now.humidity, "%"),
        display_value(now.pressure, &snapshot.units.pressure),
        display_value(now.uv_index, ""),
        snapshot.visibility_text(now.visibility),
        display_value(now.precipitation_probability, &snapshot.units.precipitation),
    );
    if let Some(long) = now.long_description.as_deref() {
        println!("  {long}");
    }

    if let Some(today) = snapshot.ephemeris.first() {
        println!(
            "  sun {} - {}  moon {} - {}  {} {}",
            clock(today.sunrise),
            clock(today.sunset),
            clock(today.moonrise),
            clock(today.moonset),
            today.moon.phase,
            moon_illumination(&today.moon, glyphs),
        );
    }

    println!();
    for day in &snapshot.days {
        println!(
            "  {} {}  {:>9} .. {:<9} wind {:<10} {:<5} rain {:<6} {}",
            day.short_weekday,
            day.date.format("%d.%m."),
            snapshot.temperature_text(day.min_temp),
            snapshot.temperature_text(day.max_temp),
            snapshot.wind_text(day.wind_speed),
            text(day.wind_sign.as_deref()),
            display_value(day.precipitation, &snapshot.units.precipitation),
            text(day.summary.as_deref()),
        );
    }
}

fn moon_illumination(moon: &MoonInfo, glyphs: &TrendGlyphs) -> String {
    format!("{:.1} %{}", moon.illumination, glyphs.glyph(moon.illumination_trend))
}

pub fn print_moon(at: DateTime<Utc>, moon: &MoonInfo, glyphs: &TrendGlyphs) {
    println!("Moon at {}", at.format("%Y-%m-%d %H:%M UTC"));
    println!("  phase         {} ({}/7)", moon.phase, moon.phase.index());
    println!("  lunation      {:.3}", moon.position);
    println!("  illumination  {}", moon_illumination(moon, glyphs));
    println!(
        "  distance      {:.0} km{}",
        moon.distance_km,
        glyphs.glyph(moon.distance_trend)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn absent_times_render_as_not_available() {
        assert_eq!(clock(None), NOT_AVAILABLE);
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 8, 5, 0).unwrap().naive_utc();
        assert_eq!(clock(Some(t)), "08:05");
    }

    #[test]
    fn illumination_carries_trend_glyph() {
        let waxing = MoonInfo::at(Utc.with_ymd_and_hms(2024, 1, 18, 3, 53, 0).unwrap());
        let rendered = moon_illumination(&waxing, &TrendGlyphs::default());
        assert!(rendered.ends_with("%↑"), "{rendered}");
    }
}
