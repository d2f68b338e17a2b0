use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, Select, Text};
use skycast_core::{
    Config, HttpFetcher, Location, MoonInfo, NormalizeContext, ProviderKind, SessionContext,
    UnitConverter, UnitSystem, ValidityState, WeatherFetcher, WeatherHandler, WeatherSnapshot,
    WindUnit, config::CACHE_MINUTES_CHOICES,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Weather poller and moon calculator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure provider, credentials, location and units.
    Configure {
        /// Provider short name, e.g. "msn", "openmeteo" or "openweather".
        provider: Option<String>,
    },

    /// Fetch once and print current conditions and the forecast.
    Show,

    /// Keep polling and print every new snapshot until Ctrl-C.
    Watch,

    /// Print moon phase, illumination and distance.
    Moon {
        /// Date (YYYY-MM-DD) or RFC 3339 timestamp; if absent, means "now".
        #[arg(long)]
        date: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { provider } => configure(provider.as_deref()),
            Command::Show => show().await,
            Command::Watch => watch().await,
            Command::Moon { date } => moon(date.as_deref()),
        }
    }
}

fn configure(provider: Option<&str>) -> Result<()> {
    let mut cfg = Config::load()?;

    let provider = match provider {
        Some(name) => ProviderKind::try_from(name)?,
        None => {
            let options = ProviderKind::all().to_vec();
            let cursor = options.iter().position(|p| *p == cfg.provider).unwrap_or(0);
            Select::new("Weather provider:", options)
                .with_starting_cursor(cursor)
                .prompt()?
        }
    };
    cfg.set_provider(provider);

    if provider.requires_api_key() {
        let api_key = Password::new(&format!("API key for {}:", provider.display_name()))
            .without_confirmation()
            .prompt()?;
        cfg.upsert_provider_api_key(provider, api_key.trim().to_string());
    }

    let current = cfg.location.clone().unwrap_or_default();
    let name = Text::new("Location name:").with_default(&current.name).prompt()?;
    let lon = CustomType::<f64>::new("Longitude:")
        .with_default(current.lon)
        .prompt()?;
    let lat = CustomType::<f64>::new("Latitude:")
        .with_default(current.lat)
        .prompt()?;
    cfg.location = Some(Location::new(name, lon, lat));

    cfg.units = Select::new("Units:", vec![UnitSystem::Metric, UnitSystem::Imperial]).prompt()?;
    cfg.wind_unit = Select::new("Wind speed unit:", WindUnit::all().to_vec()).prompt()?;
    cfg.cache_minutes = Select::new(
        "Cache snapshots for (minutes):",
        CACHE_MINUTES_CHOICES.to_vec(),
    )
    .prompt()?;

    cfg.validate()?;
    cfg.save()?;

    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn show() -> Result<()> {
    let cfg = Config::load()?;
    let request = cfg.fetch_config()?;
    tracing::debug!(
        provider = %request.provider,
        location = %request.location.name,
        "one-off fetch"
    );

    let fetcher = HttpFetcher::new()?;
    let raw = fetcher.fetch(&request).await?;

    let ctx = NormalizeContext {
        units: request.units,
        night_icons: cfg.night_icons,
        now: Utc::now(),
        location: request.location.clone(),
    };
    let snapshot = request.provider.normalize(&raw, &ctx)?;
    let snapshot = UnitConverter::new(cfg.units, cfg.wind_unit).apply(snapshot);

    render::print_snapshot(&snapshot, &cfg.trend);
    Ok(())
}

async fn watch() -> Result<()> {
    let cfg = Config::load()?;
    let fetcher = Arc::new(HttpFetcher::new()?);
    let handler = WeatherHandler::spawn(cfg.handler_settings(), fetcher, cfg.cache_store()?);

    let glyphs = cfg.trend.clone();
    handler.subscribe(move |snapshot: &WeatherSnapshot| {
        render::print_snapshot(snapshot, &glyphs);
        println!();
    });
    handler.start(SessionContext::new());

    let mut validity = handler.watch_validity();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            changed = validity.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *validity.borrow_and_update();
                if matches!(state, ValidityState::Pending | ValidityState::Unavailable) {
                    eprintln!("Weather data is {}", render::validity_text(state));
                }
            }
        }
    }

    handler.shutdown().await;
    Ok(())
}

fn moon(date: Option<&str>) -> Result<()> {
    let at = match date {
        Some(text) => parse_moment(text)?,
        None => Utc::now(),
    };
    let cfg = Config::load()?;
    render::print_moon(at, &MoonInfo::at(at), &cfg.trend);
    Ok(())
}

fn parse_moment(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{text}', expected YYYY-MM-DD"))?;
    let noon = date
        .and_hms_opt(12, 0, 0)
        .context("Invalid time of day")?;
    Ok(noon.and_utc())
}
