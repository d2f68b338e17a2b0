use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    astro::TrendGlyphs,
    cache::CacheStore,
    error::WeatherError,
    handler::HandlerSettings,
    model::{FetchConfig, Location},
    provider::ProviderKind,
    units::{UnitSystem, WindUnit},
};

/// Cache lifetimes offered to the user, in minutes.
pub const CACHE_MINUTES_CHOICES: [u32; 4] = [0, 30, 60, 120];

/// Upper bound for `refresh_interval`, one day.
pub const MAX_REFRESH_INTERVAL: u32 = 1440;

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// provider = "openweather"
/// refresh_interval = 60
///
/// [location]
/// name = "Hamburg, DE"
/// lon = 10.000654
/// lat = 53.550341
///
/// [providers.openweather]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,
    /// Minutes; 0 turns automatic refresh off.
    pub refresh_interval: u32,
    /// Cache lifetime in minutes; 0 disables the cache.
    pub cache_minutes: u32,
    pub units: UnitSystem,
    pub wind_unit: WindUnit,
    pub night_icons: bool,
    pub language: String,
    pub reduced: bool,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub trend: TrendGlyphs,
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            refresh_interval: 120,
            cache_minutes: 0,
            units: UnitSystem::default(),
            wind_unit: WindUnit::default(),
            night_icons: true,
            language: "en-us".to_string(),
            reduced: true,
            enabled: true,
            location: Some(Location::default()),
            trend: TrendGlyphs::default(),
            providers: HashMap::new(),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "skycast", "skycast")
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))
}

impl Config {
    /// Load config from disk, or return the defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Path to the snapshot cache.
    pub fn cache_file_path() -> Result<PathBuf> {
        Ok(project_dirs()?.cache_dir().join("snapshot.json"))
    }

    pub fn cache_store(&self) -> Result<CacheStore> {
        Ok(CacheStore::new(Self::cache_file_path()?, self.cache_minutes))
    }

    /// Select the active provider.
    pub fn set_provider(&mut self, provider: ProviderKind) {
        self.provider = provider;
    }

    /// Set/replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider: ProviderKind, api_key: String) {
        self.providers
            .insert(provider.as_str().to_string(), ProviderConfig { api_key });
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider: ProviderKind) -> Option<&str> {
        self.providers
            .get(provider.as_str())
            .map(|cfg| cfg.api_key.as_str())
    }

    /// Checks everything a fetch needs; the scheduler treats a failure as terminal.
    pub fn validate(&self) -> Result<(), WeatherError> {
        let location = self.location.as_ref().ok_or_else(|| {
            WeatherError::Config(
                "No location configured.\n\
                 Hint: run `skycast configure` and enter a location."
                    .to_string(),
            )
        })?;
        if !(-180.0..=180.0).contains(&location.lon) || !(-90.0..=90.0).contains(&location.lat) {
            return Err(WeatherError::Config(format!(
                "Location '{}' has invalid coordinates ({}, {}).",
                location.name, location.lon, location.lat
            )));
        }
        if !CACHE_MINUTES_CHOICES.contains(&self.cache_minutes) {
            return Err(WeatherError::Config(format!(
                "cache_minutes must be one of {CACHE_MINUTES_CHOICES:?}, got {}.",
                self.cache_minutes
            )));
        }
        if self.refresh_interval > MAX_REFRESH_INTERVAL {
            return Err(WeatherError::Config(format!(
                "refresh_interval must be at most {MAX_REFRESH_INTERVAL} minutes, got {}.",
                self.refresh_interval
            )));
        }
        self.provider
            .check_api_key(self.provider_api_key(self.provider))
    }

    /// The request a one-off fetch would send.
    pub fn fetch_config(&self) -> Result<FetchConfig, WeatherError> {
        self.validate()?;
        let location = self
            .location
            .clone()
            .ok_or_else(|| WeatherError::Config("No location configured.".to_string()))?;
        Ok(FetchConfig {
            provider: self.provider,
            api_key: self.provider_api_key(self.provider).map(str::to_string),
            units: self.units,
            language: self.language.clone(),
            location,
            reduced: self.reduced,
        })
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            provider: self.provider,
            api_key: self.provider_api_key(self.provider).map(str::to_string),
            location: self.location.clone(),
            units: self.units,
            wind_unit: self.wind_unit,
            language: self.language.clone(),
            reduced: self.reduced,
            night_icons: self.night_icons,
            refresh_interval: self.refresh_interval,
            enabled: self.enabled,
        }
    }
}
