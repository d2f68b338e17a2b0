use crate::{
    error::WeatherError,
    model::{FetchConfig, WeatherSnapshot},
    normalize::NormalizeContext,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug, time::Duration};

pub mod msn;
pub mod openmeteo;
pub mod openweather;

const REQUEST_TIMEOUT_SECS: u64 = 20;

/// OpenWeatherMap keys are 32 hex characters.
pub const OPENWEATHER_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Msn,
    OpenMeteo,
    OpenWeather,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Msn => "msn",
            ProviderKind::OpenMeteo => "openmeteo",
            ProviderKind::OpenWeather => "openweather",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Msn => "MSN Weather",
            ProviderKind::OpenMeteo => "Open-Meteo",
            ProviderKind::OpenWeather => "OpenWeatherMap",
        }
    }

    pub const fn all() -> &'static [ProviderKind] {
        &[ProviderKind::Msn, ProviderKind::OpenMeteo, ProviderKind::OpenWeather]
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderKind::OpenWeather)
    }

    /// Rejects configurations that cannot possibly produce a request.
    pub fn check_api_key(&self, api_key: Option<&str>) -> Result<(), WeatherError> {
        if !self.requires_api_key() {
            return Ok(());
        }
        match api_key.map(str::trim) {
            Some(key) if key.len() >= OPENWEATHER_KEY_LEN => Ok(()),
            _ => Err(WeatherError::Config(format!(
                "The API key for {} is not defined or invalid.\n\
                 Hint: run `skycast configure {}` and enter your API key.",
                self.display_name(),
                self.as_str()
            ))),
        }
    }

    /// Turns a raw payload of this provider into a canonical snapshot.
    pub fn normalize(
        &self,
        raw: &str,
        ctx: &NormalizeContext,
    ) -> Result<WeatherSnapshot, WeatherError> {
        match self {
            ProviderKind::Msn => msn::normalize(raw, ctx),
            ProviderKind::OpenMeteo => openmeteo::normalize(raw, ctx),
            ProviderKind::OpenWeather => openweather::normalize(raw, ctx),
        }
    }

    fn query(&self, request: &FetchConfig) -> Vec<(&'static str, String)> {
        match self {
            ProviderKind::Msn => msn::query(request),
            ProviderKind::OpenMeteo => openmeteo::query(request),
            ProviderKind::OpenWeather => openweather::query(request),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "msn" => Ok(ProviderKind::Msn),
            "openmeteo" | "open-meteo" | "omw" => Ok(ProviderKind::OpenMeteo),
            "openweather" | "openweathermap" | "owm" => Ok(ProviderKind::OpenWeather),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: msn, openmeteo, openweather."
            )),
        }
    }
}

/// Retrieves the raw payload for one request. Called off the control task.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch(&self, request: &FetchConfig) -> Result<String, WeatherError>;
}

/// Base URLs of the provider endpoints; overridable for tests and proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub msn: String,
    pub open_meteo: String,
    pub open_weather: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            msn: msn::ENDPOINT.to_string(),
            open_meteo: openmeteo::ENDPOINT.to_string(),
            open_weather: openweather::ENDPOINT.to_string(),
        }
    }
}

impl Endpoints {
    fn for_provider(&self, provider: ProviderKind) -> &str {
        match provider {
            ProviderKind::Msn => &self.msn,
            ProviderKind::OpenMeteo => &self.open_meteo,
            ProviderKind::OpenWeather => &self.open_weather,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    endpoints: Endpoints,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, WeatherError> {
        Self::with_endpoints(Endpoints::default())
    }

    pub fn with_endpoints(endpoints: Endpoints) -> Result<Self, WeatherError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, endpoints })
    }
}

#[async_trait]
impl WeatherFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchConfig) -> Result<String, WeatherError> {
        let provider = request.provider;
        let url = self.endpoints.for_provider(provider);

        let res = self
            .http
            .get(url)
            .query(&provider.query(request))
            .send()
            .await
            .map_err(|e| {
                WeatherError::Network(format!(
                    "Failed to send request to {}: {e}",
                    provider.display_name()
                ))
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            WeatherError::Network(format!(
                "Failed to read {} response body: {e}",
                provider.display_name()
            ))
        })?;

        if !status.is_success() {
            return Err(WeatherError::Network(format!(
                "{} request failed with status {}: {}",
                provider.display_name(),
                status,
                truncate_body(&body),
            )));
        }

        if body.trim().is_empty() {
            return Err(WeatherError::EmptyPayload);
        }

        tracing::debug!(provider = %provider, bytes = body.len(), "weather payload received");
        Ok(body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
