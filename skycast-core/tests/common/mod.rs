#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use skycast_core::{
    FetchConfig, HandlerSettings, Location, ProviderKind, WeatherError, WeatherFetcher,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Open-Meteo payload with two hourly records around noon of 2024-01-01.
pub const OPEN_METEO: &str = r#"{
    "utc_offset_seconds": 3600,
    "daily": {
        "time": ["2024-01-01"],
        "sunrise": ["2024-01-01T08:30"],
        "sunset": ["2024-01-01T16:27"]
    },
    "hourly": {
        "time": ["2024-01-01T12:00", "2024-01-01T13:00"],
        "temperature_2m": [3.5, 4.0],
        "weathercode": [1, 3],
        "windspeed_10m": [18.0, 21.6],
        "winddirection_10m": [225, 230]
    }
}"#;

pub fn settings() -> HandlerSettings {
    HandlerSettings {
        provider: ProviderKind::OpenMeteo,
        ..HandlerSettings::default()
    }
}

pub fn hamburg() -> Location {
    Location::default()
}

pub fn berlin() -> Location {
    Location::new("Berlin, DE", 13.404954, 52.520008)
}

/// One fetch as seen by the collaborator.
#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub request: FetchConfig,
}

#[derive(Debug)]
pub enum Step {
    Reply(Result<String, WeatherError>),
    /// Answer only after the given (virtual) delay.
    Slow(Duration, Result<String, WeatherError>),
}

pub fn ok() -> Step {
    Step::Reply(Ok(OPEN_METEO.to_string()))
}

pub fn network_error() -> Step {
    Step::Reply(Err(WeatherError::Network("connection refused".to_string())))
}

/// Replays a script of answers and reports every call on a channel.
///
/// Once the script is exhausted every call fails with a network error.
#[derive(Debug)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Step>>,
    calls: mpsc::UnboundedSender<Call>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Step>) -> (Self, mpsc::UnboundedReceiver<Call>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let fetcher = Self {
            script: Mutex::new(script.into()),
            calls: tx,
        };
        (fetcher, rx)
    }
}

#[async_trait]
impl WeatherFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchConfig) -> Result<String, WeatherError> {
        let _ = self.calls.send(Call {
            at: Instant::now(),
            request: request.clone(),
        });
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(result)) => result,
            Some(Step::Slow(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            None => Err(WeatherError::Network("script exhausted".to_string())),
        }
    }
}
