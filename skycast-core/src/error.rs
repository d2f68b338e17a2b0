use thiserror::Error;

/// Failures that can occur while producing or persisting a weather snapshot.
#[derive(Debug, Error)]
pub enum WeatherError {
    /// Transport failure or non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered, but without a usable body.
    #[error("provider returned an empty payload")]
    EmptyPayload,

    /// The payload could not be decoded at all.
    #[error("failed to parse provider payload: {0}")]
    Parse(String),

    /// Nothing to fetch until the configuration changes.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(String),
}

impl WeatherError {
    /// Whether the scheduler should put this failure on the retry ladder.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WeatherError::Network(_) | WeatherError::EmptyPayload | WeatherError::Parse(_)
        )
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(err: reqwest::Error) -> Self {
        WeatherError::Network(err.to_string())
    }
}
