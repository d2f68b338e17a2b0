//! Core library for the `skycast` weather tool.
//!
//! This crate defines:
//! - A fetch scheduler with retry/backoff and subscriber fan-out
//! - Adapters that normalize MSN, Open-Meteo and OpenWeatherMap payloads
//! - Icon-code translation, unit conversion and a moon calculator
//! - Snapshot caching and configuration handling
//!
//! It is used by `skycast-cli`, but can also be embedded in other hosts.

pub mod astro;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod icons;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod units;

pub use astro::{MoonInfo, MoonPhase, Trend, TrendGlyphs};
pub use cache::CacheStore;
pub use config::{Config, ProviderConfig};
pub use error::WeatherError;
pub use handler::{
    HandlerSettings, ResetCallback, SessionContext, SnapshotObserver, SubscriptionId,
    WeatherHandler,
};
pub use model::{
    DayRecord, Ephemeris, FetchConfig, HourlyRecord, IconCodes, Location, ValidityState,
    WeatherSnapshot,
};
pub use normalize::NormalizeContext;
pub use provider::{Endpoints, HttpFetcher, ProviderKind, WeatherFetcher};
pub use units::{UnitConverter, UnitSystem, WindUnit};
