//! On-disk snapshot cache with a modification-time based staleness check.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::WeatherError;
use crate::model::WeatherSnapshot;

/// Bumped whenever the serialized snapshot layout changes.
const CACHE_FORMAT: u32 = 1;

#[derive(Serialize)]
struct CacheEnvelopeRef<'a> {
    format: u32,
    snapshot: &'a WeatherSnapshot,
}

#[derive(Deserialize)]
struct CacheEnvelope {
    format: u32,
    snapshot: WeatherSnapshot,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
    ttl_minutes: u32,
}

impl CacheStore {
    /// `ttl_minutes == 0` disables reading; writes still go through the caller's gate.
    pub fn new(path: impl Into<PathBuf>, ttl_minutes: u32) -> Self {
        Self {
            path: path.into(),
            ttl_minutes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl_minutes(&self) -> u32 {
        self.ttl_minutes
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl_minutes > 0
    }

    /// Serializes `snapshot` next to the cache file and renames it into place.
    pub fn write(&self, snapshot: &WeatherSnapshot) -> Result<(), WeatherError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                WeatherError::Cache(format!("failed to create cache directory: {e}"))
            })?;
        }

        let envelope = CacheEnvelopeRef {
            format: CACHE_FORMAT,
            snapshot,
        };
        let json = serde_json::to_vec(&envelope)
            .map_err(|e| WeatherError::Cache(format!("failed to serialize snapshot: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| WeatherError::Cache(format!("failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            WeatherError::Cache(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        tracing::debug!(path = %self.path.display(), "snapshot cached");
        Ok(())
    }

    /// The cached snapshot, if caching is enabled and the file is younger than the TTL.
    pub fn read(&self) -> Option<WeatherSnapshot> {
        self.read_at(SystemTime::now())
    }

    pub fn read_at(&self, now: SystemTime) -> Option<WeatherSnapshot> {
        if !self.is_enabled() {
            return None;
        }

        let modified = std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        // a file from the future counts as fresh
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age >= Duration::from_secs(u64::from(self.ttl_minutes) * 60) {
            tracing::debug!(age_secs = age.as_secs(), "cached snapshot expired");
            return None;
        }

        let contents = std::fs::read(&self.path).ok()?;
        match serde_json::from_slice::<CacheEnvelope>(&contents) {
            Ok(envelope) if envelope.format == CACHE_FORMAT => Some(envelope.snapshot),
            Ok(envelope) => {
                tracing::warn!(
                    format = envelope.format,
                    "ignoring cache written in another format"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable cache file");
                None
            }
        }
    }

    pub fn clear(&self) -> Result<(), WeatherError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WeatherError::Cache(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
