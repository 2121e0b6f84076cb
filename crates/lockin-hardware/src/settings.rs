//! Engine settings: timeouts, retry policy, transfer sizing and device
//! error patterns, loaded from TOML with `LOCKIN_`-prefixed environment
//! overrides.

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use lockin_core::{limits, CatalogError, EngineError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Runtime knobs for the dispatch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Per-request transport timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retry attempts after the first try, for transient transport faults.
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled per attempt.
    pub backoff_ms: u64,
    /// Samples per upload chunk.
    pub chunk_samples: usize,
    /// Poll interval while waiting for acquisition data, milliseconds.
    pub poll_interval_ms: u64,
    /// Response substrings (regex) the instrument uses to signal rejection.
    pub error_patterns: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            max_retries: 2,
            backoff_ms: 50,
            chunk_samples: 4_096,
            poll_interval_ms: 20,
            error_patterns: vec!["^ERR".to_string(), "(?i)error".to_string()],
        }
    }
}

impl EngineSettings {
    /// Load settings from a TOML file merged with `LOCKIN_` env overrides,
    /// on top of the defaults.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        debug!("loading engine settings from {}", path.display());
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("LOCKIN_"))
            .extract()
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
        settings.validated()
    }

    /// Env-only load, for callers without a settings file.
    pub fn from_env() -> Result<Self, CatalogError> {
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("LOCKIN_"))
            .extract()
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
        settings.validated()
    }

    fn validated(self) -> Result<Self, CatalogError> {
        if self.chunk_samples == 0 || self.chunk_samples > limits::MAX_CHUNK_SAMPLES {
            return Err(CatalogError::Parse(format!(
                "chunk_samples {} outside 1..={}",
                self.chunk_samples,
                limits::MAX_CHUNK_SAMPLES
            )));
        }
        if self.timeout_ms == 0 {
            return Err(CatalogError::Parse("timeout_ms must be nonzero".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(CatalogError::Parse(
                "poll_interval_ms must be nonzero".into(),
            ));
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff before retry `attempt` (1-based), doubled per attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(1_u64 << attempt.min(16)))
    }
}

/// Compiled rejection patterns. A response matching any pattern means the
/// instrument refused the command; such failures are never retried.
#[derive(Debug, Clone, Default)]
pub struct RejectMatcher {
    patterns: Vec<Regex>,
}

impl RejectMatcher {
    /// Compile the configured patterns once, at engine build.
    pub fn compile(settings: &EngineSettings) -> Result<Self, CatalogError> {
        let mut patterns = Vec::with_capacity(settings.error_patterns.len());
        for pattern in &settings.error_patterns {
            let regex = Regex::new(pattern).map_err(|e| {
                CatalogError::Parse(format!("bad error pattern '{pattern}': {e}"))
            })?;
            patterns.push(regex);
        }
        Ok(Self { patterns })
    }

    /// Check a device response; a match is a `DeviceRejected` carrying the
    /// exact failed command.
    pub fn check(&self, command: &str, response: &str) -> Result<(), EngineError> {
        for pattern in &self.patterns {
            if pattern.is_match(response) {
                return Err(EngineError::DeviceRejected {
                    command: command.to_string(),
                    response: response.to_string(),
                });
            }
        }
        Ok(())
    }
}
