use rtblock_engine::{DriverOptions, SimOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to parse {path}: {source}")]
    TomlParse {
        path: String,
        source: toml::de::Error,
    },
}

/// Settings for the demo tone and the simulated device it plays through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub frequency_hz: f32,
    pub gain: f32,
    /// Spacing between scheduled tone changes.
    pub event_interval_ms: u64,
    /// How far ahead of "now" each change is scheduled.
    pub lead_ms: u64,
    pub drift_ppm: f64,
    /// Zero runs until SIGINT/SIGTERM.
    pub run_seconds: u64,
    pub sim: SimOptions,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 440.0,
            gain: 0.2,
            event_interval_ms: 250,
            lead_ms: 20,
            drift_ppm: 0.0,
            run_seconds: 0,
            sim: SimOptions {
                realtime: true,
                ..SimOptions::default()
            },
        }
    }
}

impl DemoConfig {
    pub fn event_interval(&self) -> Duration {
        Duration::from_millis(self.event_interval_ms.max(1))
    }

    pub fn lead(&self) -> Duration {
        Duration::from_millis(self.lead_ms)
    }

    pub fn run_for(&self) -> Option<Duration> {
        (self.run_seconds > 0).then(|| Duration::from_secs(self.run_seconds))
    }

    /// Simulated device options with the top-level drift applied.
    pub fn sim_options(&self) -> SimOptions {
        let mut sim = self.sim.clone();
        if self.drift_ppm != 0.0 {
            sim.drift_ppm = self.drift_ppm;
        }
        sim
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub driver: DriverOptions,
    pub demo: DemoConfig,
}

impl RunnerConfig {
    /// Loads the file at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::TomlParse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
