//! # Host Settings
//!
//! Settings for the controller process itself, as opposed to the motor pin
//! document managed by [`crate::store`].
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5000"
//!
//! [motors]
//! pin_config = "motor_config.json"
//!
//! [pulse]
//! half_period_us = 1000
//! timeout_ms = 1000
//! max_steps = 100000
//!
//! [gpio]
//! backend = "auto"
//! ```
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration.

// src/config.rs - Host settings file
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Top-level settings for the stepper host.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HostConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub motors: MotorsConfig,
    #[serde(default)]
    pub pulse: PulseSettings,
    #[serde(default)]
    pub gpio: GpioConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Where the motor pin document lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotorsConfig {
    #[serde(default = "default_pin_config")]
    pub pin_config: PathBuf,
}

impl Default for MotorsConfig {
    fn default() -> Self {
        Self { pin_config: default_pin_config() }
    }
}

/// Step pulse timing and limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PulseSettings {
    /// Default time the step pin stays high (and then low) per pulse.
    #[serde(default = "default_half_period_us")]
    pub half_period_us: u64,
    #[serde(default = "default_min_half_period_us")]
    pub min_half_period_us: u64,
    #[serde(default = "default_max_half_period_us")]
    pub max_half_period_us: u64,
    /// Upper bound on a single actuator pulse call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl Default for PulseSettings {
    fn default() -> Self {
        Self {
            half_period_us: default_half_period_us(),
            min_half_period_us: default_min_half_period_us(),
            max_half_period_us: default_max_half_period_us(),
            timeout_ms: default_timeout_ms(),
            max_steps: default_max_steps(),
        }
    }
}

impl PulseSettings {
    /// Requested half period clamped to the configured bounds.
    pub fn clamp_half_period(&self, requested_us: Option<u64>) -> Duration {
        let us = requested_us
            .unwrap_or(self.half_period_us)
            .max(self.min_half_period_us)
            .min(self.max_half_period_us);
        Duration::from_micros(us)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_half_period_us > self.max_half_period_us {
            return Err("pulse.min_half_period_us must not exceed pulse.max_half_period_us".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("pulse.timeout_ms must be > 0".to_string());
        }
        if self.max_steps == 0 {
            return Err("pulse.max_steps must be > 0".to_string());
        }
        Ok(())
    }
}

/// Which GPIO backend drives the pins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Auto,
    Simulated,
    Rpi,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GpioConfig {
    #[serde(default)]
    pub backend: BackendKind,
}

impl HostConfig {
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.pulse.validate().map_err(SettingsError::Invalid)
    }
}

// Default value functions
fn default_bind() -> String { "0.0.0.0:5000".to_string() }
fn default_pin_config() -> PathBuf { PathBuf::from("motor_config.json") }
fn default_half_period_us() -> u64 { 1000 }
fn default_min_half_period_us() -> u64 { 100 }
fn default_max_half_period_us() -> u64 { 100_000 }
fn default_timeout_ms() -> u64 { 1000 }
fn default_max_steps() -> u32 { 100_000 }

/// Load settings from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<HostConfig, SettingsError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read settings file '{}': {}", path, e);
        SettingsError::Io(e)
    })?;
    let config: HostConfig = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse settings TOML: {}", e);
        SettingsError::Toml(e)
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_values() {
        let config = HostConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.motors.pin_config, PathBuf::from("motor_config.json"));
        assert_eq!(config.pulse.clamp_half_period(None), Duration::from_millis(1));
        assert_eq!(config.pulse.timeout(), Duration::from_secs(1));
        assert_eq!(config.pulse.max_steps, 100_000);
        assert_eq!(config.gpio.backend, BackendKind::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("stepper.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "[server]\nbind = '127.0.0.1:8080'\n[gpio]\nbackend = 'simulated'").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.gpio.backend, BackendKind::Simulated);
        // Defaults for missing sections
        assert_eq!(config.pulse, PulseSettings::default());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(SettingsError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(SettingsError::Toml(_))));
    }

    #[test]
    fn test_load_config_rejects_inverted_bounds() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("inverted.toml");
        std::fs::write(&file_path, "[pulse]\nmin_half_period_us = 500\nmax_half_period_us = 100\n").unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn test_clamp_half_period() {
        let pulse = PulseSettings::default();
        assert_eq!(pulse.clamp_half_period(None), Duration::from_micros(1000));
        assert_eq!(pulse.clamp_half_period(Some(5)), Duration::from_micros(100));
        assert_eq!(pulse.clamp_half_period(Some(2500)), Duration::from_micros(2500));
        assert_eq!(pulse.clamp_half_period(Some(10_000_000)), Duration::from_micros(100_000));
    }
}
