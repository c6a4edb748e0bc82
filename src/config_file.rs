//! Configuration file support
//!
//! Loads converter configuration from TOML files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{ConverterConfig, EncoderSettings, LoggingConfig};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Encoder settings
    pub encoder: Option<EncoderSection>,
    /// Logging settings
    pub logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderSection {
    /// AAC bitrate in bps
    pub bitrate: Option<u64>,
    /// Bytes pulled per iteration
    pub chunk_size: Option<usize>,
    /// Minimum progress step between notifications
    pub progress_step: Option<f64>,
    /// FFmpeg muxer name (adts, ipod, mp4, ...)
    pub container: Option<String>,
    /// Progress horizon for sources of unknown length, in seconds
    pub unbounded_estimate_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let defaults = ConverterConfig::default();
        Self {
            encoder: Some(EncoderSection {
                bitrate: defaults.encoder.bitrate,
                chunk_size: Some(defaults.encoder.chunk_size),
                progress_step: Some(defaults.encoder.progress_step),
                container: defaults.encoder.container,
                unbounded_estimate_secs: Some(defaults.encoder.unbounded_estimate_secs),
            }),
            logging: Some(LoggingSection {
                level: defaults.logging.level,
                format: Some(defaults.logging.format),
            }),
        }
    }

    /// Convert to ConverterConfig, filling gaps with defaults
    pub fn into_config(self) -> ConverterConfig {
        let defaults = EncoderSettings::default();
        let encoder = self.encoder.unwrap_or_default();
        ConverterConfig {
            encoder: EncoderSettings {
                bitrate: encoder.bitrate,
                chunk_size: encoder.chunk_size.unwrap_or(defaults.chunk_size),
                progress_step: encoder.progress_step.unwrap_or(defaults.progress_step),
                container: encoder.container,
                unbounded_estimate_secs: encoder
                    .unbounded_estimate_secs
                    .unwrap_or(defaults.unbounded_estimate_secs),
            },
            logging: self
                .logging
                .map(|l| LoggingConfig {
                    level: l.level,
                    format: l.format.unwrap_or_else(|| "pretty".to_string()),
                })
                .unwrap_or_default(),
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}
