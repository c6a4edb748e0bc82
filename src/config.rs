//! Converter configuration

use serde::{Deserialize, Serialize};

/// Default bytes pulled from the source per iteration
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Encoder and encode-loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// AAC bitrate in bps; `None` picks one from the channel count
    pub bitrate: Option<u64>,

    /// Bytes pulled from the source per loop iteration
    pub chunk_size: usize,

    /// Minimum progress increase between two progress notifications. At 0.0
    /// every chunk that moves progress forward is reported.
    pub progress_step: f64,

    /// FFmpeg muxer name; `None` guesses from the destination extension
    pub container: Option<String>,

    /// Horizon in seconds for the progress estimate of sources without a length
    pub unbounded_estimate_secs: f64,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_step: 0.0,
            container: None,
            unbounded_estimate_secs: 30.0,
        }
    }
}

impl EncoderSettings {
    /// Bitrate to use for `channels` channels.
    pub fn bitrate_for(&self, channels: u32) -> u64 {
        self.bitrate
            .unwrap_or_else(|| get_recommended_bitrate(channels))
    }

    /// Chunk size rounded down to whole frames, at least one frame.
    pub fn chunk_bytes(&self, bytes_per_frame: usize) -> usize {
        let frames = (self.chunk_size / bytes_per_frame).max(1);
        frames * bytes_per_frame
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Complete converter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    pub encoder: EncoderSettings,
    pub logging: LoggingConfig,
}

/// Get recommended AAC bitrate for a given channel count.
pub fn get_recommended_bitrate(channels: u32) -> u64 {
    match channels {
        1 => 64_000,
        2 => 128_000,
        6 => 384_000,
        8 => 512_000,
        _ => 128_000,
    }
}
