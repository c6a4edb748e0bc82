//! PCM stream format description
//!
//! A [`FormatDescriptor`] describes the raw PCM bytes a source produces. It
//! must describe linear PCM that the AAC encoder can accept before a job can
//! be constructed, and it never changes once the job exists.

use serde::{Deserialize, Serialize};

use crate::error::{ConverterError, Result};

/// Sample rates defined by the AAC sampling frequency table
pub const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Maximum channel count accepted by the encoder (7.1)
pub const MAX_CHANNELS: u32 = 8;

/// Container-level tag of the described stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatTag {
    LinearPcm,
    /// Any non-PCM format, identified by its four-character code or codec id
    Other(u32),
}

/// Numeric representation of each sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// Signed two's-complement integers (8-bit samples are unsigned, offset 128)
    SignedInteger,
    /// IEEE floating point
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Description of a PCM stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub sample_rate: f64,
    pub channel_count: u32,
    pub bits_per_channel: u32,
    pub interleaved: bool,
    pub format_tag: FormatTag,
    pub encoding: SampleEncoding,
    pub byte_order: ByteOrder,
}

impl FormatDescriptor {
    /// Interleaved, little-endian signed 16-bit PCM.
    pub fn pcm_s16(sample_rate: u32, channel_count: u32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            channel_count,
            bits_per_channel: 16,
            interleaved: true,
            format_tag: FormatTag::LinearPcm,
            encoding: SampleEncoding::SignedInteger,
            byte_order: ByteOrder::Little,
        }
    }

    /// Interleaved, native-endian 32-bit float PCM.
    pub fn pcm_f32(sample_rate: u32, channel_count: u32) -> Self {
        Self {
            bits_per_channel: 32,
            encoding: SampleEncoding::Float,
            byte_order: native_byte_order(),
            ..Self::pcm_s16(sample_rate, channel_count)
        }
    }

    /// Bytes occupied by one sample of one channel.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_channel / 8) as usize
    }

    /// Bytes occupied by one sample of every channel.
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channel_count as usize
    }

    /// Integral sample rate in Hz.
    pub fn rate_hz(&self) -> u32 {
        self.sample_rate.round() as u32
    }

    /// PCM bytes per second of audio.
    pub fn bytes_per_second(&self) -> f64 {
        self.sample_rate * self.bytes_per_frame() as f64
    }

    /// Check the descriptor is linear PCM the AAC encoder can accept.
    ///
    /// Returns a `Format` error describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.format_tag != FormatTag::LinearPcm {
            return Err(ConverterError::format(format!(
                "source format {:?} is not linear PCM",
                self.format_tag
            )));
        }

        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(ConverterError::format(format!(
                "unsupported channel count {} (1..={})",
                self.channel_count, MAX_CHANNELS
            )));
        }

        let width_ok = match self.encoding {
            SampleEncoding::SignedInteger => matches!(self.bits_per_channel, 8 | 16 | 24 | 32),
            SampleEncoding::Float => matches!(self.bits_per_channel, 32 | 64),
        };
        if !width_ok {
            return Err(ConverterError::format(format!(
                "unsupported sample width: {} bits {:?}",
                self.bits_per_channel, self.encoding
            )));
        }

        if !self.sample_rate.is_finite() || self.sample_rate.fract() != 0.0 {
            return Err(ConverterError::format(format!(
                "sample rate {} is not an integral rate",
                self.sample_rate
            )));
        }
        if !AAC_SAMPLE_RATES.contains(&self.rate_hz()) {
            return Err(ConverterError::format(format!(
                "sample rate {} Hz is not supported by AAC",
                self.sample_rate
            )));
        }

        Ok(())
    }
}

pub fn native_byte_order() -> ByteOrder {
    if cfg!(target_endian = "big") {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    }
}
