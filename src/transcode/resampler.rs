//! Audio resampler for file sources
//!
//! Converts decoded frames of any sample format and layout into packed
//! signed 16-bit PCM at the source rate, the layout file sources hand out.

use crate::error::{ConverterError, FfmpegError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::format::sample::Sample;

use super::layout_for_channels;

/// Sample format file sources produce
pub const OUTPUT_SAMPLE_FORMAT: Sample = Sample::I16(ffmpeg::util::format::sample::Type::Packed);

/// Audio resampler wrapping FFmpeg's `SwrContext`
pub struct AudioResampler {
    context: resampling::Context,
}

impl AudioResampler {
    /// Create a resampler for frames shaped like `src_frame`.
    pub fn new(src_frame: &ffmpeg::util::frame::Audio) -> Result<Self> {
        let channels = src_frame.channels();
        let src_layout = if src_frame.channel_layout().bits() == 0 {
            // No channel layout set; fall back based on channel count
            layout_for_channels(channels)
        } else {
            src_frame.channel_layout()
        };

        let context = resampling::Context::get(
            src_frame.format(),
            src_layout,
            src_frame.rate(),
            OUTPUT_SAMPLE_FORMAT,
            layout_for_channels(channels),
            src_frame.rate(),
        )
        .map_err(|e| {
            ConverterError::file(FfmpegError::ResamplerCreate(format!(
                "Failed to create resampling context: {}",
                e
            )))
        })?;

        Ok(Self { context })
    }

    /// Convert one decoded frame, returning `None` when the resampler
    /// buffered everything.
    pub fn convert(
        &mut self,
        frame: &ffmpeg::util::frame::Audio,
    ) -> Result<Option<ffmpeg::util::frame::Audio>> {
        // Output frame must be empty so swr allocates it from the context config
        let mut out = ffmpeg::util::frame::Audio::empty();

        self.context.run(frame, &mut out).map_err(|e| {
            ConverterError::file(FfmpegError::Resample(format!("Resampling error: {}", e)))
        })?;

        if out.samples() == 0 {
            return Ok(None);
        }
        Ok(Some(out))
    }

    /// Flush any samples still buffered in the resampler.
    ///
    /// With matching rates nothing is buffered and swr reports an error on
    /// flush; that is not a failure.
    pub fn flush(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut out = ffmpeg::util::frame::Audio::empty();
        if let Err(e) = self.context.flush(&mut out) {
            tracing::debug!("Resampler flush returned non-fatal error: {}", e);
            return Ok(None);
        }

        if out.samples() == 0 {
            return Ok(None);
        }
        Ok(Some(out))
    }
}
