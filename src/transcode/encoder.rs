//! AAC encoder
//!
//! Wraps an FFmpeg `AVCodecContext` configured for AAC-LC. Raw PCM bytes in
//! the job's format are converted to planar float, regrouped into frames of
//! the codec's frame size and encoded.

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::util::format::sample::Sample;

use crate::backend::{AudioEncoder, EncodedPacket, EncodedStreamInfo};
use crate::config::EncoderSettings;
use crate::error::{ConverterError, FfmpegError, Result};
use crate::format::FormatDescriptor;
use crate::pcm::PcmConverter;

use super::layout_for_channels;

/// Sample format the AAC encoder consumes
pub const ENCODER_SAMPLE_FMT: Sample = Sample::F32(ffmpeg::util::format::sample::Type::Planar);
/// AAC encoder frame size (number of samples per channel per frame)
pub const AAC_FRAME_SIZE: usize = 1024;

/// AAC encoder backed by a real FFmpeg codec context
pub struct AacEncoder {
    encoder: ffmpeg::encoder::Audio,
    pcm: PcmConverter,
    /// Converted samples waiting for a full frame, one `Vec` per channel
    planes: Vec<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
    bit_rate: u64,
    frame_size: usize,
    extradata: Bytes,
    /// PTS of the next frame sent to the codec
    pts: i64,
    suspended: bool,
    finished: bool,
}

// SAFETY: the codec context has no thread affinity; the encoder is created on
// the worker thread and never shared.
unsafe impl Send for AacEncoder {}

impl AacEncoder {
    /// Open an AAC encoder for PCM in `format`.
    pub fn open(format: &FormatDescriptor, settings: &EncoderSettings) -> Result<Self> {
        format.validate()?;

        let codec = codec::encoder::find(codec::Id::AAC).ok_or_else(|| {
            ConverterError::init(FfmpegError::EncoderNotFound(
                "AAC encoder not found in this FFmpeg build".into(),
            ))
        })?;

        let sample_rate = format.rate_hz();
        let channels = format.channel_count as u16;
        let bit_rate = settings.bitrate_for(format.channel_count);

        // Build context and configure the audio encoder BEFORE opening
        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(ffmpeg::Rational::new(1, sample_rate as i32));

        let mut audio_enc = context.encoder().audio().map_err(|e| {
            ConverterError::init(FfmpegError::EncoderCreate(format!(
                "Cannot get audio encoder handle: {}",
                e
            )))
        })?;

        audio_enc.set_rate(sample_rate as i32);
        audio_enc.set_format(ENCODER_SAMPLE_FMT);
        audio_enc.set_channel_layout(layout_for_channels(channels));
        audio_enc.set_bit_rate(bit_rate as usize);

        let encoder = audio_enc.open_as(codec).map_err(|e| {
            ConverterError::format(FfmpegError::EncoderCreate(format!(
                "Failed to open AAC encoder at {} Hz, {} channels: {}",
                sample_rate, channels, e
            )))
        })?;

        let frame_size = match encoder.frame_size() as usize {
            0 => AAC_FRAME_SIZE,
            n => n,
        };
        let extradata = Bytes::from(crate::ffmpeg::helpers::encoder_extradata(&encoder));

        tracing::debug!(
            sample_rate,
            channels,
            bit_rate,
            frame_size,
            "AAC encoder opened"
        );

        Ok(Self {
            encoder,
            pcm: PcmConverter::new(*format),
            planes: vec![Vec::with_capacity(frame_size * 2); channels as usize],
            channels,
            sample_rate,
            bit_rate,
            frame_size,
            extradata,
            pts: 0,
            suspended: false,
            finished: false,
        })
    }

    /// Send the first `n` buffered samples of every channel as one frame.
    fn send_samples(&mut self, n: usize) -> Result<()> {
        let mut frame =
            ffmpeg::util::frame::Audio::new(ENCODER_SAMPLE_FMT, n, layout_for_channels(self.channels));
        frame.set_rate(self.sample_rate);

        for (ch, plane) in self.planes.iter_mut().enumerate() {
            let data = crate::ffmpeg::helpers::audio_plane_data_mut(&mut frame, ch);
            let floats = crate::ffmpeg::helpers::fltp_plane_as_f32_mut(data, n).ok_or_else(|| {
                ConverterError::format(FfmpegError::EncodeFrame(format!(
                    "FLTP plane {} cannot hold {} samples",
                    ch, n
                )))
            })?;
            floats.copy_from_slice(&plane[..n]);
            plane.drain(..n);
        }

        frame.set_pts(Some(self.pts));
        self.pts += n as i64;

        self.encoder.send_frame(&frame).map_err(|e| {
            ConverterError::format(FfmpegError::EncodeFrame(format!(
                "AAC encoder send_frame error: {}",
                e
            )))
        })
    }

    /// Collect every packet the codec has ready.
    fn drain(&mut self, out: &mut Vec<EncodedPacket>) -> Result<()> {
        loop {
            let mut packet = ffmpeg::codec::packet::Packet::empty();
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    let pts = packet.pts().unwrap_or_else(|| {
                        out.last()
                            .map(|p: &EncodedPacket| p.pts + p.duration)
                            .unwrap_or(0)
                    });
                    let duration = match packet.duration() {
                        0 => self.frame_size as i64,
                        d => d,
                    };
                    out.push(EncodedPacket {
                        data: Bytes::copy_from_slice(packet.data().unwrap_or(&[])),
                        pts,
                        duration,
                    });
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    return Ok(())
                }
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(e) => {
                    return Err(ConverterError::format(FfmpegError::EncodeFrame(format!(
                        "AAC encoder receive_packet error: {}",
                        e
                    ))))
                }
            }
        }
    }
}

impl AudioEncoder for AacEncoder {
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<EncodedPacket>> {
        if self.finished {
            return Err(ConverterError::format("encoder already finished"));
        }

        self.pcm.convert(pcm, &mut self.planes)?;

        let mut packets = Vec::new();
        while self.planes[0].len() >= self.frame_size {
            self.send_samples(self.frame_size)?;
            self.drain(&mut packets)?;
        }
        Ok(packets)
    }

    fn finish(&mut self) -> Result<Vec<EncodedPacket>> {
        if self.finished {
            return Ok(Vec::new());
        }
        self.finished = true;

        if self.pcm.pending_bytes() > 0 {
            tracing::warn!(
                bytes = self.pcm.pending_bytes(),
                "dropping incomplete trailing PCM frame"
            );
        }

        let mut packets = Vec::new();
        let remaining = self.planes[0].len();
        if remaining > 0 {
            self.send_samples(remaining)?;
            self.drain(&mut packets)?;
        }

        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => {}
            Err(e) => {
                return Err(ConverterError::format(FfmpegError::EncodeFrame(format!(
                    "AAC encoder send_eof error: {}",
                    e
                ))))
            }
        }
        self.drain(&mut packets)?;
        Ok(packets)
    }

    fn discard_partial(&mut self) {
        self.pcm.reset();
    }

    fn suspend(&mut self) -> Result<()> {
        // The software codec keeps its state in memory; nothing to release
        self.suspended = true;
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        self.suspended = false;
        Ok(())
    }

    fn stream_info(&self) -> EncodedStreamInfo {
        EncodedStreamInfo {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bit_rate: self.bit_rate,
            frame_size: self.frame_size as u32,
            extradata: self.extradata.clone(),
        }
    }
}

/// Check whether the FFmpeg build includes an AAC encoder.
pub fn is_aac_encoder_available() -> bool {
    codec::encoder::find(codec::Id::AAC).is_some()
}
