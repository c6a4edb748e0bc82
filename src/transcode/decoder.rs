//! Audio decoder for file sources
//!
//! Wraps an FFmpeg `AVCodecContext` to decode compressed or PCM audio
//! packets (WAV, AIFF, MP3, FLAC, ...) into raw `AVFrame`s.

use crate::error::{FfmpegError, Result};
use ffmpeg_next as ffmpeg;

/// Audio decoder backed by a FFmpeg codec context
pub struct AudioDecoder {
    /// The FFmpeg decoder context
    decoder: ffmpeg::decoder::Audio,
    /// Stream index in the source file
    stream_index: usize,
}

impl AudioDecoder {
    /// Open a decoder for the given stream.
    ///
    /// Uses the stream's own codec parameters to initialise the context so no
    /// external configuration is needed.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> std::result::Result<Self, FfmpegError> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                FfmpegError::DecoderCreate(format!(
                    "Failed to create codec context for stream {}: {}",
                    stream_index, e
                ))
            })?;

        let decoder = context.decoder().audio().map_err(|e| {
            FfmpegError::DecoderCreate(format!(
                "Failed to open audio decoder for stream {}: {}",
                stream_index, e
            ))
        })?;

        Ok(Self {
            decoder,
            stream_index,
        })
    }

    /// Send a compressed packet to the decoder.
    ///
    /// `AVERROR_INVALIDDATA` is treated as non-fatal: the packet is skipped
    /// with a debug log, as decoders report it for damaged frames they can
    /// resynchronise after.
    pub fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    "send_packet: skipping invalid packet"
                );
                Ok(())
            }
            Err(e) => Err(crate::error::ConverterError::file(FfmpegError::DecodePacket(
                format!("send_packet error on stream {}: {}", self.stream_index, e),
            ))),
        }
    }

    /// Send EOF to flush the decoder's internal buffers.
    ///
    /// EAGAIN and EOF responses are ignored — the decoder has nothing
    /// buffered or is already finished.
    pub fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(crate::error::ConverterError::file(FfmpegError::DecodePacket(
                format!("send_eof error on stream {}: {}", self.stream_index, e),
            ))),
        }
    }

    /// Receive one decoded PCM frame, or `None` if the decoder needs more
    /// input.
    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(crate::error::ConverterError::file(FfmpegError::DecodePacket(
                format!("receive_frame error on stream {}: {}", self.stream_index, e),
            ))),
        }
    }

    /// Drop buffered state after the input was repositioned.
    pub fn flush(&mut self) {
        self.decoder.flush();
    }

    /// The source stream index.
    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Sample rate of decoded frames.
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    /// Channel count of decoded frames.
    pub fn channels(&self) -> u16 {
        self.decoder.channels()
    }
}
