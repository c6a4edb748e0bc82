//! Codec backend seam
//!
//! The encode loop only talks to these traits. [`FfmpegBackend`] is the
//! production implementation; tests substitute a deterministic one.

use std::path::Path;

use bytes::Bytes;

use crate::config::EncoderSettings;
use crate::error::Result;
use crate::format::FormatDescriptor;
use crate::source::PcmSource;

/// One encoded AAC access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: Bytes,
    /// Presentation timestamp in samples (timebase 1 / sample_rate)
    pub pts: i64,
    /// Duration in samples
    pub duration: i64,
}

/// Parameters of the encoded stream, needed to set up the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedStreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u64,
    /// Samples per channel in one encoded packet
    pub frame_size: u32,
    /// AudioSpecificConfig
    pub extradata: Bytes,
}

/// A PCM → AAC encoding session
pub trait AudioEncoder: Send {
    /// Push raw PCM bytes in the job's format. Returns any packets that became ready.
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<EncodedPacket>>;

    /// Encode any buffered samples and drain the codec.
    fn finish(&mut self) -> Result<Vec<EncodedPacket>>;

    /// Drop an incomplete PCM frame carried over from earlier input.
    fn discard_partial(&mut self) {}

    /// Release the hardware session while keeping buffered state.
    fn suspend(&mut self) -> Result<()> {
        Ok(())
    }

    /// Re-establish the session after [`AudioEncoder::suspend`].
    ///
    /// Failing here means buffered state is gone and the job cannot continue.
    fn restore(&mut self) -> Result<()> {
        Ok(())
    }

    fn stream_info(&self) -> EncodedStreamInfo;
}

/// Receives encoded packets and produces the destination container
pub trait DestinationWriter: Send {
    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()>;

    /// Complete the container. The file is valid once this returns `Ok`.
    fn finalize(self: Box<Self>) -> Result<()>;

    /// Stop writing and remove the partial output.
    fn abort(self: Box<Self>);
}

/// Factory for the codec-specific collaborators of a job
pub trait CodecBackend: Send + Sync {
    /// Whether AAC encoding is possible on this host.
    fn encoder_available(&self) -> bool;

    /// Open a file and decode it to PCM, deriving its format from the headers.
    fn open_file(&self, path: &Path) -> Result<Box<dyn PcmSource>>;

    fn open_encoder(
        &self,
        format: &FormatDescriptor,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn AudioEncoder>>;

    fn create_writer(
        &self,
        destination: &Path,
        stream: &EncodedStreamInfo,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn DestinationWriter>>;
}

/// Backend built on the FFmpeg libraries
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl CodecBackend for FfmpegBackend {
    fn encoder_available(&self) -> bool {
        crate::ffmpeg::ensure_init().is_ok() && crate::transcode::encoder::is_aac_encoder_available()
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn PcmSource>> {
        crate::ffmpeg::ensure_init().map_err(crate::error::ConverterError::init)?;
        let source = crate::source::file::FileSource::open(path)?;
        Ok(Box::new(source))
    }

    fn open_encoder(
        &self,
        format: &FormatDescriptor,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn AudioEncoder>> {
        crate::ffmpeg::ensure_init().map_err(crate::error::ConverterError::init)?;
        let encoder = crate::transcode::encoder::AacEncoder::open(format, settings)?;
        Ok(Box::new(encoder))
    }

    fn create_writer(
        &self,
        destination: &Path,
        stream: &EncodedStreamInfo,
        settings: &EncoderSettings,
    ) -> Result<Box<dyn DestinationWriter>> {
        let writer = crate::transcode::writer::ContainerWriter::create(
            destination,
            stream,
            settings.container.as_deref(),
        )?;
        Ok(Box::new(writer))
    }
}
