//! Destination container writer
//!
//! Muxes encoded AAC packets into a file with FFmpeg. The container is
//! picked from the destination extension (`.m4a` → ipod, `.aac` → adts, ...)
//! unless one is configured. A writer that is not finalised removes its file,
//! so a failed or cancelled job never leaves a half-written container behind.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use crate::backend::{DestinationWriter, EncodedPacket, EncodedStreamInfo};
use crate::error::{ConverterError, FfmpegError, Result};

/// Muxer used when the extension does not identify a container
pub const FALLBACK_CONTAINER: &str = "adts";

pub struct ContainerWriter {
    output: Option<ffmpeg::format::context::Output>,
    path: PathBuf,
    /// Timebase of incoming packet timestamps (1 / sample_rate)
    packet_tb: ffmpeg::Rational,
    /// Timebase chosen by the muxer for the output stream
    stream_tb: ffmpeg::Rational,
    packets: u64,
}

// SAFETY: the muxer context has no thread affinity and is owned by the
// job's worker for its whole life.
unsafe impl Send for ContainerWriter {}

impl ContainerWriter {
    /// Create `path`, add one AAC stream and write the container header.
    pub fn create(path: &Path, stream: &EncodedStreamInfo, container: Option<&str>) -> Result<Self> {
        let output = match container {
            Some(name) => ffmpeg::format::output_as(path, name),
            None => ffmpeg::format::output(path)
                .or_else(|_| ffmpeg::format::output_as(path, FALLBACK_CONTAINER)),
        }
        .map_err(|e| {
            ConverterError::file(FfmpegError::MuxerCreate(format!("{:?}: {}", path, e)))
        })?;

        let mut writer = Self {
            output: Some(output),
            path: path.to_path_buf(),
            packet_tb: ffmpeg::Rational::new(1, stream.sample_rate as i32),
            stream_tb: ffmpeg::Rational::new(1, stream.sample_rate as i32),
            packets: 0,
        };
        // On error `writer` drops here and removes the file
        writer.write_header(stream)?;

        tracing::debug!(path = ?writer.path, "destination container opened");
        Ok(writer)
    }

    fn write_header(&mut self, stream: &EncodedStreamInfo) -> Result<()> {
        let packet_tb = self.packet_tb;
        let output = self.output_mut()?;

        let params = crate::ffmpeg::helpers::aac_codec_parameters(
            stream.sample_rate,
            stream.channels,
            stream.bit_rate,
            stream.frame_size,
            &stream.extradata,
        );

        let mut out_stream = output
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| {
                ConverterError::file(FfmpegError::MuxerCreate(format!(
                    "Failed to add audio stream: {}",
                    e
                )))
            })?;
        out_stream.set_parameters(params);
        out_stream.set_time_base(ffmpeg::Rational::new(1, stream.sample_rate as i32));

        output.write_header().map_err(|e| {
            ConverterError::file(FfmpegError::WriteHeader(format!(
                "Failed to write header: {}",
                e
            )))
        })?;

        // The muxer may have replaced the requested timebase
        let stream_tb = output
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or(packet_tb);
        self.stream_tb = stream_tb;
        Ok(())
    }

    fn output_mut(&mut self) -> Result<&mut ffmpeg::format::context::Output> {
        self.output
            .as_mut()
            .ok_or_else(|| ConverterError::file("destination already closed"))
    }

    fn remove_partial(&mut self) {
        // Close the file before unlinking it
        if self.output.take().is_some() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!(path = ?self.path, "removed partial destination"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = ?self.path, "cannot remove partial destination: {}", e),
            }
        }
    }
}

impl DestinationWriter for ContainerWriter {
    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        let (packet_tb, stream_tb) = (self.packet_tb, self.stream_tb);
        let output = self.output_mut()?;

        let mut pkt = ffmpeg::Packet::copy(&packet.data);
        pkt.set_stream(0);
        pkt.set_pts(Some(packet.pts));
        pkt.set_dts(Some(packet.pts));
        pkt.set_duration(packet.duration);
        pkt.rescale_ts(packet_tb, stream_tb);

        pkt.write_interleaved(output).map_err(|e| {
            ConverterError::file(FfmpegError::WritePacket(format!(
                "Failed to write packet at pts {}: {}",
                packet.pts, e
            )))
        })?;
        self.packets += 1;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        let output = self.output_mut()?;
        output.write_trailer().map_err(|e| {
            ConverterError::file(FfmpegError::WriteTrailer(format!(
                "Failed to write trailer: {}",
                e
            )))
        })?;

        // Closing the context flushes and closes the file
        drop(self.output.take());
        tracing::debug!(path = ?self.path, packets = self.packets, "destination finalized");
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        self.remove_partial();
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        self.remove_partial();
    }
}
