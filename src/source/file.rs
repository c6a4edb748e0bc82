//! File-backed PCM source
//!
//! Opens any file FFmpeg can demux, decodes its best audio stream and hands
//! out interleaved little-endian 16-bit PCM at the stream's own rate.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::error::{ConverterError, FfmpegError, Result};
use crate::format::FormatDescriptor;
use crate::source::PcmSource;
use crate::transcode::decoder::AudioDecoder;
use crate::transcode::resampler::AudioResampler;

pub struct FileSource {
    input: ffmpeg::format::context::Input,
    decoder: AudioDecoder,
    resampler: Option<AudioResampler>,
    format: FormatDescriptor,
    total_bytes: Option<u64>,
    time_base: ffmpeg::Rational,
    /// Stream start in `time_base` units
    start_pts: i64,
    /// Frame a seek asked for; decoded audio before it is dropped
    seek_target: Option<u64>,
    /// Converted bytes not yet handed out
    pending: Vec<u8>,
    pending_pos: usize,
    /// Demuxer exhausted and EOF sent to the decoder
    input_done: bool,
    /// Decoder and resampler fully drained
    finished: bool,
}

// SAFETY: the FFmpeg contexts held here have no thread affinity. A
// `FileSource` is owned by exactly one thread at a time: it is opened on the
// caller's thread and then moved, whole, to the job's worker.
unsafe impl Send for FileSource {}

impl FileSource {
    /// Open `path` and derive the PCM format from its best audio stream.
    ///
    /// Fails with `Initialisation` when the file cannot be opened or carries
    /// no decodable audio, and with `Format` when the derived format cannot be
    /// encoded to AAC.
    pub fn open(path: &Path) -> Result<Self> {
        let input = ffmpeg::format::input(path).map_err(|e| {
            ConverterError::init(FfmpegError::OpenInput(format!("{:?}: {}", path, e)))
        })?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Audio)
            .ok_or_else(|| {
                ConverterError::init(FfmpegError::NoAudioStream(format!("{:?}", path)))
            })?;

        let decoder = AudioDecoder::open(&stream).map_err(ConverterError::init)?;
        let params = stream.parameters();
        let rate = match decoder.sample_rate() {
            0 => crate::ffmpeg::helpers::codec_params_sample_rate(&params),
            r => r,
        };
        let channels = match decoder.channels() {
            0 => crate::ffmpeg::helpers::codec_params_channels(&params),
            c => c,
        };
        if rate == 0 || channels == 0 {
            return Err(ConverterError::init(format!(
                "cannot determine audio format of {:?}",
                path
            )));
        }

        let format = FormatDescriptor::pcm_s16(rate, channels as u32);
        format.validate()?;

        let duration_secs = if stream.duration() > 0 {
            let tb = stream.time_base();
            stream.duration() as f64 * tb.numerator() as f64 / tb.denominator() as f64
        } else if input.duration() > 0 {
            input.duration() as f64 / ffmpeg::ffi::AV_TIME_BASE as f64
        } else {
            0.0
        };
        let total_bytes = if duration_secs > 0.0 {
            let frames = (duration_secs * rate as f64).round() as u64;
            Some(frames * format.bytes_per_frame() as u64)
        } else {
            None
        };

        let time_base = stream.time_base();
        let start_pts = match stream.start_time() {
            ffmpeg::ffi::AV_NOPTS_VALUE => 0,
            t => t,
        };

        tracing::debug!(
            path = ?path,
            stream_index = decoder.stream_index(),
            sample_rate = rate,
            channels,
            ?total_bytes,
            "file source opened"
        );

        Ok(Self {
            input,
            decoder,
            resampler: None,
            format,
            total_bytes,
            time_base,
            start_pts,
            seek_target: None,
            pending: Vec::new(),
            pending_pos: 0,
            input_done: false,
            finished: false,
        })
    }

    /// Decode until some converted PCM is pending or the stream is drained.
    fn refill(&mut self) -> Result<()> {
        self.pending.clear();
        self.pending_pos = 0;

        loop {
            if let Some(frame) = self.decoder.receive_frame()? {
                let skip = self.frames_before_target(&frame);
                if self.resampler.is_none() {
                    self.resampler = Some(AudioResampler::new(&frame)?);
                }
                if let Some(rsmp) = self.resampler.as_mut() {
                    if let Some(out) = rsmp.convert(&frame)? {
                        let skip_bytes = skip * self.format.bytes_per_frame();
                        append_packed(&mut self.pending, &out, skip_bytes);
                    }
                }
                if !self.pending.is_empty() {
                    return Ok(());
                }
                continue;
            }

            if self.input_done {
                if let Some(rsmp) = self.resampler.as_mut() {
                    if let Some(out) = rsmp.flush()? {
                        append_packed(&mut self.pending, &out, 0);
                    }
                }
                self.finished = true;
                return Ok(());
            }

            self.feed_decoder()?;
        }
    }

    /// Number of leading frames of `frame` that lie before the seek target.
    ///
    /// Demuxers land on a packet or keyframe at or before the requested
    /// time, so decoding restarts early and the surplus is cut here.
    fn frames_before_target(&mut self, frame: &ffmpeg::util::frame::Audio) -> usize {
        let Some(target) = self.seek_target else {
            return 0;
        };
        let Some(pts) = frame.timestamp().or_else(|| frame.pts()) else {
            self.seek_target = None;
            return 0;
        };

        let start = self.pts_to_frame(pts);
        let samples = frame.samples() as u64;
        if start >= target {
            self.seek_target = None;
            0
        } else if start + samples <= target {
            samples as usize
        } else {
            self.seek_target = None;
            (target - start) as usize
        }
    }

    fn pts_to_frame(&self, pts: i64) -> u64 {
        let rel = (pts - self.start_pts).max(0) as i128;
        let num = self.time_base.numerator() as i128;
        let den = (self.time_base.denominator() as i128).max(1);
        let rate = self.format.rate_hz() as i128;
        ((rel * num * rate + den / 2) / den) as u64
    }

    /// Send the next packet of our stream to the decoder, or EOF.
    fn feed_decoder(&mut self) -> Result<()> {
        let stream_index = self.decoder.stream_index();
        loop {
            let mut packet = ffmpeg::codec::packet::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != stream_index {
                        continue;
                    }
                    return self.decoder.send_packet(&packet);
                }
                Err(ffmpeg::Error::Eof) => {
                    self.input_done = true;
                    return self.decoder.send_eof();
                }
                Err(e) => {
                    return Err(ConverterError::file(FfmpegError::DecodePacket(format!(
                        "read error: {}",
                        e
                    ))))
                }
            }
        }
    }
}

impl PcmSource for FileSource {
    fn format(&self) -> FormatDescriptor {
        self.format
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.pending_pos < self.pending.len() {
                let n = (self.pending.len() - self.pending_pos).min(buf.len() - written);
                buf[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
                self.pending_pos += n;
                written += n;
                continue;
            }
            if self.finished {
                break;
            }
            self.refill()?;
        }
        Ok(written)
    }

    fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    fn seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        let frame = position / self.format.bytes_per_frame() as u64;
        let start_us = self.start_pts as f64 * self.time_base.numerator() as f64
            / self.time_base.denominator().max(1) as f64
            * ffmpeg::ffi::AV_TIME_BASE as f64;
        let ts = (frame as f64 / self.format.sample_rate * ffmpeg::ffi::AV_TIME_BASE as f64
            + start_us) as i64;

        self.input.seek(ts, ..ts).map_err(|e| {
            ConverterError::file(FfmpegError::Seek(format!("seek to {} failed: {}", ts, e)))
        })?;

        self.decoder.flush();
        self.resampler = None;
        self.pending.clear();
        self.pending_pos = 0;
        self.input_done = false;
        self.finished = false;
        self.seek_target = Some(frame);
        Ok(())
    }
}

/// Append the packed samples of `frame`, leaving out the first `skip` bytes.
fn append_packed(dst: &mut Vec<u8>, frame: &ffmpeg::util::frame::Audio, skip: usize) {
    let len = crate::ffmpeg::helpers::packed_frame_len(frame);
    let plane = crate::ffmpeg::helpers::audio_plane_data(frame, 0);
    let end = len.min(plane.len());
    if skip < end {
        dst.extend_from_slice(&plane[skip..end]);
    }
}
