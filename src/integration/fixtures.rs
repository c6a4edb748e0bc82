//! Test fixtures for integration tests
//!
//! A deterministic codec backend, scripted PCM sources and a recording
//! observer, so the encode loop can be driven without FFmpeg.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::backend::{
    AudioEncoder, CodecBackend, DestinationWriter, EncodedPacket, EncodedStreamInfo,
};
use crate::config::EncoderSettings;
use crate::converter::{AacConverter, ConversionJob, JobId};
use crate::error::{ConverterError, ErrorKind, Result};
use crate::format::FormatDescriptor;
use crate::notify::ConversionObserver;
use crate::source::{DataSource, PcmSource, PullSource};

/// Samples per channel in one mock packet
pub const MOCK_FRAME_SIZE: usize = 1024;

pub const WAIT: Duration = Duration::from_secs(10);

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Write a canonical 16-bit PCM WAV file.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> io::Result<()> {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let mut out = BufWriter::new(File::create(path)?);

    out.write_all(b"RIFF")?;
    out.write_all(&(36 + data_len).to_le_bytes())?;
    out.write_all(b"WAVE")?;
    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?;
    out.write_all(&1u16.to_le_bytes())?;
    out.write_all(&channels.to_le_bytes())?;
    out.write_all(&sample_rate.to_le_bytes())?;
    out.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&16u16.to_le_bytes())?;
    out.write_all(b"data")?;
    out.write_all(&data_len.to_le_bytes())?;
    for s in samples {
        out.write_all(&s.to_le_bytes())?;
    }
    out.flush()
}

/// Deterministic PCM bytes: `len` bytes of a repeating ramp.
pub fn ramp_pcm(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Progress(f64),
    Completed,
    Failed(ErrorKind),
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Progress(_))
    }
}

/// Observer that records every notification it gets
pub struct RecordingObserver {
    progress: bool,
    events: Mutex<Vec<Event>>,
    jobs: Mutex<Vec<JobId>>,
    changed: Condvar,
}

impl RecordingObserver {
    pub fn new(progress: bool) -> Arc<Self> {
        Arc::new(Self {
            progress,
            events: Mutex::new(Vec::new()),
            jobs: Mutex::new(Vec::new()),
            changed: Condvar::new(),
        })
    }

    fn record(&self, job: JobId, event: Event) {
        let mut events = self.events.lock();
        events.push(event);
        self.jobs.lock().push(job);
        self.changed.notify_all();
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn jobs(&self) -> Vec<JobId> {
        self.jobs.lock().clone()
    }

    pub fn progress_values(&self) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Progress(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    /// Block until a terminal notification arrives.
    pub fn wait_terminal(&self, timeout: Duration) -> Option<Event> {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        loop {
            if let Some(e) = events.iter().find(|e| e.is_terminal()) {
                return Some(e.clone());
            }
            if self.changed.wait_until(&mut events, deadline).timed_out() {
                return events.iter().find(|e| e.is_terminal()).cloned();
            }
        }
    }
}

impl ConversionObserver for RecordingObserver {
    fn on_completed(&self, job: JobId) {
        self.record(job, Event::Completed);
    }

    fn on_failed(&self, job: JobId, error: ConverterError) {
        self.record(job, Event::Failed(error.kind()));
    }

    fn wants_progress(&self) -> bool {
        self.progress
    }

    fn on_progress(&self, job: JobId, fraction: f64) {
        self.record(job, Event::Progress(fraction));
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Blocks a source until the test lets it continue
#[derive(Default)]
pub struct Gate {
    state: Mutex<(bool, bool)>, // (reached, open)
    changed: Condvar,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn pass(&self) {
        let mut state = self.state.lock();
        state.0 = true;
        self.changed.notify_all();
        while !state.1 {
            self.changed.wait(&mut state);
        }
    }

    /// Wait until the source is blocked at the gate.
    pub fn wait_reached(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.0 {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.0;
            }
        }
        true
    }

    pub fn open(&self) {
        self.state.lock().1 = true;
        self.changed.notify_all();
    }
}

/// Pull source that returns pre-scripted chunks in order
pub struct ScriptedSource {
    chunks: Vec<Vec<u8>>,
    next: usize,
    /// Offset into `chunks[next]` when the buffer was smaller than the chunk
    offset: usize,
    total: Option<u64>,
    gate: Option<(usize, Arc<Gate>)>,
    fail_at: Option<usize>,
}

impl ScriptedSource {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            next: 0,
            offset: 0,
            total: None,
            gate: None,
            fail_at: None,
        }
    }

    /// `data` split into chunks of `chunk` bytes.
    pub fn split(data: &[u8], chunk: usize) -> Self {
        Self::new(data.chunks(chunk).map(|c| c.to_vec()).collect())
    }

    pub fn with_total(mut self) -> Self {
        self.total = Some(self.chunks.iter().map(|c| c.len() as u64).sum());
        self
    }

    /// Block before handing out chunk `index` until `gate` is opened.
    pub fn gated_at(mut self, index: usize, gate: Arc<Gate>) -> Self {
        self.gate = Some((index, gate));
        self
    }

    /// Fail with an I/O error instead of returning chunk `index`.
    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }
}

impl DataSource for ScriptedSource {
    fn next_bytes(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        if self.offset == 0 {
            if let Some((index, gate)) = &self.gate {
                if *index == self.next {
                    gate.pass();
                }
            }
            if self.fail_at == Some(self.next) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted read failure"));
            }
        }
        let Some(chunk) = self.chunks.get(self.next) else {
            return Ok(0);
        };
        let n = (chunk.len() - self.offset).min(buffer.len());
        buffer[..n].copy_from_slice(&chunk[self.offset..self.offset + n]);
        self.offset += n;
        if self.offset == chunk.len() {
            self.next += 1;
            self.offset = 0;
        }
        Ok(n)
    }

    fn total_bytes(&self) -> Option<u64> {
        self.total
    }
}

/// Seekable in-memory PCM
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
    seeks: Arc<Mutex<Vec<u64>>>,
    reads: usize,
    gate: Option<(usize, Arc<Gate>)>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            seeks: Arc::new(Mutex::new(Vec::new())),
            reads: 0,
            gate: None,
        }
    }

    /// Block in read number `index` (from 0) until `gate` is opened.
    pub fn gated_at(mut self, index: usize, gate: Arc<Gate>) -> Self {
        self.gate = Some((index, gate));
        self
    }

    /// Positions the engine seeked to.
    pub fn seek_log(&self) -> Arc<Mutex<Vec<u64>>> {
        self.seeks.clone()
    }
}

impl DataSource for MemorySource {
    fn next_bytes(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        if let Some((index, gate)) = &self.gate {
            if *index == self.reads {
                gate.pass();
            }
        }
        self.reads += 1;
        let n = (self.data.len() - self.pos).min(buffer.len());
        buffer[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seekable(&self) -> bool {
        true
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        if position > self.data.len() as u64 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek past end"));
        }
        self.pos = position as usize;
        self.seeks.lock().push(position);
        Ok(())
    }

    fn total_bytes(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Counters shared between a [`MockBackend`] and the test
#[derive(Debug, Default)]
pub struct MockStats {
    pub suspends: AtomicUsize,
    pub restores: AtomicUsize,
    pub writers: AtomicUsize,
}

impl MockStats {
    pub fn suspends(&self) -> usize {
        self.suspends.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }

    pub fn writers(&self) -> usize {
        self.writers.load(Ordering::SeqCst)
    }
}

/// Backend whose "AAC" packets are the raw PCM of each frame
///
/// Files handed to `open_file` are read as raw 44.1 kHz stereo 16-bit PCM.
#[derive(Default)]
pub struct MockBackend {
    unavailable: bool,
    fail_restore: bool,
    fail_write_after: Option<usize>,
    pub stats: Arc<MockStats>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn failing_restore() -> Self {
        Self {
            fail_restore: true,
            ..Self::default()
        }
    }

    pub fn failing_write_after(packets: usize) -> Self {
        Self {
            fail_write_after: Some(packets),
            ..Self::default()
        }
    }
}

impl CodecBackend for MockBackend {
    fn encoder_available(&self) -> bool {
        !self.unavailable
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn PcmSource>> {
        let data = std::fs::read(path).map_err(ConverterError::init)?;
        Ok(Box::new(PullSource::new(
            Box::new(MemorySource::new(data)),
            FormatDescriptor::pcm_s16(44100, 2),
        )))
    }

    fn open_encoder(
        &self,
        format: &FormatDescriptor,
        _settings: &EncoderSettings,
    ) -> Result<Box<dyn AudioEncoder>> {
        format.validate()?;
        Ok(Box::new(MockEncoder {
            frame_bytes: MOCK_FRAME_SIZE * format.bytes_per_frame(),
            pending: Vec::new(),
            pts: 0,
            info: EncodedStreamInfo {
                sample_rate: format.rate_hz(),
                channels: format.channel_count as u16,
                bit_rate: 128_000,
                frame_size: MOCK_FRAME_SIZE as u32,
                extradata: Bytes::new(),
            },
            fail_restore: self.fail_restore,
            stats: self.stats.clone(),
        }))
    }

    fn create_writer(
        &self,
        destination: &Path,
        _stream: &EncodedStreamInfo,
        _settings: &EncoderSettings,
    ) -> Result<Box<dyn DestinationWriter>> {
        let file = File::create(destination).map_err(ConverterError::file)?;
        self.stats.writers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockWriter {
            out: Some(BufWriter::new(file)),
            path: destination.to_path_buf(),
            written: 0,
            fail_after: self.fail_write_after,
        }))
    }
}

struct MockEncoder {
    frame_bytes: usize,
    pending: Vec<u8>,
    pts: i64,
    info: EncodedStreamInfo,
    fail_restore: bool,
    stats: Arc<MockStats>,
}

impl MockEncoder {
    fn packet(&mut self, data: Vec<u8>) -> EncodedPacket {
        let packet = EncodedPacket {
            data: Bytes::from(data),
            pts: self.pts,
            duration: MOCK_FRAME_SIZE as i64,
        };
        self.pts += MOCK_FRAME_SIZE as i64;
        packet
    }
}

impl AudioEncoder for MockEncoder {
    fn encode(&mut self, pcm: &[u8]) -> Result<Vec<EncodedPacket>> {
        self.pending.extend_from_slice(pcm);
        let mut packets = Vec::new();
        while self.pending.len() >= self.frame_bytes {
            let frame: Vec<u8> = self.pending.drain(..self.frame_bytes).collect();
            packets.push(self.packet(frame));
        }
        Ok(packets)
    }

    fn finish(&mut self) -> Result<Vec<EncodedPacket>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let rest = std::mem::take(&mut self.pending);
        Ok(vec![self.packet(rest)])
    }

    fn suspend(&mut self) -> Result<()> {
        self.stats.suspends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        self.stats.restores.fetch_add(1, Ordering::SeqCst);
        if self.fail_restore {
            return Err(ConverterError::init("codec session could not be re-established"));
        }
        Ok(())
    }

    fn stream_info(&self) -> EncodedStreamInfo {
        self.info.clone()
    }
}

struct MockWriter {
    out: Option<BufWriter<File>>,
    path: PathBuf,
    written: usize,
    fail_after: Option<usize>,
}

impl DestinationWriter for MockWriter {
    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        if self.fail_after == Some(self.written) {
            return Err(ConverterError::file("scripted write failure"));
        }
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| ConverterError::file("writer closed"))?;
        out.write_all(&packet.data).map_err(ConverterError::file)?;
        self.written += 1;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush().map_err(ConverterError::file)?;
        }
        Ok(())
    }

    fn abort(mut self: Box<Self>) {
        self.out.take();
        let _ = std::fs::remove_file(&self.path);
    }
}

// ---------------------------------------------------------------------------
// Job helpers
// ---------------------------------------------------------------------------

/// Settings with small chunks so jobs take several iterations.
pub fn small_chunks() -> EncoderSettings {
    EncoderSettings {
        chunk_size: 4096,
        progress_step: 0.0,
        ..EncoderSettings::default()
    }
}

/// Build a pull job over `source` writing to `destination` with the mock backend.
pub fn mock_converter(
    observer: Arc<RecordingObserver>,
    source: impl DataSource + 'static,
    destination: &Path,
    backend: MockBackend,
) -> AacConverter {
    AacConverter::build(
        ConversionJob::pull(
            Box::new(source),
            FormatDescriptor::pcm_s16(44100, 2),
            destination,
        ),
        observer,
        small_chunks(),
        Arc::new(backend),
    )
    .expect("mock converter")
}

/// A converter that is never started; its destination is not created.
pub fn idle_converter(observer: Arc<RecordingObserver>) -> AacConverter {
    let destination = std::env::temp_dir().join(format!("idle-{}.aac", uuid::Uuid::new_v4()));
    mock_converter(
        observer,
        ScriptedSource::new(vec![vec![0u8; 16]]),
        &destination,
        MockBackend::new(),
    )
}
