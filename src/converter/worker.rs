//! The encode loop
//!
//! Runs on the job's own thread: pull a chunk of PCM, encode it, write the
//! packets, report progress. Control requests (cancel, interrupt, seek) are
//! picked up between iterations.

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{AudioEncoder, CodecBackend, DestinationWriter, EncodedPacket};
use crate::config::EncoderSettings;
use crate::error::{ConverterError, ErrorKind, Result};
use crate::notify::Notifier;
use crate::source::PcmSource;

use super::progress::ProgressTracker;
use super::state::{ConversionState, JobControl, Step, Wake};
use super::JobId;

/// How the loop ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Completed,
    Cancelled,
}

pub(crate) struct Worker {
    id: JobId,
    source: Box<dyn PcmSource>,
    destination: PathBuf,
    settings: EncoderSettings,
    backend: Arc<dyn CodecBackend>,
    control: Arc<JobControl>,
    notifier: Notifier,
    writer: Option<Box<dyn DestinationWriter>>,
    pending_seek: Option<u64>,
    packets_written: u64,
}

impl Worker {
    pub fn new(
        id: JobId,
        source: Box<dyn PcmSource>,
        destination: PathBuf,
        settings: EncoderSettings,
        backend: Arc<dyn CodecBackend>,
        control: Arc<JobControl>,
        notifier: Notifier,
    ) -> Self {
        Self {
            id,
            source,
            destination,
            settings,
            backend,
            control,
            notifier,
            writer: None,
            pending_seek: None,
            packets_written: 0,
        }
    }

    pub fn run(mut self) {
        tracing::info!(job = %self.id, destination = ?self.destination, "conversion started");

        match self.convert() {
            Ok(Exit::Completed) => {
                if self.control.finish(ConversionState::Completed) {
                    tracing::info!(job = %self.id, packets = self.packets_written, "conversion completed");
                    self.notifier.completed();
                } else {
                    // Cancelled after the container was finalised
                    self.remove_destination();
                    tracing::info!(job = %self.id, "conversion cancelled");
                }
            }
            Ok(Exit::Cancelled) => {
                self.abort_writer();
                tracing::info!(job = %self.id, "conversion cancelled");
            }
            Err(e) => {
                self.abort_writer();
                if self.control.finish(ConversionState::Failed(e.kind())) {
                    tracing::error!(job = %self.id, "conversion failed: {}", e);
                    self.notifier.failed(e);
                } else {
                    tracing::debug!(job = %self.id, "error after cancel discarded: {}", e);
                }
            }
        }
    }

    fn convert(&mut self) -> Result<Exit> {
        let format = self.source.format();

        // Nothing touches the destination before the first control check
        if self.checkpoint(None)? == Some(Exit::Cancelled) {
            return Ok(Exit::Cancelled);
        }

        format.validate()?;
        let mut encoder = self.backend.open_encoder(&format, &self.settings)?;
        let stream = encoder.stream_info();
        self.writer = Some(
            self.backend
                .create_writer(&self.destination, &stream, &self.settings)?,
        );

        let bytes_per_frame = format.bytes_per_frame();
        let mut buffer = vec![0u8; self.settings.chunk_bytes(bytes_per_frame)];
        let mut progress = ProgressTracker::new(
            self.source.total_bytes(),
            format.bytes_per_second() * self.settings.unbounded_estimate_secs,
            self.settings.progress_step,
        );

        tracing::debug!(
            job = %self.id,
            chunk = buffer.len(),
            total = ?self.source.total_bytes(),
            "encode loop running"
        );

        loop {
            if let Some(exit) = self.checkpoint(Some(encoder.as_mut()))? {
                return Ok(exit);
            }
            if let Some(position) = self.take_seek() {
                let aligned = position - position % bytes_per_frame as u64;
                self.source.seek(aligned)?;
                encoder.discard_partial();
                progress.seek_to(aligned);
                tracing::debug!(job = %self.id, position = aligned, "source repositioned");
            }

            let n = self.source.read(&mut buffer)?;
            if n == 0 {
                break;
            }

            let packets = encoder.encode(&buffer[..n])?;
            self.write_packets(&packets)?;

            if self.notifier.wants_progress() {
                if let Some(fraction) = progress.advance(n) {
                    self.notifier.progress(fraction);
                }
            }
        }

        let packets = encoder.finish()?;
        self.write_packets(&packets)?;

        if self.control.is_cancelled() {
            return Ok(Exit::Cancelled);
        }
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }

        if let Some(fraction) = progress.complete() {
            self.notifier.progress(fraction);
        }
        Ok(Exit::Completed)
    }

    /// Observe control requests. Parks while the job is interrupted.
    fn checkpoint(&mut self, mut encoder: Option<&mut dyn AudioEncoder>) -> Result<Option<Exit>> {
        loop {
            match self.control.step() {
                Step::Run { seek } => {
                    if seek.is_some() {
                        self.pending_seek = seek;
                    }
                    return Ok(None);
                }
                Step::Cancelled => return Ok(Some(Exit::Cancelled)),
                Step::SessionLost => return Err(session_lost()),
                Step::Interrupted => {
                    if let Some(enc) = encoder.as_deref_mut() {
                        enc.suspend().map_err(unrecoverable)?;
                    }
                    tracing::info!(job = %self.id, "conversion interrupted");

                    match self.control.wait_for_resume() {
                        Wake::Cancelled => return Ok(Some(Exit::Cancelled)),
                        Wake::SessionLost => return Err(session_lost()),
                        Wake::Resumed => {
                            if let Some(enc) = encoder.as_deref_mut() {
                                enc.restore().map_err(unrecoverable)?;
                            }
                            tracing::info!(job = %self.id, "conversion resumed");
                        }
                    }
                }
            }
        }
    }

    fn take_seek(&mut self) -> Option<u64> {
        self.pending_seek.take()
    }

    fn write_packets(&mut self, packets: &[EncodedPacket]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ConverterError::file("destination is not open"))?;
        for packet in packets {
            writer.write_packet(packet)?;
        }
        self.packets_written += packets.len() as u64;
        Ok(())
    }

    fn abort_writer(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }

    fn remove_destination(&self) {
        match std::fs::remove_file(&self.destination) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                job = %self.id,
                "cannot remove destination of cancelled job: {}",
                e
            ),
        }
    }
}

fn session_lost() -> ConverterError {
    ConverterError::interruption("audio session lost while interrupted")
}

fn unrecoverable(e: ConverterError) -> ConverterError {
    match e.kind() {
        ErrorKind::UnrecoverableInterruption => e,
        _ => ConverterError::interruption(format!("encoder session not restored: {}", e)),
    }
}
