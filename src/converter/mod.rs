//! Conversion jobs
//!
//! An [`AacConverter`] owns one single-use PCM → AAC job. `start` hands the
//! job to a dedicated worker thread and returns immediately; the outcome is
//! reported to the job's [`ConversionObserver`].
//!
//! ```no_run
//! use aac_converter::{AacConverter, ChannelObserver};
//!
//! # fn main() -> aac_converter::Result<()> {
//! let (observer, _events) = ChannelObserver::new(true);
//! let converter = AacConverter::new(observer, "in.wav", "out.m4a")?;
//! converter.start()?;
//! # Ok(())
//! # }
//! ```

pub mod progress;
pub mod state;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::backend::{CodecBackend, FfmpegBackend};
use crate::config::EncoderSettings;
use crate::error::{ConverterError, ErrorKind, Result};
use crate::format::FormatDescriptor;
use crate::notify::{short_id, ConversionObserver, Notifier};
use crate::source::{DataSource, PcmSource, PullSource};

pub use state::ConversionState;
use state::JobControl;
use worker::Worker;

/// Identifies a conversion job in notifications
pub type JobId = Uuid;

/// Where a job reads its PCM from
pub enum JobSource {
    /// An audio file FFmpeg can decode; its format is derived from the file
    File(PathBuf),
    /// Application-pulled PCM in an explicitly described format
    Pull {
        data: Box<dyn DataSource>,
        format: FormatDescriptor,
    },
}

/// A source/destination pair to convert
pub struct ConversionJob {
    pub source: JobSource,
    pub destination: PathBuf,
}

impl ConversionJob {
    pub fn file(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: JobSource::File(source.into()),
            destination: destination.into(),
        }
    }

    pub fn pull(
        data: Box<dyn DataSource>,
        format: FormatDescriptor,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: JobSource::Pull { data, format },
            destination: destination.into(),
        }
    }
}

pub struct AacConverter {
    id: JobId,
    source_path: Option<PathBuf>,
    destination: PathBuf,
    format: FormatDescriptor,
    seekable: bool,
    settings: EncoderSettings,
    backend: Arc<dyn CodecBackend>,
    observer: Arc<dyn ConversionObserver>,
    control: Arc<JobControl>,
    /// Taken by `start`
    source: Mutex<Option<Box<dyn PcmSource>>>,
}

impl AacConverter {
    /// Convert the audio file at `source` to AAC at `destination`.
    ///
    /// Fails with `Initialisation` when the file cannot be opened, holds no
    /// audio, the destination is not writable or no AAC encoder exists, and
    /// with `Format` when the file's audio cannot be encoded as AAC.
    pub fn new(
        observer: Arc<dyn ConversionObserver>,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::build(
            ConversionJob::file(source.as_ref(), destination.as_ref()),
            observer,
            EncoderSettings::default(),
            Arc::new(FfmpegBackend),
        )
    }

    /// Convert PCM pulled from `data`, which must produce bytes in `format`.
    ///
    /// Only an unwritable destination or a missing AAC encoder fail here; a
    /// format the encoder rejects is reported through the observer once the
    /// job runs.
    pub fn with_data_source(
        observer: Arc<dyn ConversionObserver>,
        data: Box<dyn DataSource>,
        format: FormatDescriptor,
        destination: impl AsRef<Path>,
    ) -> Result<Self> {
        Self::build(
            ConversionJob::pull(data, format, destination.as_ref()),
            observer,
            EncoderSettings::default(),
            Arc::new(FfmpegBackend),
        )
    }

    /// Create a job with explicit settings and codec backend.
    pub fn build(
        job: ConversionJob,
        observer: Arc<dyn ConversionObserver>,
        settings: EncoderSettings,
        backend: Arc<dyn CodecBackend>,
    ) -> Result<Self> {
        if !backend.encoder_available() {
            return Err(ConverterError::init("no AAC encoder available"));
        }
        check_destination(&job.destination)?;

        let (source, source_path): (Box<dyn PcmSource>, _) = match job.source {
            JobSource::File(path) => {
                if path == job.destination {
                    return Err(ConverterError::init(format!(
                        "source and destination are the same file: {:?}",
                        path
                    )));
                }
                (backend.open_file(&path)?, Some(path))
            }
            JobSource::Pull { data, format } => (Box::new(PullSource::new(data, format)), None),
        };

        let id = Uuid::new_v4();
        tracing::debug!(
            job = %id,
            source = ?source_path,
            destination = ?job.destination,
            format = ?source.format(),
            "conversion job created"
        );

        Ok(Self {
            id,
            source_path,
            destination: job.destination,
            format: source.format(),
            seekable: source.seekable(),
            settings,
            backend,
            observer,
            control: Arc::new(JobControl::new()),
            source: Mutex::new(Some(source)),
        })
    }

    /// Whether this host can encode AAC at all.
    pub fn encoder_available() -> bool {
        FfmpegBackend.encoder_available()
    }

    /// Begin converting on a background thread. Returns immediately.
    ///
    /// A job runs at most once: starting it again, or starting a cancelled
    /// job, fails with `Initialisation` and produces no notification.
    pub fn start(&self) -> Result<()> {
        self.control.begin()?;

        let source = match self.source.lock().take() {
            Some(source) => source,
            None => {
                self.control
                    .finish(ConversionState::Failed(ErrorKind::Initialisation));
                return Err(ConverterError::init("job source already consumed"));
            }
        };

        let (notifier, _dispatcher) =
            match Notifier::spawn(self.id, self.observer.clone(), self.control.clone()) {
                Ok(spawned) => spawned,
                Err(e) => {
                    self.control.finish(ConversionState::Failed(e.kind()));
                    return Err(e);
                }
            };

        let worker = Worker::new(
            self.id,
            source,
            self.destination.clone(),
            self.settings.clone(),
            self.backend.clone(),
            self.control.clone(),
            notifier,
        );

        let spawned = std::thread::Builder::new()
            .name(format!("aac-convert-{}", short_id(&self.id)))
            .spawn(move || worker.run());

        if let Err(e) = spawned {
            // The worker (and with it the notifier) was dropped, so the
            // dispatcher exits without reporting anything
            self.control
                .finish(ConversionState::Failed(ErrorKind::Initialisation));
            return Err(ConverterError::init(e));
        }
        Ok(())
    }

    /// Stop the job. No notification is delivered for a cancelled job and
    /// the destination is removed. Safe to call repeatedly and after the job ended.
    pub fn cancel(&self) {
        if self.control.cancel() {
            tracing::info!(job = %self.id, "cancel requested");
        }
    }

    /// Pause the job as if the audio session was interrupted. Before `start`
    /// the interruption is remembered and the job starts paused.
    pub fn interrupt(&self) {
        if self.control.interrupt() {
            tracing::debug!(job = %self.id, "interrupt requested");
        }
    }

    /// Continue after [`AacConverter::interrupt`].
    pub fn resume(&self) {
        if self.control.resume() {
            tracing::debug!(job = %self.id, "resume requested");
        }
    }

    /// Reposition the source to PCM byte offset `position` before the next
    /// chunk is pulled. Only seekable sources of live jobs accept this.
    pub fn seek(&self, position: u64) -> Result<()> {
        if !self.seekable {
            return Err(ConverterError::init("source is not seekable"));
        }
        self.control.request_seek(position)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Path of the source file; `None` for pulled sources.
    pub fn source(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Format of the PCM fed to the encoder.
    pub fn format(&self) -> FormatDescriptor {
        self.format
    }

    pub fn state(&self) -> ConversionState {
        self.control.state()
    }

    pub(crate) fn control(&self) -> &Arc<JobControl> {
        &self.control
    }
}

/// Dropping the handle does not stop a running job; it still reports its
/// outcome. An interrupted job that no [`AudioSession`](crate::AudioSession)
/// can resume any more is cancelled.
impl Drop for AacConverter {
    fn drop(&mut self) {
        if self.control.release() {
            tracing::info!(job = %self.id, "interrupted job abandoned, cancelling");
        }
    }
}

impl std::fmt::Debug for AacConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AacConverter")
            .field("id", &self.id)
            .field("source", &self.source_path)
            .field("destination", &self.destination)
            .field("state", &self.state())
            .finish()
    }
}

/// The destination's directory must exist and accept new files.
fn check_destination(destination: &Path) -> Result<()> {
    if destination.as_os_str().is_empty() {
        return Err(ConverterError::init("destination path is empty"));
    }
    if destination.is_dir() {
        return Err(ConverterError::init(format!(
            "destination is a directory: {:?}",
            destination
        )));
    }

    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let metadata = std::fs::metadata(parent).map_err(|e| {
        ConverterError::init(format!("destination directory {:?}: {}", parent, e))
    })?;
    if !metadata.is_dir() {
        return Err(ConverterError::init(format!(
            "destination parent is not a directory: {:?}",
            parent
        )));
    }
    if metadata.permissions().readonly() {
        return Err(ConverterError::init(format!(
            "destination directory is read-only: {:?}",
            parent
        )));
    }
    Ok(())
}
