//! Progress and completion notifications
//!
//! Observers are called from a per-job dispatcher thread, never from the
//! caller's thread and never from the encode loop itself. The worker hands
//! notifications over an unbounded channel so it never waits on an observer.
//!
//! Once a job is cancelled the dispatcher drops everything still queued. A
//! callback that is already running when `cancel` is called cannot be
//! recalled; it is the only notification that can arrive after a cancel.

use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::converter::state::JobControl;
use crate::converter::JobId;
use crate::error::{ConverterError, Result};

/// Receives the outcome of a conversion job.
pub trait ConversionObserver: Send + Sync {
    fn on_completed(&self, job: JobId);

    fn on_failed(&self, job: JobId, error: ConverterError);

    /// Whether this observer wants [`ConversionObserver::on_progress`] calls.
    /// Queried once, when the job starts.
    fn wants_progress(&self) -> bool {
        false
    }

    /// Fraction in `[0.0, 1.0]`, non-decreasing within a job.
    fn on_progress(&self, _job: JobId, _fraction: f64) {}
}

/// A notification as delivered through [`ChannelObserver`]
#[derive(Debug)]
pub enum ConversionEvent {
    Progress { job: JobId, fraction: f64 },
    Completed { job: JobId },
    Failed { job: JobId, error: ConverterError },
}

impl ConversionEvent {
    pub fn job(&self) -> JobId {
        match self {
            ConversionEvent::Progress { job, .. }
            | ConversionEvent::Completed { job }
            | ConversionEvent::Failed { job, .. } => *job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConversionEvent::Progress { .. })
    }
}

/// Observer that forwards every notification into a tokio channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ConversionEvent>,
    progress: bool,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its events.
    pub fn new(progress: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<ConversionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx, progress }), rx)
    }

    fn forward(&self, event: ConversionEvent) {
        // The receiver may be gone; the job carries on regardless
        let _ = self.tx.send(event);
    }
}

impl ConversionObserver for ChannelObserver {
    fn on_completed(&self, job: JobId) {
        self.forward(ConversionEvent::Completed { job });
    }

    fn on_failed(&self, job: JobId, error: ConverterError) {
        self.forward(ConversionEvent::Failed { job, error });
    }

    fn wants_progress(&self) -> bool {
        self.progress
    }

    fn on_progress(&self, job: JobId, fraction: f64) {
        self.forward(ConversionEvent::Progress { job, fraction });
    }
}

enum Notification {
    Progress(f64),
    Completed,
    Failed(ConverterError),
}

/// Worker-side handle of a job's dispatcher
pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
    wants_progress: bool,
}

impl Notifier {
    /// Spawn the dispatcher thread for `job`.
    pub fn spawn(
        job: JobId,
        observer: Arc<dyn ConversionObserver>,
        control: Arc<JobControl>,
    ) -> Result<(Self, JoinHandle<()>)> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let wants_progress = observer.wants_progress();

        let handle = std::thread::Builder::new()
            .name(format!("aac-notify-{}", short_id(&job)))
            .spawn(move || {
                while let Some(notification) = rx.blocking_recv() {
                    if control.is_cancelled() {
                        tracing::debug!(job = %job, "job cancelled, dropping queued notifications");
                        break;
                    }
                    match notification {
                        Notification::Progress(fraction) => observer.on_progress(job, fraction),
                        Notification::Completed => observer.on_completed(job),
                        Notification::Failed(error) => observer.on_failed(job, error),
                    }
                }
            })
            .map_err(ConverterError::init)?;

        Ok((Self { tx, wants_progress }, handle))
    }

    pub fn wants_progress(&self) -> bool {
        self.wants_progress
    }

    pub fn progress(&self, fraction: f64) {
        if self.wants_progress {
            let _ = self.tx.send(Notification::Progress(fraction));
        }
    }

    pub fn completed(&self) {
        let _ = self.tx.send(Notification::Completed);
    }

    pub fn failed(&self, error: ConverterError) {
        let _ = self.tx.send(Notification::Failed(error));
    }
}

pub(crate) fn short_id(job: &JobId) -> String {
    job.simple().to_string()[..8].to_string()
}
