//! Conversion state machine and job control
//!
//! [`JobControl`] is shared between the caller-facing handle, the worker and
//! the notifier. Every state change goes through its methods under one lock;
//! callers never wait on the worker, and the worker observes requests at its
//! iteration boundaries.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::{ConverterError, ErrorKind, Result};

/// Lifecycle state of a conversion job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    Idle,
    Running,
    Interrupted,
    Cancelled,
    Completed,
    Failed(ErrorKind),
}

impl ConversionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConversionState::Cancelled | ConversionState::Completed | ConversionState::Failed(_)
        )
    }
}

/// What the worker should do at an iteration boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Keep going, first repositioning the source if a seek was requested
    Run { seek: Option<u64> },
    /// Park until resumed
    Interrupted,
    /// The encoder session was lost; the job cannot continue
    SessionLost,
    Cancelled,
}

/// Why a parked worker woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wake {
    Resumed,
    SessionLost,
    Cancelled,
}

#[derive(Debug)]
struct ControlInner {
    state: ConversionState,
    /// Interruption requested before the job started
    deferred_interrupt: bool,
    session_lost: bool,
    pending_seek: Option<u64>,
    /// The caller's handle is gone
    released: bool,
    /// Audio sessions routing events to this job
    sessions: usize,
}

impl ControlInner {
    /// Parked with nobody left who could resume it.
    fn stranded(&self) -> bool {
        self.released && self.sessions == 0 && self.state == ConversionState::Interrupted
    }
}

#[derive(Debug)]
pub(crate) struct JobControl {
    inner: Mutex<ControlInner>,
    wake: Condvar,
    /// Mirrors `state == Cancelled` for lock-free checks by the notifier
    cancelled: AtomicBool,
}

impl JobControl {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ControlInner {
                state: ConversionState::Idle,
                deferred_interrupt: false,
                session_lost: false,
                pending_seek: None,
                released: false,
                sessions: 0,
            }),
            wake: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConversionState {
        self.inner.lock().state
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Idle → Running. A job is single-use.
    pub fn begin(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != ConversionState::Idle {
            return Err(ConverterError::init(format!(
                "job cannot be started from state {:?}",
                inner.state
            )));
        }
        inner.state = if inner.deferred_interrupt {
            ConversionState::Interrupted
        } else {
            ConversionState::Running
        };
        inner.deferred_interrupt = false;
        Ok(())
    }

    /// Move a non-terminal job to Cancelled. Returns `false` if nothing changed.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        self.cancel_locked(&mut inner)
    }

    fn cancel_locked(&self, inner: &mut ControlInner) -> bool {
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = ConversionState::Cancelled;
        self.cancelled.store(true, Ordering::Release);
        self.wake.notify_all();
        true
    }

    /// The caller dropped its handle. Returns `true` if that cancelled a
    /// parked job no session can resume.
    pub fn release(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.released = true;
        inner.stranded() && self.cancel_locked(&mut inner)
    }

    /// An audio session started routing events to this job.
    pub fn attach_session(&self) {
        self.inner.lock().sessions += 1;
    }

    /// An audio session stopped routing events to this job. Returns `true` if
    /// that cancelled a parked job whose handle is gone.
    pub fn detach_session(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.sessions = inner.sessions.saturating_sub(1);
        inner.stranded() && self.cancel_locked(&mut inner)
    }

    pub fn interrupt(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ConversionState::Idle => {
                inner.deferred_interrupt = true;
                true
            }
            ConversionState::Running => {
                inner.state = ConversionState::Interrupted;
                self.wake.notify_all();
                true
            }
            _ => false,
        }
    }

    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ConversionState::Idle if inner.deferred_interrupt => {
                inner.deferred_interrupt = false;
                true
            }
            ConversionState::Interrupted => {
                inner.state = ConversionState::Running;
                self.wake.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Record that the encoding session is gone. Implies an interruption.
    pub fn lose_session(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            ConversionState::Idle => {
                inner.deferred_interrupt = true;
                inner.session_lost = true;
                true
            }
            ConversionState::Running | ConversionState::Interrupted => {
                inner.state = ConversionState::Interrupted;
                inner.session_lost = true;
                self.wake.notify_all();
                true
            }
            _ => false,
        }
    }

    pub fn request_seek(&self, position: u64) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return Err(ConverterError::init(format!(
                "cannot seek a job in state {:?}",
                inner.state
            )));
        }
        inner.pending_seek = Some(position);
        Ok(())
    }

    /// Called by the worker at every iteration boundary.
    pub fn step(&self) -> Step {
        let mut inner = self.inner.lock();
        match inner.state {
            ConversionState::Cancelled => Step::Cancelled,
            _ if inner.session_lost => Step::SessionLost,
            ConversionState::Interrupted => Step::Interrupted,
            _ => Step::Run {
                seek: inner.pending_seek.take(),
            },
        }
    }

    /// Block the worker while the job stays interrupted.
    pub fn wait_for_resume(&self) -> Wake {
        let mut inner = self.inner.lock();
        loop {
            match inner.state {
                ConversionState::Cancelled => return Wake::Cancelled,
                _ if inner.session_lost => return Wake::SessionLost,
                ConversionState::Interrupted => self.wake.wait(&mut inner),
                _ => return Wake::Resumed,
            }
        }
    }

    /// Move a live job to a terminal state. Returns `false` if the job was
    /// cancelled (or already terminal), in which case nothing may be reported.
    pub fn finish(&self, outcome: ConversionState) -> bool {
        debug_assert!(outcome.is_terminal());
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = outcome;
        self.wake.notify_all();
        true
    }
}
