//! Audio session events
//!
//! The host platform reports interruptions of the audio encoding session
//! (another process grabbed the hardware codec, the device went to sleep,
//! ...). [`AudioSession`] is the explicit channel those reports travel on:
//! converters subscribe, the platform glue posts events, and each event is
//! applied to every live subscribed job.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::converter::state::JobControl;
use crate::converter::{AacConverter, JobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    InterruptionBegan,
    InterruptionEnded,
    /// The session will not come back; interrupted jobs cannot be restored
    SessionLost,
}

/// Fan-out point for session events
#[derive(Default)]
pub struct AudioSession {
    subscribers: DashMap<JobId, Weak<JobControl>>,
}

impl AudioSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Route future events to `converter`. The session does not keep the job
    /// alive, but while subscribed an interrupted job survives the drop of
    /// its handle so a later `InterruptionEnded` can resume it.
    pub fn subscribe(&self, converter: &AacConverter) {
        let previous = self
            .subscribers
            .insert(converter.id(), Arc::downgrade(converter.control()));
        if previous.is_none() {
            converter.control().attach_session();
        }
    }

    pub fn unsubscribe(&self, job: &JobId) {
        if let Some((_, weak)) = self.subscribers.remove(job) {
            detach(job, &weak);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Apply `event` to every subscribed job. Finished jobs are dropped.
    pub fn post(&self, event: SessionEvent) {
        tracing::info!(?event, subscribers = self.subscribers.len(), "audio session event");

        self.subscribers.retain(|job, weak| {
            let Some(control) = weak.upgrade() else {
                return false;
            };
            if control.state().is_terminal() {
                control.detach_session();
                return false;
            }
            let applied = match event {
                SessionEvent::InterruptionBegan => control.interrupt(),
                SessionEvent::InterruptionEnded => control.resume(),
                SessionEvent::SessionLost => control.lose_session(),
            };
            tracing::debug!(job = %job, ?event, applied, "session event delivered");
            true
        });
    }
}

impl Drop for AudioSession {
    fn drop(&mut self) {
        for entry in self.subscribers.iter() {
            detach(entry.key(), entry.value());
        }
    }
}

fn detach(job: &JobId, weak: &Weak<JobControl>) {
    if let Some(control) = weak.upgrade() {
        if control.detach_session() {
            tracing::info!(job = %job, "interrupted job lost its last session, cancelling");
        }
    }
}
