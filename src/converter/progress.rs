//! Progress computation
//!
//! Progress is computed from PCM bytes consumed. With a known total it is the
//! consumed fraction; without one it approaches 1.0 asymptotically over a
//! configurable horizon. Emitted values never decrease.

#[derive(Debug)]
pub(crate) struct ProgressTracker {
    total: Option<u64>,
    /// Bytes at which an unbounded source reports one half
    horizon: f64,
    step: f64,
    processed: u64,
    last_emitted: Option<f64>,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>, horizon_bytes: f64, step: f64) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            horizon: horizon_bytes.max(1.0),
            step: step.max(0.0),
            processed: 0,
            last_emitted: None,
        }
    }

    pub fn fraction(&self) -> f64 {
        let processed = self.processed as f64;
        match self.total {
            Some(total) => (processed / total as f64).min(1.0),
            None => processed / (processed + self.horizon),
        }
    }

    /// Account for `bytes` more consumed PCM; returns a value worth reporting.
    pub fn advance(&mut self, bytes: usize) -> Option<f64> {
        self.processed += bytes as u64;
        let fraction = self.fraction();
        let due = match self.last_emitted {
            None => fraction > 0.0,
            Some(last) => fraction > last && (fraction - last >= self.step || fraction >= 1.0),
        };
        if due {
            self.last_emitted = Some(fraction);
            Some(fraction)
        } else {
            None
        }
    }

    /// The source was repositioned to byte `position`.
    pub fn seek_to(&mut self, position: u64) {
        self.processed = position;
    }

    /// Final value at end of stream: 1.0 unless it was already reported.
    pub fn complete(&mut self) -> Option<f64> {
        if self.last_emitted == Some(1.0) {
            return None;
        }
        self.last_emitted = Some(1.0);
        Some(1.0)
    }
}
