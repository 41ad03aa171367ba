//! Global atomic counters for vigil observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at a daemon tick).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters — no allocations, no locking.
pub struct Metrics {
    events_ingested: AtomicU64,
    incidents_opened: AtomicU64,
    sweeps_completed: AtomicU64,
    diagnoses_requested: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_ingested: AtomicU64::new(0),
            incidents_opened: AtomicU64::new(0),
            sweeps_completed: AtomicU64::new(0),
            diagnoses_requested: AtomicU64::new(0),
        }
    }

    /// Increment the events-ingested counter by one.
    pub fn inc_events_ingested(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the incidents-opened counter by one.
    pub fn inc_incidents_opened(&self) {
        self.incidents_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the sweeps-completed counter by one.
    pub fn inc_sweeps_completed(&self) {
        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the diagnoses-requested counter by one.
    pub fn inc_diagnoses_requested(&self) {
        self.diagnoses_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (daemon tick, end of a batch)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            events_ingested = self.events_ingested(),
            incidents_opened = self.incidents_opened(),
            sweeps_completed = self.sweeps_completed(),
            diagnoses_requested = self.diagnoses_requested(),
        );
    }

    /// Read the current events-ingested count.
    pub fn events_ingested(&self) -> u64 {
        self.events_ingested.load(Ordering::Relaxed)
    }

    /// Read the current incidents-opened count.
    pub fn incidents_opened(&self) -> u64 {
        self.incidents_opened.load(Ordering::Relaxed)
    }

    /// Read the current sweeps-completed count.
    pub fn sweeps_completed(&self) -> u64 {
        self.sweeps_completed.load(Ordering::Relaxed)
    }

    /// Read the current diagnoses-requested count.
    pub fn diagnoses_requested(&self) -> u64 {
        self.diagnoses_requested.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.events_ingested.store(0, Ordering::Relaxed);
        self.incidents_opened.store(0, Ordering::Relaxed);
        self.sweeps_completed.store(0, Ordering::Relaxed);
        self.diagnoses_requested.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.events_ingested(), 0);
        m.inc_events_ingested();
        m.inc_events_ingested();
        assert_eq!(m.events_ingested(), 2);

        m.inc_incidents_opened();
        assert_eq!(m.incidents_opened(), 1);

        m.inc_sweeps_completed();
        m.inc_diagnoses_requested();
        assert_eq!(m.sweeps_completed(), 1);
        assert_eq!(m.diagnoses_requested(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_events_ingested();
        m.inc_incidents_opened();
        m.inc_sweeps_completed();
        m.reset();
        assert_eq!(m.events_ingested(), 0);
        assert_eq!(m.incidents_opened(), 0);
        assert_eq!(m.sweeps_completed(), 0);
    }
}
