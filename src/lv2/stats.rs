//! Lock-free processing counters for one instance.
//!
//! The audio thread writes through atomics; the host thread reads
//! snapshots whenever it likes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct ProcessStats {
    /// Blocks the plugin actually ran.
    blocks: AtomicU64,
    /// Blocks answered with silence because the instance was not running.
    silenced_blocks: AtomicU64,
    /// Blocks refused because they were larger than the prepared block
    /// size or a host channel was too short.
    rejected_blocks: AtomicU64,
    dropped_notifications: AtomicU64,
    dropped_midi_events: AtomicU64,
    /// Port writes for unknown ports, read-only ports or unhandled
    /// protocols.
    ignored_writes: AtomicU64,
    dropped_work_requests: AtomicU64,
    dropped_work_responses: AtomicU64,
    /// Cumulative nanoseconds spent in `process()`.
    total_ns: AtomicU64,
    last_ns: AtomicU64,
    peak_ns: AtomicU64,
    last_frames: AtomicU64,
}

impl ProcessStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the RT thread after each block the plugin ran.
    #[inline]
    pub fn record(&self, elapsed_ns: u64, frames: usize) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.total_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
        self.last_ns.store(elapsed_ns, Ordering::Relaxed);
        self.peak_ns.fetch_max(elapsed_ns, Ordering::Relaxed);
        self.last_frames.store(frames as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn silenced(&self) {
        self.silenced_blocks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn rejected(&self) {
        self.rejected_blocks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dropped_notification(&self) {
        self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dropped_midi_event(&self) {
        self.dropped_midi_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn ignored_write(&self) {
        self.ignored_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirror the worker's own drop counters.
    #[inline]
    pub fn set_worker_drops(&self, requests: u64, responses: u64) {
        self.dropped_work_requests.store(requests, Ordering::Relaxed);
        self.dropped_work_responses.store(responses, Ordering::Relaxed);
    }

    pub fn snapshot(&self, sample_rate: f64) -> StatsSnapshot {
        let blocks = self.blocks.load(Ordering::Relaxed);
        let total = self.total_ns.load(Ordering::Relaxed);
        let last_ns = self.last_ns.load(Ordering::Relaxed);
        let frames = self.last_frames.load(Ordering::Relaxed);
        let avg_ns = if blocks > 0 { total / blocks } else { 0 };

        // fraction of the block's real-time budget used by the last block
        let budget_ns = if sample_rate > 0.0 && frames > 0 {
            frames as f64 / sample_rate * 1_000_000_000.0
        } else {
            0.0
        };
        let dsp_percent = if budget_ns > 0.0 {
            last_ns as f64 / budget_ns * 100.0
        } else {
            0.0
        };

        StatsSnapshot {
            blocks,
            silenced_blocks: self.silenced_blocks.load(Ordering::Relaxed),
            rejected_blocks: self.rejected_blocks.load(Ordering::Relaxed),
            dropped_notifications: self.dropped_notifications.load(Ordering::Relaxed),
            dropped_midi_events: self.dropped_midi_events.load(Ordering::Relaxed),
            dropped_writes: 0,
            ignored_writes: self.ignored_writes.load(Ordering::Relaxed),
            dropped_work_requests: self.dropped_work_requests.load(Ordering::Relaxed),
            dropped_work_responses: self.dropped_work_responses.load(Ordering::Relaxed),
            avg_ns,
            last_ns,
            peak_ns: self.peak_ns.load(Ordering::Relaxed),
            dsp_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub blocks: u64,
    pub silenced_blocks: u64,
    pub rejected_blocks: u64,
    pub dropped_notifications: u64,
    pub dropped_midi_events: u64,
    /// Host writes lost to a full port event queue.
    pub dropped_writes: u64,
    pub ignored_writes: u64,
    pub dropped_work_requests: u64,
    pub dropped_work_responses: u64,
    pub avg_ns: u64,
    pub last_ns: u64,
    pub peak_ns: u64,
    /// Last block's DSP load (% of the block duration)
    pub dsp_percent: f64,
}
