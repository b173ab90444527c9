//! Injected statistics reporting.
//!
//! Components report discrete events to a [`StatsSink`] handed to them
//! at construction; nothing in the crate aggregates through globals.
//! [`PipelineStats`] is the default aggregate, updated atomically by the
//! capture thread and readable from any thread via `snapshot()`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsEvent {
    /// A tick produced a frame (unique or duplicate).
    FrameCaptured,
    /// The frame started a new unique entry in the history.
    FrameUnique,
    /// A recording write was skipped because the frame was identical.
    DuplicateSkipped,
    /// The activity tracker classified the frame as mid-band.
    QuietFrame,
    /// The activity tracker classified the frame as static.
    StaticFrame,
    /// The frame fell inside a dedupe-block window.
    DedupeBlockFrame,
    /// A capture attempt returned nothing; the tick was skipped.
    TickSkipped,
    /// A sink rejected a write.
    SinkFailure,
    /// A history entry was evicted by time or budget pressure.
    FrameEvicted,
    /// A quick-lane publication was dropped because the ring was full.
    QuickLaneDropped,
}

pub trait StatsSink: Send + Sync {
    fn record(&self, event: StatsEvent);
}

/// Atomic event counters with a point-in-time snapshot, shared between
/// the capture thread and any observer.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub frames_captured: AtomicU64,
    pub frames_unique: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub quiet_frames: AtomicU64,
    pub static_frames: AtomicU64,
    pub dedupe_block_frames: AtomicU64,
    pub ticks_skipped: AtomicU64,
    pub sink_failures: AtomicU64,
    pub frames_evicted: AtomicU64,
    pub quick_lane_dropped: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_unique: self.frames_unique.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            quiet_frames: self.quiet_frames.load(Ordering::Relaxed),
            static_frames: self.static_frames.load(Ordering::Relaxed),
            dedupe_block_frames: self.dedupe_block_frames.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            frames_evicted: self.frames_evicted.load(Ordering::Relaxed),
            quick_lane_dropped: self.quick_lane_dropped.load(Ordering::Relaxed),
        }
    }
}

impl StatsSink for PipelineStats {
    fn record(&self, event: StatsEvent) {
        let counter = match event {
            StatsEvent::FrameCaptured => &self.frames_captured,
            StatsEvent::FrameUnique => &self.frames_unique,
            StatsEvent::DuplicateSkipped => &self.duplicates_skipped,
            StatsEvent::QuietFrame => &self.quiet_frames,
            StatsEvent::StaticFrame => &self.static_frames,
            StatsEvent::DedupeBlockFrame => &self.dedupe_block_frames,
            StatsEvent::TickSkipped => &self.ticks_skipped,
            StatsEvent::SinkFailure => &self.sink_failures,
            StatsEvent::FrameEvicted => &self.frames_evicted,
            StatsEvent::QuickLaneDropped => &self.quick_lane_dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Plain-value copy of [`PipelineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_captured: u64,
    pub frames_unique: u64,
    pub duplicates_skipped: u64,
    pub quiet_frames: u64,
    pub static_frames: u64,
    pub dedupe_block_frames: u64,
    pub ticks_skipped: u64,
    pub sink_failures: u64,
    pub frames_evicted: u64,
    pub quick_lane_dropped: u64,
}

/// Discards everything. For callers that do not care.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn record(&self, _event: StatsEvent) {}
}
