//! Coalescing in-memory frame history with a quick-lane for changed
//! frames.
//!
//! The pool keeps an insertion-ordered deque of unique frames. A push
//! that is byte-identical to the tail extends the tail's time coverage
//! instead of appending; only genuinely new images enter the deque and
//! the quick-lane ring. Retention is bounded two ways: entries whose
//! coverage ends outside the scrub window roll off the front, and the
//! total byte budget evicts oldest-first. Both floors stop at one frame
//! so the latest image is always available.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::env_config;
use crate::error::CaptureResult;
use crate::image::RawImage;
use crate::ring::SpscRing;
use crate::signature::{frames_identical, FrameSignature};
use crate::sinks::FrameSink;
use crate::stats::{NullStats, StatsEvent, StatsSink};

/// One unique image and the time span it covered.
#[derive(Clone, Debug)]
pub struct PooledFrame {
    pub index: i64,
    pub t_start: f64,
    pub t_end: f64,
    pub run_len: u64,
    pub image: Arc<RawImage>,
    pub sig: FrameSignature,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// The image matched the tail; its run was extended.
    Coalesced,
    /// A new unique entry was appended and published to the quick lane.
    Appended,
    /// The image was invalid and ignored.
    Rejected,
}

#[derive(Clone, Copy, Debug)]
pub struct FramePoolConfig {
    /// Scrub window: changed frames older than this roll off.
    pub retention_seconds: f64,
    pub budget_bytes: u64,
    pub fps_hint: u32,
    /// Collapse the history to a single entry once a static run has
    /// lasted this long. Negative disables collapsing.
    pub static_grace_sec: f64,
    pub quick_lane_capacity: usize,
}

impl Default for FramePoolConfig {
    fn default() -> Self {
        Self {
            retention_seconds: 300.0,
            budget_bytes: 1024 * 1024 * 1024,
            fps_hint: 30,
            static_grace_sec: 1.0,
            quick_lane_capacity: 2048,
        }
    }
}

struct PoolInner {
    frames: VecDeque<PooledFrame>,
    total_bytes: u64,
    latest_ts: f64,
    in_static_run: bool,
    static_since: f64,
    retention_seconds: f64,
    budget_bytes: u64,
}

pub struct FramePool {
    inner: Mutex<PoolInner>,
    quick_lane: SpscRing<Arc<PooledFrame>>,
    fps_hint: u32,
    static_grace_sec: f64,
    stats: Arc<dyn StatsSink>,
}

impl FramePool {
    pub fn new(config: FramePoolConfig) -> Self {
        Self::with_stats(config, Arc::new(NullStats))
    }

    pub fn with_stats(config: FramePoolConfig, stats: Arc<dyn StatsSink>) -> Self {
        let lane_capacity = env_config::quick_lane_capacity_override()
            .unwrap_or(config.quick_lane_capacity)
            .max(2);
        Self {
            inner: Mutex::new(PoolInner {
                frames: VecDeque::new(),
                total_bytes: 0,
                latest_ts: 0.0,
                in_static_run: false,
                static_since: 0.0,
                retention_seconds: config.retention_seconds.max(0.0),
                budget_bytes: config.budget_bytes,
            }),
            quick_lane: SpscRing::with_capacity(lane_capacity),
            fps_hint: config.fps_hint.max(1),
            static_grace_sec: config.static_grace_sec,
            stats,
        }
    }

    pub fn set_retention_seconds(&self, seconds: f64) {
        self.inner.lock().unwrap().retention_seconds = seconds.max(0.0);
    }

    pub fn set_budget_bytes(&self, bytes: u64) {
        self.inner.lock().unwrap().budget_bytes = bytes;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().unwrap().total_bytes
    }

    /// Insert a captured image at time `tsec`. Identical repeats
    /// coalesce into the tail entry; changes append and publish to the
    /// quick lane. Called from the capture thread only.
    pub fn push(&self, image: Arc<RawImage>, index: i64, tsec: f64) -> PushOutcome {
        if !image.ok() {
            return PushOutcome::Rejected;
        }
        let sig = FrameSignature::of(&image);

        let mut inner = self.inner.lock().unwrap();
        inner.latest_ts = tsec;

        if let Some(last) = inner.frames.back() {
            if frames_identical(&image, &last.image, &sig, &last.sig) {
                let last = inner.frames.back_mut().expect("tail checked above");
                last.t_end = tsec;
                last.run_len += 1;

                if self.static_grace_sec >= 0.0 {
                    if !inner.in_static_run {
                        inner.in_static_run = true;
                        inner.static_since = tsec;
                    }
                    if tsec - inner.static_since >= self.static_grace_sec {
                        self.collapse_to_tail(&mut inner);
                    }
                }

                self.evict_keep_one(&mut inner);
                return PushOutcome::Coalesced;
            }
            inner.in_static_run = false;
            inner.static_since = 0.0;
        }

        let frame = PooledFrame {
            index,
            t_start: tsec,
            t_end: tsec,
            run_len: 1,
            image,
            sig,
        };
        inner.total_bytes += frame.image.size_bytes() as u64;
        let handle = Arc::new(frame.clone());
        inner.frames.push_back(frame);

        // Changed frames only; drops are acceptable when the consumer
        // lags, the history still holds the image.
        if !self.quick_lane.push(handle) {
            self.stats.record(StatsEvent::QuickLaneDropped);
        }

        self.evict_keep_one(&mut inner);
        PushOutcome::Appended
    }

    /// Consumer side of the quick lane. Single consumer thread only.
    pub fn pop_quick(&self) -> Option<Arc<PooledFrame>> {
        self.quick_lane.pop()
    }

    /// Frames whose coverage starts within the trailing window, oldest
    /// first. Non-empty whenever the pool is non-empty.
    pub fn snapshot_recent(&self, last_seconds: f64) -> Vec<PooledFrame> {
        let inner = self.inner.lock().unwrap();
        if inner.frames.is_empty() {
            return Vec::new();
        }
        let cutoff = inner.latest_ts - last_seconds.max(0.0);
        let mut out: Vec<PooledFrame> = inner
            .frames
            .iter()
            .rev()
            .take_while(|f| f.t_start >= cutoff)
            .cloned()
            .collect();
        if out.is_empty() {
            out.push(inner.frames.back().expect("non-empty").clone());
        }
        out.reverse();
        out
    }

    /// Expand coalesced runs back to real time and write them to the
    /// sink: each frame repeats `max(1, round((t_end - t_start) * fps))`
    /// times. Returns the number of frames written.
    pub fn export_recent(
        &self,
        last_seconds: f64,
        fps: u32,
        sink: &mut dyn FrameSink,
    ) -> CaptureResult<u64> {
        let fps = fps.max(1);
        let mut written = 0u64;
        for frame in self.snapshot_recent(last_seconds) {
            let repeats = expand_repeats(&frame, fps);
            for _ in 0..repeats {
                sink.write_frame(&frame.image, written)?;
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn fps_hint(&self) -> u32 {
        self.fps_hint
    }

    fn collapse_to_tail(&self, inner: &mut PoolInner) {
        while inner.frames.len() > 1 {
            let evicted = inner.frames.pop_front().expect("len checked");
            inner.total_bytes = inner
                .total_bytes
                .saturating_sub(evicted.image.size_bytes() as u64);
            self.stats.record(StatsEvent::FrameEvicted);
        }
    }

    fn evict_keep_one(&self, inner: &mut PoolInner) {
        let cutoff = inner.latest_ts - inner.retention_seconds;
        while inner.frames.len() > 1
            && inner.frames.front().expect("len checked").t_end < cutoff
        {
            let evicted = inner.frames.pop_front().expect("len checked");
            inner.total_bytes = inner
                .total_bytes
                .saturating_sub(evicted.image.size_bytes() as u64);
            self.stats.record(StatsEvent::FrameEvicted);
            trace!(index = evicted.index, "scrub-window eviction");
        }
        while inner.frames.len() > 1 && inner.total_bytes > inner.budget_bytes {
            let evicted = inner.frames.pop_front().expect("len checked");
            inner.total_bytes = inner
                .total_bytes
                .saturating_sub(evicted.image.size_bytes() as u64);
            self.stats.record(StatsEvent::FrameEvicted);
            trace!(index = evicted.index, "budget eviction");
        }
    }
}

fn expand_repeats(frame: &PooledFrame, fps: u32) -> u64 {
    let span = (frame.t_end - frame.t_start).max(0.0);
    ((span * f64::from(fps)).round() as u64).max(1)
}
