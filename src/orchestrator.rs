//! The capture loop: pulls frames from a backend at a paced rate, runs
//! activity classification, corrections, and dedupe, feeds the frame
//! pool, and drives the recording and metrics sinks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::activity::{ActivityConfig, ActivityDecision, SceneActivityTracker};
use crate::capture::{CaptureBackend, CaptureSession};
use crate::corrections::CorrectionQueue;
use crate::error::{CaptureError, CaptureResult};
use crate::gate::{wait_for_static_scene, GateConfig};
use crate::guard::{rss_mb, ScopeGuard, TracingScopeObserver};
use crate::image::RawImage;
use crate::ops::{apply_filters, apply_grayscale, resize_bilinear, FrameFilters};
use crate::pool::{FramePool, FramePoolConfig, PushOutcome};
use crate::signature::{frames_identical, FrameSignature};
use crate::sinks::{AggregateRecord, BmpRecorder, FrameRecord, MetricsLogger};
use crate::stats::{NullStats, StatsEvent, StatsSink};
use crate::timing::sleep_until;

/// Receives each frame for on-screen preview. The display buffer it
/// owns is outside this crate's scope.
pub trait Viewer: Send {
    fn update(&mut self, frame: &RawImage);
}

/// Preview sink that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullViewer;

impl Viewer for NullViewer {
    fn update(&mut self, _frame: &RawImage) {}
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub display_index: u32,
    pub fps: u32,
    /// Capture duration; anything <= 0 takes a single snapshot.
    pub seconds: i32,
    pub resize: Option<(u32, u32)>,
    /// Base path for `BASE_%06d.bmp` recording. `None` disables.
    pub record_base: Option<PathBuf>,
    /// Preflight stability gate; `None` skips the wait.
    pub static_gate: Option<GateConfig>,
    /// Activity tracker configuration; `None` disables adaptive gating.
    pub adaptive: Option<ActivityConfig>,
    pub filters: FrameFilters,
    pub metrics_path: Option<PathBuf>,
    pub pool: FramePoolConfig,
    /// Consecutive sink failures tolerated before the loop aborts.
    pub sink_retry_budget: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            display_index: 0,
            fps: 30,
            seconds: 0,
            resize: None,
            record_base: None,
            static_gate: Some(GateConfig::default()),
            adaptive: Some(ActivityConfig::default()),
            filters: FrameFilters::default(),
            metrics_path: None,
            pool: FramePoolConfig::default(),
            sink_retry_budget: 3,
        }
    }
}

/// Final accounting for one capture run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub ticks_total: u64,
    pub frames_captured: u64,
    pub frames_unique: u64,
    pub duplicates_skipped: u64,
    pub ticks_skipped: u64,
    pub quiet_frames: u64,
    pub static_frames: u64,
    pub dedupe_block_frames: u64,
    pub recorded_files: u64,
    pub adaptive_enabled: bool,
}

impl CaptureSummary {
    /// Frames whose content matched the previous pool entry.
    pub fn frames_duplicate(&self) -> u64 {
        self.frames_captured.saturating_sub(self.frames_unique)
    }
}

impl std::fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "captured={} unique={} duplicates={} write_skips={} skipped_ticks={} recorded={}",
            self.frames_captured,
            self.frames_unique,
            self.frames_duplicate(),
            self.duplicates_skipped,
            self.ticks_skipped,
            self.recorded_files
        )?;
        if self.adaptive_enabled {
            write!(
                f,
                " quiet={} static={} dedupe_block={}",
                self.quiet_frames, self.static_frames, self.dedupe_block_frames
            )?;
        }
        Ok(())
    }
}

pub struct CaptureOrchestratorBuilder {
    backend: Arc<dyn CaptureBackend>,
    config: OrchestratorConfig,
    stats: Arc<dyn StatsSink>,
    viewer: Option<Box<dyn Viewer>>,
}

impl CaptureOrchestratorBuilder {
    pub fn new(backend: Arc<dyn CaptureBackend>, display_index: u32) -> Self {
        Self {
            backend,
            config: OrchestratorConfig {
                display_index,
                ..OrchestratorConfig::default()
            },
            stats: Arc::new(NullStats),
            viewer: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        let display_index = self.config.display_index;
        self.config = OrchestratorConfig {
            display_index,
            ..config
        };
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.config.fps = fps;
        self
    }

    pub fn seconds(mut self, seconds: i32) -> Self {
        self.config.seconds = seconds;
        self
    }

    pub fn resize(mut self, width: u32, height: u32) -> Self {
        self.config.resize = Some((width, height));
        self
    }

    pub fn record_to(mut self, base: PathBuf) -> Self {
        self.config.record_base = Some(base);
        self
    }

    pub fn static_gate(mut self, gate: Option<GateConfig>) -> Self {
        self.config.static_gate = gate;
        self
    }

    pub fn adaptive(mut self, adaptive: Option<ActivityConfig>) -> Self {
        self.config.adaptive = adaptive;
        self
    }

    pub fn filters(mut self, filters: FrameFilters) -> Self {
        self.config.filters = filters;
        self
    }

    pub fn metrics_path(mut self, path: PathBuf) -> Self {
        self.config.metrics_path = Some(path);
        self
    }

    pub fn pool_config(mut self, pool: FramePoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    pub fn viewer(mut self, viewer: Box<dyn Viewer>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn build(self) -> CaptureOrchestrator {
        let mut config = self.config;
        config.fps = config.fps.max(1);
        config.pool.fps_hint = config.fps;
        let pool = Arc::new(FramePool::with_stats(config.pool, Arc::clone(&self.stats)));
        CaptureOrchestrator {
            session: CaptureSession::new(self.backend),
            corrections: CorrectionQueue::new(),
            pool,
            config,
            stats: self.stats,
            viewer: self.viewer,
        }
    }
}

pub struct CaptureOrchestrator {
    session: CaptureSession,
    corrections: CorrectionQueue,
    pool: Arc<FramePool>,
    config: OrchestratorConfig,
    stats: Arc<dyn StatsSink>,
    viewer: Option<Box<dyn Viewer>>,
}

impl CaptureOrchestrator {
    pub fn builder(backend: Arc<dyn CaptureBackend>, display_index: u32) -> CaptureOrchestratorBuilder {
        CaptureOrchestratorBuilder::new(backend, display_index)
    }

    /// Shared handle to the coalescing history and its quick lane.
    pub fn pool(&self) -> Arc<FramePool> {
        Arc::clone(&self.pool)
    }

    pub fn corrections(&self) -> &CorrectionQueue {
        &self.corrections
    }

    /// Run the capture loop to completion.
    pub fn run(&mut self) -> CaptureResult<CaptureSummary> {
        let scope_observer = TracingScopeObserver;
        let _run_scope = ScopeGuard::enter("capture-run", &scope_observer);
        let cfg = self.config.clone();
        let fps = cfg.fps;

        // Startup: the display must exist before anything else happens.
        let display_info = self.session.display_by_index(cfg.display_index)?;
        info!(display = %display_info, fps, seconds = cfg.seconds, "capture start");

        if let Some(gate_cfg) = &cfg.static_gate {
            let mut gate_cfg = *gate_cfg;
            gate_cfg.fps_hint = fps;
            gate_cfg.resize = cfg.resize;
            let report = wait_for_static_scene(&mut self.session, cfg.display_index, &gate_cfg)?;
            if !report.ok {
                warn!(message = %report.message, "static gate failed");
                return Err(CaptureError::GateTimeout {
                    last_diff_ratio: report.last_diff_ratio,
                });
            }
            info!(stable_seconds = report.stable_seconds, "static gate passed");
        }

        let mut recorder = match &cfg.record_base {
            Some(base) => Some(BmpRecorder::create(base.clone())?),
            None => None,
        };
        let metrics = match &cfg.metrics_path {
            Some(path) => Some(MetricsLogger::create(path)?),
            None => None,
        };

        // Grayscale rides the correction queue; the remaining filters
        // run as a direct chain after corrections.
        if cfg.filters.grayscale {
            self.corrections.enqueue_persistent(apply_grayscale);
        }
        let residual_filters = FrameFilters {
            grayscale: false,
            ..cfg.filters
        };

        let mut tracker = cfg.adaptive.map(SceneActivityTracker::new);

        let total_ticks: u64 = if cfg.seconds <= 0 {
            1
        } else {
            u64::from(fps) * cfg.seconds as u64
        };
        let tick_period = Duration::from_secs_f64(1.0 / f64::from(fps));
        let started = Instant::now();

        let mut summary = CaptureSummary {
            ticks_total: total_ticks,
            adaptive_enabled: tracker.is_some(),
            ..CaptureSummary::default()
        };
        let mut prev: Option<(Arc<RawImage>, FrameSignature)> = None;
        let mut consecutive_sink_failures = 0u32;
        let mut first_sink_error: Option<CaptureError> = None;

        for tick in 0..total_ticks {
            let Some(raw) = self.session.capture_display(cfg.display_index)? else {
                summary.ticks_skipped += 1;
                self.stats.record(StatsEvent::TickSkipped);
                if total_ticks > 1 {
                    sleep_until(started + tick_period * (tick as u32 + 1));
                }
                continue;
            };

            let t_rel = tick as f64 / f64::from(fps);

            let mut frame = match cfg.resize {
                Some((w, h)) => {
                    let resized = resize_bilinear(&raw, w, h);
                    if resized.ok() {
                        resized
                    } else {
                        raw
                    }
                }
                None => raw,
            };

            let decision = match (&mut tracker, &prev) {
                (Some(tracker), Some((prev_img, _))) => {
                    let d = tracker.update(&frame, Some(prev_img.as_ref()), t_rel);
                    if d.is_mid_band {
                        summary.quiet_frames += 1;
                        self.stats.record(StatsEvent::QuietFrame);
                    }
                    if d.is_static {
                        summary.static_frames += 1;
                        self.stats.record(StatsEvent::StaticFrame);
                    }
                    if d.dedupe_block {
                        summary.dedupe_block_frames += 1;
                        self.stats.record(StatsEvent::DedupeBlockFrame);
                    }
                    d
                }
                _ => ActivityDecision {
                    allow_dedupe: true,
                    ..ActivityDecision::default()
                },
            };

            self.corrections.apply_all(&mut frame);
            apply_filters(&mut frame, &residual_filters);

            let sig = FrameSignature::of(&frame);
            let identical = decision.allow_dedupe
                && prev
                    .as_ref()
                    .is_some_and(|(p, ps)| frames_identical(&frame, p, &sig, ps));

            if let Some(viewer) = &mut self.viewer {
                viewer.update(&frame);
            }

            let frame = Arc::new(frame);
            summary.frames_captured += 1;
            self.stats.record(StatsEvent::FrameCaptured);
            if self.pool.push(Arc::clone(&frame), tick as i64, t_rel) == PushOutcome::Appended {
                summary.frames_unique += 1;
                self.stats.record(StatsEvent::FrameUnique);
            }

            if let Some(rec) = &mut recorder {
                if decision.dedupe_block || !identical {
                    match rec.write_indexed(&frame, tick) {
                        Ok(_) => {
                            summary.recorded_files += 1;
                            consecutive_sink_failures = 0;
                        }
                        Err(err) => {
                            self.stats.record(StatsEvent::SinkFailure);
                            warn!(error = %err, "frame write failed");
                            consecutive_sink_failures += 1;
                            if first_sink_error.is_none() {
                                first_sink_error = Some(err.to_sendable());
                            }
                            if consecutive_sink_failures > cfg.sink_retry_budget {
                                return Err(first_sink_error.take().unwrap_or(err));
                            }
                        }
                    }
                } else {
                    summary.duplicates_skipped += 1;
                    self.stats.record(StatsEvent::DuplicateSkipped);
                }
            }

            if let Some(metrics) = &metrics {
                let mut record = FrameRecord::new(tick, t_rel);
                record.unique = u8::from(!identical);
                record.dup_skipped_total = summary.duplicates_skipped;
                record.pool_frames = self.pool.len() as u64;
                record.rss_mb = rss_mb();
                record.diff_ratio = decision.diff_ratio;
                record.dedupe_block = u8::from(decision.dedupe_block);
                if let Err(err) = metrics.log_frame(record) {
                    warn!(error = %err, "metrics frame record dropped");
                }

                let aggregate = AggregateRecord {
                    frames_captured: summary.frames_captured,
                    frames_unique: summary.frames_unique,
                    dup_skipped_total: summary.duplicates_skipped,
                    effective_fps: summary.frames_captured as f64
                        / started.elapsed().as_secs_f64().max(1e-9),
                    pool_frames: self.pool.len() as u64,
                    pool_bytes: self.pool.total_bytes(),
                    rss_mb: rss_mb(),
                    ..AggregateRecord::new()
                };
                if let Err(err) = metrics.log_aggregate_throttled(aggregate) {
                    warn!(error = %err, "metrics aggregate record dropped");
                }
            }

            if tick % u64::from(fps) == 0 {
                debug!(
                    tick,
                    diff_ratio = decision.diff_ratio,
                    is_static = decision.is_static,
                    awake = decision.is_awake,
                    quiet = decision.is_mid_band,
                    dedupe_block = decision.dedupe_block,
                    allow_dedupe = decision.allow_dedupe,
                    "activity"
                );
            }

            prev = Some((frame, sig));

            if total_ticks > 1 {
                // Absolute schedule: a missed deadline is not caught up,
                // the next tick resyncs to `start + k * period`.
                sleep_until(started + tick_period * (tick as u32 + 1));
            }
        }

        if let Some(metrics) = &metrics {
            let _ = metrics.flush();
        }
        info!(%summary, "capture complete");
        Ok(summary)
    }
}
