use std::time::Instant;

/// Per-tile processing fate for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileRoute {
    /// Render on the CPU path this frame.
    Cpu,
    /// The tile is changing; route it to the offload path and mark it
    /// dirty.
    Offload,
    /// Nothing changed and calibration is over: the tile can be skipped.
    Skip,
}

#[derive(Clone, Copy, Debug)]
pub struct RouterConfig {
    /// Amplitude delta below which a pixel counts as unchanged once
    /// calibrated. Zero while calibrating.
    pub epsilon: f64,
    /// Changed-pixel percentage above which a tile routes to Offload.
    pub k_percent: f64,
    /// Frames required before calibration can complete.
    pub calib_frames: u32,
    /// Wall-clock floor on the calibration window.
    pub calib_min_seconds: f64,
    pub allow_skip_route: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.05,
            k_percent: 5.0,
            calib_frames: 10,
            calib_min_seconds: 0.5,
            allow_skip_route: true,
        }
    }
}

/// Routes tiles by their measured change percentage. The `Skip` route
/// is gated behind a calibration window: while the engine is still
/// learning baseline amplitudes, every quiet tile stays on the CPU
/// path.
pub struct TileRouter {
    cfg: RouterConfig,
    change_percent: Vec<f64>,
    calibrated: bool,
    frames_seen: u32,
    started: Instant,
}

impl TileRouter {
    pub fn new(cfg: RouterConfig, tile_count: usize) -> Self {
        Self {
            cfg,
            change_percent: vec![100.0; tile_count],
            calibrated: false,
            frames_seen: 0,
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.cfg
    }

    /// Reset per-tile state and restart the calibration window, e.g. on
    /// resolution change.
    pub fn reset(&mut self, tile_count: usize) {
        self.change_percent = vec![100.0; tile_count];
        self.calibrated = false;
        self.frames_seen = 0;
        self.started = Instant::now();
    }

    /// Advance the frame counter; calibration completes (monotone) once
    /// both the frame and wall-clock floors are met.
    pub fn begin_frame(&mut self) {
        self.frames_seen = self.frames_seen.saturating_add(1);
        if !self.calibrated
            && self.frames_seen >= self.cfg.calib_frames
            && self.started.elapsed().as_secs_f64() >= self.cfg.calib_min_seconds
        {
            self.calibrated = true;
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    /// The epsilon the change detector should use this frame: zero
    /// while the baseline is still being learned.
    pub fn amplitude_epsilon(&self) -> f64 {
        if self.calibrated {
            self.cfg.epsilon
        } else {
            0.0
        }
    }

    pub fn update_tile_change(&mut self, index: usize, percent: f64) {
        if let Some(slot) = self.change_percent.get_mut(index) {
            *slot = percent;
        }
    }

    pub fn decide(&self, index: usize) -> TileRoute {
        let percent = self.change_percent.get(index).copied().unwrap_or(100.0);
        if percent > self.cfg.k_percent {
            TileRoute::Offload
        } else if self.cfg.allow_skip_route && self.calibrated && percent == 0.0 {
            TileRoute::Skip
        } else {
            TileRoute::Cpu
        }
    }
}
