//! Adaptive scene activity classification.
//!
//! Each frame is scored by `diff_ratio`: the fraction of strided sample
//! points whose B, G, or R delta against the previous frame exceeds a
//! per-channel threshold. The ratio lands in one of three bands:
//!
//! - at or below `static_threshold`: static scene
//! - at or above `wake_threshold`: high activity
//! - between the two: quiet mid-band
//!
//! High activity opens a dedupe-block window during which every frame is
//! forwarded downstream so consumers can reconstruct the transition.
//! Calm scenes aggressively drop repeats. The `awake` latch only clears
//! after a sustained static run that also outlasts the block window.

use crate::image::RawImage;

#[derive(Clone, Copy, Debug)]
pub struct ActivityConfig {
    pub static_threshold: f64,
    pub wake_threshold: f64,
    /// Seconds of forced full recording after a high-activity frame.
    pub dedupe_pause_sec: f64,
    /// Continuous static seconds required before the awake latch clears.
    pub static_reset_sec: f64,
    pub sample_stride: u32,
    pub channel_threshold: u8,
    /// When set, a mid-band frame neither resets nor advances the
    /// static streak; motion must reach the wake band to break it.
    pub freeze_static_on_mid: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            static_threshold: 0.03,
            wake_threshold: 0.05,
            dedupe_pause_sec: 15.0,
            static_reset_sec: 15.0,
            sample_stride: 4,
            channel_threshold: 4,
            freeze_static_on_mid: false,
        }
    }
}

/// Transient classification of one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct ActivityDecision {
    pub diff_ratio: f64,
    pub is_static: bool,
    pub is_awake: bool,
    pub is_mid_band: bool,
    pub dedupe_block: bool,
    pub allow_dedupe: bool,
    pub t_in_static: f64,
    pub t_since_high: f64,
}

/// Fraction of sampled pixels whose any-channel delta exceeds the
/// threshold. Mismatched or invalid inputs count as fully changed.
pub fn sampled_diff_ratio(cur: &RawImage, prev: &RawImage, stride: u32, channel_thr: u8) -> f64 {
    if !cur.ok() || !prev.ok() || cur.dimensions() != prev.dimensions() {
        return 1.0;
    }
    let stride = stride.max(1) as usize;
    let thr = i16::from(channel_thr);

    let w = cur.width() as usize;
    let h = cur.height() as usize;
    let cur_bytes = cur.as_bgra_bytes();
    let prev_bytes = prev.as_bgra_bytes();

    let mut sampled = 0u64;
    let mut changed = 0u64;
    for y in (0..h).step_by(stride) {
        let row = y * w;
        for x in (0..w).step_by(stride) {
            let i = (row + x) * 4;
            let db = (i16::from(cur_bytes[i]) - i16::from(prev_bytes[i])).abs();
            let dg = (i16::from(cur_bytes[i + 1]) - i16::from(prev_bytes[i + 1])).abs();
            let dr = (i16::from(cur_bytes[i + 2]) - i16::from(prev_bytes[i + 2])).abs();
            if db > thr || dg > thr || dr > thr {
                changed += 1;
            }
            sampled += 1;
        }
    }
    if sampled == 0 {
        0.0
    } else {
        changed as f64 / sampled as f64
    }
}

pub struct SceneActivityTracker {
    cfg: ActivityConfig,
    awake: bool,
    static_run_active: bool,
    static_start: f64,
    last_high_time: f64,
    dedupe_block_until: f64,
}

impl SceneActivityTracker {
    pub fn new(cfg: ActivityConfig) -> Self {
        Self {
            cfg,
            awake: false,
            static_run_active: false,
            static_start: 0.0,
            last_high_time: -1e9,
            dedupe_block_until: -1e9,
        }
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.cfg
    }

    /// Classify the current frame against the previous one at time
    /// `tsec` (seconds, monotone per tracker).
    pub fn update(
        &mut self,
        cur: &RawImage,
        prev: Option<&RawImage>,
        tsec: f64,
    ) -> ActivityDecision {
        let mut d = ActivityDecision::default();

        let Some(prev) = prev.filter(|p| p.ok() && cur.ok()) else {
            // No usable baseline: treat as static and restart the streak.
            d.is_static = true;
            self.start_static(tsec, true);
            self.finish(&mut d, tsec);
            return d;
        };

        d.diff_ratio = sampled_diff_ratio(
            cur,
            prev,
            self.cfg.sample_stride,
            self.cfg.channel_threshold,
        );

        let is_static = d.diff_ratio <= self.cfg.static_threshold;
        let is_high = d.diff_ratio >= self.cfg.wake_threshold;
        let is_mid = !is_static && !is_high;

        if is_static {
            self.start_static(tsec, false);
            if self.awake
                && (tsec - self.static_start) >= self.cfg.static_reset_sec
                && (tsec - self.last_high_time) >= self.cfg.dedupe_pause_sec
            {
                self.awake = false;
            }
        } else if !(is_mid && self.cfg.freeze_static_on_mid) {
            self.static_run_active = false;
        }

        if is_high {
            self.awake = true;
            self.last_high_time = tsec;
            self.dedupe_block_until = tsec + self.cfg.dedupe_pause_sec;
        } else if is_mid {
            self.awake = true;
        }

        d.is_static = is_static;
        d.is_mid_band = is_mid;
        self.finish(&mut d, tsec);
        d
    }

    fn start_static(&mut self, tsec: f64, force: bool) {
        if !self.static_run_active || force {
            self.static_run_active = true;
            self.static_start = tsec;
        }
    }

    fn finish(&self, d: &mut ActivityDecision, tsec: f64) {
        d.is_awake = self.awake;
        d.allow_dedupe = tsec >= self.dedupe_block_until;
        d.dedupe_block = !d.allow_dedupe;
        d.t_in_static = if d.is_static {
            tsec - self.static_start
        } else {
            0.0
        };
        d.t_since_high = tsec - self.last_high_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureResult;

    fn cfg() -> ActivityConfig {
        ActivityConfig {
            static_threshold: 0.03,
            wake_threshold: 0.05,
            dedupe_pause_sec: 2.0,
            static_reset_sec: 1.0,
            sample_stride: 1,
            channel_threshold: 4,
            freeze_static_on_mid: false,
        }
    }

    fn noisy_copy(base: &RawImage, changed_pixels: usize) -> RawImage {
        let mut out = base.clone();
        for p in 0..changed_pixels {
            out.as_mut_bgra_bytes()[p * 4] ^= 0x7F;
        }
        out
    }

    #[test]
    fn diff_ratio_counts_changed_samples() -> CaptureResult<()> {
        let base = RawImage::solid(10, 10, 100, 100, 100)?;
        let changed = noisy_copy(&base, 25);
        let ratio = sampled_diff_ratio(&changed, &base, 1, 4);
        assert!((ratio - 0.25).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn dimension_mismatch_is_fully_changed() -> CaptureResult<()> {
        let a = RawImage::solid(4, 4, 0, 0, 0)?;
        let b = RawImage::solid(8, 2, 0, 0, 0)?;
        assert_eq!(sampled_diff_ratio(&a, &b, 1, 4), 1.0);
        Ok(())
    }

    #[test]
    fn high_activity_opens_block_window() -> CaptureResult<()> {
        let base = RawImage::solid(10, 10, 0, 0, 0)?;
        let busy = noisy_copy(&base, 50);
        let mut tracker = SceneActivityTracker::new(cfg());

        let d = tracker.update(&busy, Some(&base), 1.0);
        assert!(d.is_awake);
        assert!(d.dedupe_block);
        assert!(!d.allow_dedupe);

        // Still blocked inside the pause window despite a static frame.
        let d = tracker.update(&base, Some(&base), 2.0);
        assert!(d.is_static);
        assert!(d.dedupe_block);

        // After the window closes, dedupe is allowed again.
        let d = tracker.update(&base, Some(&base), 3.5);
        assert!(d.allow_dedupe);
        Ok(())
    }

    #[test]
    fn awake_latch_clears_after_sustained_static() -> CaptureResult<()> {
        let base = RawImage::solid(10, 10, 0, 0, 0)?;
        let busy = noisy_copy(&base, 50);
        let mut tracker = SceneActivityTracker::new(cfg());

        tracker.update(&busy, Some(&base), 0.0);
        // Static run starts at t=1; needs 1s of static AND 2s since high.
        let d = tracker.update(&base, Some(&base), 1.0);
        assert!(d.is_awake);
        let d = tracker.update(&base, Some(&base), 1.9);
        assert!(d.is_awake);
        let d = tracker.update(&base, Some(&base), 2.5);
        assert!(!d.is_awake);
        Ok(())
    }

    #[test]
    fn mid_band_wakes_without_extending_block() -> CaptureResult<()> {
        let base = RawImage::solid(10, 10, 0, 0, 0)?;
        // 4 of 100 samples changed: ratio 0.04, between the bands.
        let mid = noisy_copy(&base, 4);
        let mut tracker = SceneActivityTracker::new(cfg());

        let d = tracker.update(&mid, Some(&base), 1.0);
        assert!(d.is_mid_band);
        assert!(d.is_awake);
        assert!(d.allow_dedupe);
        Ok(())
    }

    #[test]
    fn frozen_streak_survives_mid_band() -> CaptureResult<()> {
        let mut config = cfg();
        config.freeze_static_on_mid = true;
        let base = RawImage::solid(10, 10, 0, 0, 0)?;
        let mid = noisy_copy(&base, 4);
        let mut tracker = SceneActivityTracker::new(config);

        tracker.update(&base, Some(&base), 0.0);
        tracker.update(&mid, Some(&base), 0.5);
        let d = tracker.update(&base, Some(&base), 1.2);
        // Streak origin is still t=0, not t=1.2.
        assert!(d.t_in_static > 1.0);
        Ok(())
    }

    #[test]
    fn first_frame_is_static_and_asleep() -> CaptureResult<()> {
        let base = RawImage::solid(4, 4, 0, 0, 0)?;
        let mut tracker = SceneActivityTracker::new(cfg());
        let d = tracker.update(&base, None, 0.0);
        assert!(d.is_static);
        assert!(!d.is_awake);
        assert!(d.allow_dedupe);
        Ok(())
    }
}
