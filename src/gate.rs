//! Preflight stability gate.
//!
//! Before a recording session starts, the gate watches the target
//! display at the capture rate until it has seen enough consecutive
//! identical frames to call the scene static, or until the timeout
//! fires. A streak that satisfies the requirement exactly when the
//! timeout fires still passes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::activity::sampled_diff_ratio;
use crate::capture::CaptureSession;
use crate::error::CaptureResult;
use crate::image::RawImage;
use crate::ops::resize_bilinear;
use crate::signature::{frames_identical, signature_equal, FrameSignature};
use crate::timing::sleep_until;

#[derive(Clone, Copy, Debug)]
pub struct GateConfig {
    pub fps_hint: u32,
    /// Consecutive identical seconds required to pass.
    pub required_static_sec: f64,
    pub timeout_sec: f64,
    /// Downscale each sample before comparison.
    pub resize: Option<(u32, u32)>,
    /// Accept signature equality without the byte compare.
    pub tolerant: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            fps_hint: 30,
            required_static_sec: 1.0,
            timeout_sec: 10.0,
            resize: None,
            tolerant: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GateReport {
    pub ok: bool,
    pub stable_seconds: f64,
    pub frames_observed: u32,
    pub identical_streak: u32,
    /// Diff ratio of the last pair of frames compared.
    pub last_diff_ratio: f64,
    pub signature: Option<FrameSignature>,
    pub frame: Option<Arc<RawImage>>,
    pub message: String,
}

/// Block until the display is static for the required span or the
/// timeout elapses. `Err` only for display resolution failures; a
/// timed-out gate comes back as `ok == false`.
pub fn wait_for_static_scene(
    session: &mut CaptureSession,
    display_index: u32,
    cfg: &GateConfig,
) -> CaptureResult<GateReport> {
    let fps = cfg.fps_hint.max(1);
    let interval = Duration::from_secs_f64(1.0 / f64::from(fps));
    let needed = ((cfg.required_static_sec * f64::from(fps)).ceil() as u32).max(1);

    // Resolve up front so a bad display index fails before the wait.
    session.display_by_index(display_index)?;

    let started = Instant::now();
    let mut next_tick = started;

    let mut prev: Option<(Arc<RawImage>, FrameSignature)> = None;
    let mut streak = 0u32;
    let mut frames_observed = 0u32;
    let mut last_diff_ratio = 1.0;

    loop {
        let elapsed = started.elapsed().as_secs_f64();
        if elapsed >= cfg.timeout_sec {
            let ok = streak >= needed;
            let (frame, signature) = match (&prev, ok) {
                (Some((img, sig)), true) => (Some(Arc::clone(img)), Some(*sig)),
                _ => (None, None),
            };
            return Ok(GateReport {
                ok,
                stable_seconds: f64::from(streak) / f64::from(fps),
                frames_observed,
                identical_streak: streak,
                last_diff_ratio,
                signature,
                frame,
                message: if ok {
                    "stable at timeout boundary".into()
                } else {
                    "timeout: scene did not become static".into()
                },
            });
        }

        let Some(raw) = session.capture_display(display_index)? else {
            sleep_until(next_tick + interval);
            next_tick += interval;
            continue;
        };

        let working = match cfg.resize {
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
        let current = Arc::new(working);
        let sig = FrameSignature::of(&current);

        let identical = match &prev {
            Some((prev_img, prev_sig)) => {
                last_diff_ratio = sampled_diff_ratio(&current, prev_img, 4, 4);
                if cfg.tolerant {
                    signature_equal(prev_sig, &sig)
                } else {
                    frames_identical(&current, prev_img, &sig, prev_sig)
                }
            }
            None => false,
        };
        streak = if identical { streak + 1 } else { 1 };
        frames_observed += 1;
        prev = Some((Arc::clone(&current), sig));

        if streak >= needed {
            debug!(streak, frames_observed, "static scene confirmed");
            return Ok(GateReport {
                ok: true,
                stable_seconds: f64::from(streak) / f64::from(fps),
                frames_observed,
                identical_streak: streak,
                last_diff_ratio,
                signature: Some(sig),
                frame: Some(current),
                message: "static scene confirmed".into(),
            });
        }

        next_tick += interval;
        sleep_until(next_tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureBackend, SequenceBackend};
    use crate::error::CaptureError;

    fn session_of(backend: SequenceBackend) -> CaptureSession {
        CaptureSession::new(Arc::new(backend) as Arc<dyn CaptureBackend>)
    }

    fn fast_cfg(required: f64, timeout: f64) -> GateConfig {
        GateConfig {
            fps_hint: 200,
            required_static_sec: required,
            timeout_sec: timeout,
            resize: None,
            tolerant: false,
        }
    }

    #[test]
    fn static_scene_passes() -> CaptureResult<()> {
        let img = RawImage::solid(8, 8, 3, 3, 3)?;
        let mut session = session_of(SequenceBackend::repeating(img));
        let report = wait_for_static_scene(&mut session, 1, &fast_cfg(0.05, 5.0))?;
        assert!(report.ok);
        assert!(report.stable_seconds >= 0.05);
        assert!(report.frame.is_some());
        assert!(report.signature.is_some());
        Ok(())
    }

    #[test]
    fn changing_scene_times_out() -> CaptureResult<()> {
        // Alternate two frames forever via a long script.
        let a = RawImage::solid(8, 8, 1, 1, 1)?;
        let b = RawImage::solid(8, 8, 200, 200, 200)?;
        let script: Vec<Option<RawImage>> = (0..4000)
            .map(|i| Some(if i % 2 == 0 { a.clone() } else { b.clone() }))
            .collect();
        let mut session = session_of(SequenceBackend::new(script));
        let report = wait_for_static_scene(&mut session, 1, &fast_cfg(0.5, 0.2))?;
        assert!(!report.ok);
        assert!(report.last_diff_ratio > 0.5);
        assert!(report.message.contains("timeout"));
        Ok(())
    }

    #[test]
    fn requirement_beyond_timeout_always_fails() -> CaptureResult<()> {
        let img = RawImage::solid(8, 8, 3, 3, 3)?;
        let mut session = session_of(SequenceBackend::repeating(img));
        let report = wait_for_static_scene(&mut session, 1, &fast_cfg(2.0, 0.1))?;
        assert!(!report.ok);
        Ok(())
    }

    #[test]
    fn unknown_display_fails_before_waiting() -> CaptureResult<()> {
        let img = RawImage::solid(8, 8, 3, 3, 3)?;
        let mut session = session_of(SequenceBackend::repeating(img));
        match wait_for_static_scene(&mut session, 9, &fast_cfg(0.05, 5.0)) {
            Err(CaptureError::DisplayNotFound(9)) => Ok(()),
            other => panic!("expected DisplayNotFound, got {other:?}"),
        }
    }

    #[test]
    fn resized_comparison_still_passes() -> CaptureResult<()> {
        let img = RawImage::solid(32, 32, 5, 6, 7)?;
        let mut session = session_of(SequenceBackend::repeating(img));
        let cfg = GateConfig {
            resize: Some((8, 8)),
            ..fast_cfg(0.05, 5.0)
        };
        let report = wait_for_static_scene(&mut session, 1, &cfg)?;
        assert!(report.ok);
        assert_eq!(
            report.frame.map(|f| f.dimensions()),
            Some((8, 8)),
            "gate compares the resized frames"
        );
        Ok(())
    }
}
