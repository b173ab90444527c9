use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::image::RawImage;

/// A persistent transform runs on every frame; a one-shot runs once on
/// the next frame and is then discarded.
pub type PersistentFn = Arc<dyn Fn(&mut RawImage) + Send + Sync>;
pub type OneShotFn = Box<dyn FnOnce(&mut RawImage) + Send>;

/// Ordered, thread-safe queue of in-place frame transforms.
///
/// Any thread may enqueue; the capture loop applies. The `dirty` flag
/// lets the per-tick fast path skip the mutex entirely while both lists
/// are empty, which is the steady state for most sessions.
#[derive(Default)]
pub struct CorrectionQueue {
    inner: Mutex<Inner>,
    dirty: AtomicBool,
}

#[derive(Default)]
struct Inner {
    persistent: Vec<PersistentFn>,
    oneshot: Vec<OneShotFn>,
}

impl CorrectionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_persistent<F>(&self, f: F)
    where
        F: Fn(&mut RawImage) + Send + Sync + 'static,
    {
        self.inner.lock().unwrap().persistent.push(Arc::new(f));
        self.dirty.store(true, Ordering::Release);
    }

    pub fn enqueue_oneshot<F>(&self, f: F)
    where
        F: FnOnce(&mut RawImage) + Send + 'static,
    {
        self.inner.lock().unwrap().oneshot.push(Box::new(f));
        self.dirty.store(true, Ordering::Release);
    }

    /// Apply all queued corrections in registration order (persistent
    /// first, then drained one-shots). Returns whether any ran.
    pub fn apply_all(&self, img: &mut RawImage) -> bool {
        if !self.dirty.load(Ordering::Acquire) {
            return false;
        }

        let (persistent, oneshot) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.persistent.is_empty() && inner.oneshot.is_empty() {
                self.dirty.store(false, Ordering::Release);
                return false;
            }
            let persistent: Vec<PersistentFn> = inner.persistent.clone();
            let oneshot = std::mem::take(&mut inner.oneshot);
            // Persistent transforms keep the queue hot; one-shots alone
            // leave it clean after this drain.
            self.dirty
                .store(!inner.persistent.is_empty(), Ordering::Release);
            (persistent, oneshot)
        };

        let mut ran = false;
        for f in &persistent {
            f(img);
            ran = true;
        }
        for f in oneshot {
            f(img);
            ran = true;
        }
        ran
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.persistent.clear();
        inner.oneshot.clear();
        self.dirty.store(false, Ordering::Release);
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.persistent.is_empty() && inner.oneshot.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureResult;

    #[test]
    fn empty_queue_is_identity_and_returns_false() -> CaptureResult<()> {
        let queue = CorrectionQueue::new();
        let original = RawImage::solid(4, 4, 9, 9, 9)?;
        let mut img = original.clone();
        assert!(!queue.apply_all(&mut img));
        assert!(img.bytes_equal(&original));
        Ok(())
    }

    #[test]
    fn oneshot_runs_exactly_once() -> CaptureResult<()> {
        let queue = CorrectionQueue::new();
        queue.enqueue_oneshot(|img: &mut RawImage| {
            img.as_mut_bgra_bytes()[0] = 0xAA;
        });
        let mut img = RawImage::solid(4, 4, 0, 0, 0)?;
        assert!(queue.apply_all(&mut img));
        assert_eq!(img.as_bgra_bytes()[0], 0xAA);

        let mut second = RawImage::solid(4, 4, 0, 0, 0)?;
        assert!(!queue.apply_all(&mut second));
        assert_eq!(second.as_bgra_bytes()[0], 0);
        Ok(())
    }

    #[test]
    fn persistent_runs_every_frame_in_order() -> CaptureResult<()> {
        let queue = CorrectionQueue::new();
        queue.enqueue_persistent(|img: &mut RawImage| {
            img.as_mut_bgra_bytes()[0] = img.as_bgra_bytes()[0].wrapping_add(1);
        });
        queue.enqueue_persistent(|img: &mut RawImage| {
            img.as_mut_bgra_bytes()[0] = img.as_bgra_bytes()[0].wrapping_mul(2);
        });
        let mut img = RawImage::solid(2, 2, 0, 0, 0)?;
        queue.apply_all(&mut img);
        // (0 + 1) * 2: registration order, not reverse.
        assert_eq!(img.as_bgra_bytes()[0], 2);
        queue.apply_all(&mut img);
        assert_eq!(img.as_bgra_bytes()[0], 6);
        Ok(())
    }

    #[test]
    fn clear_resets_everything() -> CaptureResult<()> {
        let queue = CorrectionQueue::new();
        queue.enqueue_persistent(|img: &mut RawImage| {
            img.as_mut_bgra_bytes()[0] = 1;
        });
        queue.clear();
        assert!(queue.is_empty());
        let mut img = RawImage::solid(2, 2, 0, 0, 0)?;
        assert!(!queue.apply_all(&mut img));
        Ok(())
    }
}
