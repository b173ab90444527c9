//! Capture boundary: backends, displays, and the session-level source
//! cache.
//!
//! The OS screen-grab primitive is deliberately outside this crate; the
//! pipeline consumes anything implementing [`CaptureBackend`]. The
//! backends that ship here are fixtures (scripted frame sequences and a
//! synthetic spectrum gradient) used by tests, demos, and smoke runs.

use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::env_config;
use crate::error::{CaptureError, CaptureResult};
use crate::image::RawImage;
use crate::render::spectrum_gradient_image;

/// One attached display as reported by a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayInfo {
    pub id: u32,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub primary: bool,
}

impl std::fmt::Display for DisplayInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

/// Produces frames for one display. A `None` capture is a transient
/// failure; the caller skips the tick and tries again.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Option<RawImage>;
}

pub trait CaptureBackend: Send + Sync {
    fn enumerate_displays(&self) -> CaptureResult<Vec<DisplayInfo>>;

    fn primary_display(&self) -> CaptureResult<DisplayInfo> {
        self.enumerate_displays()?
            .into_iter()
            .find(|d| d.primary)
            .ok_or(CaptureError::NoPrimaryDisplay)
    }

    fn display_by_index(&self, index: u32) -> CaptureResult<DisplayInfo> {
        self.enumerate_displays()?
            .into_iter()
            .find(|d| d.id == index)
            .ok_or(CaptureError::DisplayNotFound(index))
    }

    fn create_source(&self, display: &DisplayInfo) -> CaptureResult<Box<dyn FrameSource>>;
}

/// Caches one [`FrameSource`] per display so repeated captures of the
/// same target skip source construction.
pub struct CaptureSession {
    backend: Arc<dyn CaptureBackend>,
    sources: FxHashMap<u32, Box<dyn FrameSource>>,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            sources: FxHashMap::default(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CaptureBackend> {
        &self.backend
    }

    pub fn display_by_index(&self, index: u32) -> CaptureResult<DisplayInfo> {
        self.backend.display_by_index(index)
    }

    /// Capture one frame from the given display. `Ok(None)` is a
    /// transient capture failure; `Err` means the display itself could
    /// not be resolved or opened.
    pub fn capture_display(&mut self, index: u32) -> CaptureResult<Option<RawImage>> {
        if !self.sources.contains_key(&index) {
            let display = self.backend.display_by_index(index)?;
            let source = self.backend.create_source(&display)?;
            self.sources.insert(index, source);
        }
        let frame = self
            .sources
            .get_mut(&index)
            .expect("source inserted above")
            .capture();
        Ok(frame.filter(RawImage::ok))
    }

    /// Drop the cached source for a display, forcing recreation on the
    /// next capture.
    pub fn reset_source(&mut self, index: u32) {
        self.sources.remove(&index);
    }
}

/// The default backend for this build: the gradient fixture when
/// `DRIFT_CAPTURE_FIXTURE` is set, otherwise unavailable (the real OS
/// grab lives outside this crate).
pub fn default_backend() -> CaptureResult<Arc<dyn CaptureBackend>> {
    if env_config::force_fixture_backend() {
        return Ok(Arc::new(GradientBackend::new(1280, 720)));
    }
    Err(CaptureError::BackendUnavailable(
        "no platform capture backend in this build (set DRIFT_CAPTURE_FIXTURE=1 for the synthetic source)".into(),
    ))
}

pub fn enumerate_displays() -> CaptureResult<Vec<DisplayInfo>> {
    default_backend()?.enumerate_displays()
}

pub fn display_by_index(index: u32) -> CaptureResult<DisplayInfo> {
    default_backend()?.display_by_index(index)
}

// ---------------------------------------------------------------------------
// Fixture backends
// ---------------------------------------------------------------------------

/// Scripted backend: replays a fixed sequence of frames on display 1,
/// repeating the final frame once the script is exhausted. `None`
/// entries simulate transient capture failures.
pub struct SequenceBackend {
    script: Arc<Mutex<SequenceScript>>,
    width: u32,
    height: u32,
}

struct SequenceScript {
    frames: Vec<Option<RawImage>>,
    cursor: usize,
}

impl SequenceBackend {
    pub fn new(frames: Vec<Option<RawImage>>) -> Self {
        let (width, height) = frames
            .iter()
            .flatten()
            .next()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0));
        Self {
            script: Arc::new(Mutex::new(SequenceScript { frames, cursor: 0 })),
            width,
            height,
        }
    }

    pub fn repeating(frame: RawImage) -> Self {
        Self::new(vec![Some(frame)])
    }
}

impl CaptureBackend for SequenceBackend {
    fn enumerate_displays(&self) -> CaptureResult<Vec<DisplayInfo>> {
        Ok(vec![DisplayInfo {
            id: 1,
            name: "fixture".into(),
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
            primary: true,
        }])
    }

    fn create_source(&self, _display: &DisplayInfo) -> CaptureResult<Box<dyn FrameSource>> {
        Ok(Box::new(SequenceSource {
            script: Arc::clone(&self.script),
        }))
    }
}

struct SequenceSource {
    script: Arc<Mutex<SequenceScript>>,
}

impl FrameSource for SequenceSource {
    fn capture(&mut self) -> Option<RawImage> {
        let mut script = self.script.lock().unwrap();
        if script.frames.is_empty() {
            return None;
        }
        let idx = script.cursor.min(script.frames.len() - 1);
        if script.cursor < script.frames.len() {
            script.cursor += 1;
        }
        script.frames[idx].clone()
    }
}

/// Synthetic backend rendering the visible-spectrum gradient at a fixed
/// resolution. Every capture returns the same image, which makes it a
/// convenient static-scene source for gate and dedupe smoke runs.
pub struct GradientBackend {
    width: u32,
    height: u32,
}

impl GradientBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl CaptureBackend for GradientBackend {
    fn enumerate_displays(&self) -> CaptureResult<Vec<DisplayInfo>> {
        Ok(vec![DisplayInfo {
            id: 1,
            name: "spectrum-gradient".into(),
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
            primary: true,
        }])
    }

    fn create_source(&self, display: &DisplayInfo) -> CaptureResult<Box<dyn FrameSource>> {
        let frame = spectrum_gradient_image(display.width, display.height)?;
        Ok(Box::new(GradientSource { frame }))
    }
}

struct GradientSource {
    frame: RawImage,
}

impl FrameSource for GradientSource {
    fn capture(&mut self) -> Option<RawImage> {
        Some(self.frame.clone())
    }
}
