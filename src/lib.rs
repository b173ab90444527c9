pub mod activity;
pub mod capture;
pub mod corrections;
pub(crate) mod env_config;
pub mod error;
pub mod gate;
pub mod guard;
pub mod image;
pub mod ops;
pub mod orchestrator;
pub mod pool;
pub mod render;
pub mod ring;
pub mod signature;
pub mod sinks;
pub mod stats;
mod timing;

pub use activity::{ActivityConfig, ActivityDecision, SceneActivityTracker};
pub use capture::{
    default_backend, display_by_index, enumerate_displays, CaptureBackend, CaptureSession,
    DisplayInfo, FrameSource,
};
pub use corrections::CorrectionQueue;
pub use error::{CaptureError, CaptureErrorClass, CaptureResult};
pub use gate::{wait_for_static_scene, GateConfig, GateReport};
pub use image::RawImage;
pub use ops::{resize_bilinear, FrameFilters};
pub use orchestrator::{
    CaptureOrchestrator, CaptureOrchestratorBuilder, CaptureSummary, OrchestratorConfig,
    NullViewer, Viewer,
};
pub use pool::{FramePool, FramePoolConfig, PooledFrame, PushOutcome};
pub use render::{EngineConfig, RenderResult, StaticFrameEngine};
pub use signature::{frames_identical, signature_equal, FrameSignature};
pub use stats::{PipelineStats, StatsEvent, StatsSink, StatsSnapshot};

use std::sync::Arc;

/// Capture a single frame from a display using the default backend.
pub fn capture_once(display_index: u32) -> CaptureResult<Option<RawImage>> {
    let backend: Arc<dyn CaptureBackend> = default_backend()?;
    let mut session = CaptureSession::new(backend);
    session.capture_display(display_index)
}
