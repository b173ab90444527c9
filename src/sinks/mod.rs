//! Output sinks: BMP frame files, FFmpeg concat manifests, and JSONL
//! metrics.

mod bmp;
mod manifest;
mod metrics;

pub use bmp::{numbered_path, write_bmp32, BmpDirSink, BmpRecorder};
pub use manifest::{write_concat_manifest, ManifestEntry};
pub use metrics::{AggregateRecord, FrameRecord, MetricsLogger};

use crate::error::CaptureResult;
use crate::image::RawImage;

/// Receives expanded frames from a pool export. Implementations decide
/// the encoding and the destination; `index` is the position in the
/// expanded (real-time) sequence.
pub trait FrameSink {
    fn write_frame(&mut self, image: &RawImage, index: u64) -> CaptureResult<()>;
}
