use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::{CaptureError, CaptureResult};

/// Per-frame metrics record. All numbers are finite; boolean facts are
/// encoded as 0/1 so downstream tooling can aggregate without schema
/// gymnastics.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct FrameRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Wall-clock seconds since the logger was opened.
    pub t: f64,
    pub frame_index: u64,
    /// Capture-relative timestamp of the frame.
    pub tsec: f64,
    pub unique: u8,
    pub dup_skipped_total: u64,
    pub pool_frames: u64,
    pub rss_mb: f64,
    pub diff_ratio: f64,
    pub dedupe_block: u8,
}

impl FrameRecord {
    pub fn new(frame_index: u64, tsec: f64) -> Self {
        Self {
            kind: "frame",
            t: 0.0,
            frame_index,
            tsec,
            unique: 0,
            dup_skipped_total: 0,
            pool_frames: 0,
            rss_mb: 0.0,
            diff_ratio: 0.0,
            dedupe_block: 0,
        }
    }
}

/// Aggregate metrics record, emitted at a cadence of at least one
/// second.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AggregateRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub t: f64,
    pub frames_captured: u64,
    pub frames_unique: u64,
    pub dup_skipped_total: u64,
    pub effective_fps: f64,
    pub pool_frames: u64,
    pub pool_bytes: u64,
    pub rss_mb: f64,
}

impl AggregateRecord {
    pub fn new() -> Self {
        Self {
            kind: "aggregate",
            t: 0.0,
            frames_captured: 0,
            frames_unique: 0,
            dup_skipped_total: 0,
            effective_fps: 0.0,
            pool_frames: 0,
            pool_bytes: 0,
            rss_mb: 0.0,
        }
    }
}

impl Default for AggregateRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Line-per-record JSON metrics stream.
pub struct MetricsLogger {
    writer: Mutex<BufWriter<std::fs::File>>,
    opened: Instant,
    last_aggregate: Mutex<Option<Instant>>,
    aggregate_interval: Duration,
}

impl MetricsLogger {
    pub fn create(path: &Path) -> CaptureResult<Self> {
        let file = std::fs::File::create(path)
            .map_err(|e| CaptureError::SinkWrite(format!("{}: {e}", path.display())))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            opened: Instant::now(),
            last_aggregate: Mutex::new(None),
            aggregate_interval: Duration::from_secs(1),
        })
    }

    pub fn wall_seconds(&self) -> f64 {
        self.opened.elapsed().as_secs_f64()
    }

    pub fn log_frame(&self, mut record: FrameRecord) -> CaptureResult<()> {
        record.t = self.wall_seconds();
        record.rss_mb = finite_or_zero(record.rss_mb);
        record.diff_ratio = finite_or_zero(record.diff_ratio);
        self.write_line(&record)
    }

    /// Emit an aggregate record if at least the cadence interval has
    /// passed since the previous one. Returns whether it was written.
    pub fn log_aggregate_throttled(&self, mut record: AggregateRecord) -> CaptureResult<bool> {
        {
            let mut last = self.last_aggregate.lock().unwrap();
            let now = Instant::now();
            if last.is_some_and(|prev| now.duration_since(prev) < self.aggregate_interval) {
                return Ok(false);
            }
            *last = Some(now);
        }
        record.t = self.wall_seconds();
        record.effective_fps = finite_or_zero(record.effective_fps);
        record.rss_mb = finite_or_zero(record.rss_mb);
        self.write_line(&record)?;
        Ok(true)
    }

    pub fn flush(&self) -> CaptureResult<()> {
        self.writer
            .lock()
            .unwrap()
            .flush()
            .map_err(|e| CaptureError::SinkWrite(format!("metrics flush: {e}")))
    }

    fn write_line<T: Serialize>(&self, record: &T) -> CaptureResult<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| CaptureError::SinkWrite(format!("metrics serialization: {e}")))?;
        let mut writer = self.writer.lock().unwrap();
        writeln!(writer, "{json}").map_err(|e| CaptureError::SinkWrite(format!("metrics: {e}")))
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_records_are_one_json_object_per_line() -> CaptureResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("metrics.jsonl");
        let logger = MetricsLogger::create(&path)?;

        let mut record = FrameRecord::new(3, 0.1);
        record.unique = 1;
        record.pool_frames = 2;
        logger.log_frame(record)?;
        logger.log_frame(FrameRecord::new(4, 0.133))?;
        logger.flush()?;

        let text = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("valid JSON");
        assert_eq!(parsed["type"], "frame");
        assert_eq!(parsed["frame_index"], 3);
        assert_eq!(parsed["unique"], 1);
        assert_eq!(parsed["pool_frames"], 2);
        Ok(())
    }

    #[test]
    fn aggregate_cadence_is_throttled() -> CaptureResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("metrics.jsonl");
        let logger = MetricsLogger::create(&path)?;

        assert!(logger.log_aggregate_throttled(AggregateRecord::new())?);
        // Immediately after, the cadence gate holds it back.
        assert!(!logger.log_aggregate_throttled(AggregateRecord::new())?);
        logger.flush()?;

        let text = std::fs::read_to_string(&path)?;
        assert_eq!(text.lines().count(), 1);
        let parsed: serde_json::Value =
            serde_json::from_str(text.lines().next().unwrap()).expect("valid JSON");
        assert_eq!(parsed["type"], "aggregate");
        Ok(())
    }

    #[test]
    fn non_finite_values_are_sanitized() -> CaptureResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("metrics.jsonl");
        let logger = MetricsLogger::create(&path)?;

        let mut record = FrameRecord::new(0, 0.0);
        record.diff_ratio = f64::NAN;
        logger.log_frame(record)?;
        logger.flush()?;

        let text = std::fs::read_to_string(&path)?;
        let parsed: serde_json::Value = serde_json::from_str(text.trim()).expect("valid JSON");
        assert_eq!(parsed["diff_ratio"], 0.0);
        Ok(())
    }
}
