use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use drift_capture::{
    ActivityConfig, CaptureOrchestrator, FrameFilters, FramePoolConfig, GateConfig, NullViewer,
    PipelineStats, StatsSink,
};

/// Deduplicating display capture with coalescing history.
#[derive(Debug, Parser)]
#[command(name = "drift-capture", version)]
struct Cli {
    /// Capture display N.
    #[arg(long, value_name = "N")]
    capture: Option<u32>,

    /// Show a live preview window.
    #[arg(long)]
    live: bool,

    /// Target tick rate.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Capture duration in seconds; 0 or less takes a single snapshot.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    seconds: i32,

    /// Resize each captured frame, e.g. 1280x720.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Write non-duplicate frames as BASE_000000.bmp, BASE_000001.bmp, ...
    #[arg(long, value_name = "BASE")]
    record: Option<PathBuf>,

    /// Skip the preflight stability wait.
    #[arg(long)]
    no_static_gate: bool,

    /// Required stable seconds for the gate.
    #[arg(long, default_value_t = 1.0)]
    static_sec: f64,

    /// Gate timeout in seconds.
    #[arg(long, default_value_t = 10.0)]
    static_timeout: f64,

    /// Gate compares signatures only, skipping the byte compare.
    #[arg(long)]
    static_tolerant: bool,

    /// Apply a persistent BT.601 grayscale correction.
    #[arg(long)]
    grayscale: bool,

    /// Gamma correction.
    #[arg(long, value_name = "G")]
    gamma: Option<f64>,

    /// Additive brightness in [-1, 1].
    #[arg(long, value_name = "B", allow_negative_numbers = true)]
    brightness: Option<f64>,

    /// Multiplicative contrast (>= 0) around mid-gray.
    #[arg(long, value_name = "C")]
    contrast: Option<f64>,

    /// Box-pixelate with the given block size (>= 2).
    #[arg(long, value_name = "N")]
    pixelate: Option<u32>,

    /// Disable activity-tracker dedupe gating.
    #[arg(long)]
    no_adaptive: bool,

    /// Write JSONL metrics to this file.
    #[arg(long, value_name = "PATH")]
    metrics: Option<PathBuf>,

    /// Diff ratio at or below which a scene counts as static.
    #[arg(long, default_value_t = 0.03)]
    static_thr: f64,

    /// Diff ratio at or above which a scene counts as high activity.
    #[arg(long, default_value_t = 0.05)]
    wake_thr: f64,

    /// Seconds of forced full recording after high activity.
    #[arg(long, default_value_t = 15.0)]
    dedupe_pause: f64,

    /// Continuous static seconds before the awake latch clears.
    #[arg(long, default_value_t = 15.0)]
    static_reset: f64,

    /// Pixel sampling stride for the activity diff.
    #[arg(long, default_value_t = 4)]
    sample_stride: u32,

    /// Per-channel delta threshold for the activity diff.
    #[arg(long, default_value_t = 4)]
    channel_thr: u8,
}

fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{raw}'"))?;
    let w: u32 = w.parse().map_err(|_| format!("invalid width '{w}'"))?;
    let h: u32 = h.parse().map_err(|_| format!("invalid height '{h}'"))?;
    if w == 0 || h == 0 {
        return Err("resize dimensions must be > 0".into());
    }
    Ok((w, h))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let Some(display_index) = cli.capture else {
        println!("Use --capture N (see --help).");
        return ExitCode::SUCCESS;
    };

    if let Some(b) = cli.brightness {
        if !(-1.0..=1.0).contains(&b) {
            eprintln!("--brightness must be in [-1, 1]");
            return ExitCode::from(1);
        }
    }
    if let Some(c) = cli.contrast {
        if c < 0.0 {
            eprintln!("--contrast must be >= 0");
            return ExitCode::from(1);
        }
    }
    if let Some(p) = cli.pixelate {
        if p < 2 {
            eprintln!("--pixelate must be >= 2");
            return ExitCode::from(1);
        }
    }

    let backend = match drift_capture::default_backend() {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    let filters = FrameFilters {
        grayscale: cli.grayscale,
        brightness: cli.brightness.unwrap_or(0.0),
        contrast: cli.contrast.unwrap_or(1.0),
        gamma: cli.gamma.unwrap_or(1.0),
        pixelate: cli.pixelate.unwrap_or(0),
    };

    let gate = (!cli.no_static_gate).then_some(GateConfig {
        fps_hint: cli.fps,
        required_static_sec: cli.static_sec,
        timeout_sec: cli.static_timeout,
        resize: cli.resize,
        tolerant: cli.static_tolerant,
    });

    let adaptive = (!cli.no_adaptive).then_some(ActivityConfig {
        static_threshold: cli.static_thr,
        wake_threshold: cli.wake_thr,
        dedupe_pause_sec: cli.dedupe_pause,
        static_reset_sec: cli.static_reset,
        sample_stride: cli.sample_stride,
        channel_threshold: cli.channel_thr,
        freeze_static_on_mid: false,
    });

    let stats = Arc::new(PipelineStats::new());
    let mut builder = CaptureOrchestrator::builder(backend, display_index)
        .fps(cli.fps)
        .seconds(cli.seconds)
        .static_gate(gate)
        .adaptive(adaptive)
        .filters(filters)
        .pool_config(FramePoolConfig::default())
        .stats(Arc::clone(&stats) as Arc<dyn StatsSink>);

    if let Some((w, h)) = cli.resize {
        builder = builder.resize(w, h);
    }
    if let Some(base) = cli.record {
        builder = builder.record_to(base);
    }
    if let Some(path) = cli.metrics {
        builder = builder.metrics_path(path);
    }
    if cli.live {
        // Preview rendering is platform territory; without a platform
        // viewer the flag degrades to a no-op sink.
        warn!("--live has no platform viewer in this build");
        builder = builder.viewer(Box::new(NullViewer));
    }

    match builder.build().run() {
        Ok(summary) => {
            println!("Capture complete. {summary}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("capture failed: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
