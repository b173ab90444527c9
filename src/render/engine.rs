//! Tile-parallel synthetic frame renderer.
//!
//! Each call to [`StaticFrameEngine::render_next_frame`] supersamples
//! every tile of a visible-spectrum gradient, measures per-pixel
//! amplitude change against the previous frame, routes each tile
//! through the [`TileRouter`], and emits a per-tile dirty mask. Dirty
//! tiles have their accumulators cleared so a detected change cannot
//! bleed stale sharpening into the next frame. While the router is
//! calibrating, the engine also folds every frame's amplitudes into a
//! running baseline map.

use rand::Rng;
use rayon::prelude::*;

use crate::env_config;
use crate::image::RawImage;
use crate::render::accum::AccumCell;
use crate::render::router::{RouterConfig, TileRoute, TileRouter};
use crate::render::spectrum::{shade, GammaLut, SPECTRUM_RANGE_NM, VIOLET_MIN_NM};
use crate::render::tiler::{TileGrid, TileRect};

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    pub width: u32,
    pub height: u32,
    pub tile_w: u32,
    pub tile_h: u32,
    /// Subpixel samples per axis.
    pub spp_x: u32,
    pub spp_y: u32,
    /// Random subpixel offsets instead of pixel centers.
    pub jitter: bool,
    /// Sharpening clamp: maximum cumulative accumulator weight.
    pub weight_cap: f64,
    pub gamma: f64,
    pub router: RouterConfig,
    /// Tile worker threads; 0 selects `max(4, cores - 2)`.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            tile_w: 32,
            tile_h: 32,
            spp_x: 2,
            spp_y: 2,
            jitter: true,
            weight_cap: 4.0,
            gamma: 2.2,
            router: RouterConfig::default(),
            workers: 0,
        }
    }
}

/// Per-tile dirty bits, row-major like the tile grid.
#[derive(Clone, Debug)]
pub struct DirtyMask {
    bits: Vec<u64>,
    len: usize,
}

impl DirtyMask {
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, index: usize, dirty: bool) {
        let bit = 1u64 << (index % 64);
        if dirty {
            self.bits[index / 64] |= bit;
        } else {
            self.bits[index / 64] &= !bit;
        }
    }

    pub fn is_dirty(&self, index: usize) -> bool {
        index < self.len && self.bits[index / 64] & (1u64 << (index % 64)) != 0
    }

    pub fn dirty_count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Floating-point render target, channels in [0, 1].
#[derive(Clone, Debug)]
pub struct SpectrumFrame {
    width: u32,
    height: u32,
    pixels: Vec<[f32; 3]>,
}

impl SpectrumFrame {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[[f32; 3]] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Quantize to BGRA8 with full alpha. Gamma was applied during
    /// shading; this is a plain scale.
    pub fn to_raw_image(&self) -> RawImage {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for [r, g, b] in &self.pixels {
            bytes.push((f64::from(*b) * 255.0).round().clamp(0.0, 255.0) as u8);
            bytes.push((f64::from(*g) * 255.0).round().clamp(0.0, 255.0) as u8);
            bytes.push((f64::from(*r) * 255.0).round().clamp(0.0, 255.0) as u8);
            bytes.push(255);
        }
        RawImage::from_bgra8(self.width, self.height, bytes).unwrap_or_else(|_| RawImage::empty())
    }
}

pub struct RenderResult {
    pub frame: SpectrumFrame,
    pub dirty_mask: DirtyMask,
    pub calibration_complete: bool,
}

/// Running per-pixel amplitude baseline learned during calibration via
/// an incremental mean.
struct AmplitudeBaseline {
    tiles: Vec<Vec<f32>>,
    frames_accumulated: u32,
}

impl AmplitudeBaseline {
    fn for_grid(grid: &TileGrid) -> Self {
        Self {
            tiles: grid
                .tiles()
                .iter()
                .map(|t| vec![0.0; t.pixel_count()])
                .collect(),
            frames_accumulated: 0,
        }
    }

    fn merge(&mut self, amplitudes: &[Vec<f32>]) {
        let n = f64::from(self.frames_accumulated);
        for (baseline, amp) in self.tiles.iter_mut().zip(amplitudes) {
            for (b, a) in baseline.iter_mut().zip(amp) {
                *b = if self.frames_accumulated == 0 {
                    *a
                } else {
                    (f64::from(*b) * (n / (n + 1.0)) + f64::from(*a) / (n + 1.0)) as f32
                };
            }
        }
        self.frames_accumulated += 1;
    }
}

pub struct StaticFrameEngine {
    cfg: EngineConfig,
    grid: TileGrid,
    router: TileRouter,
    lut: GammaLut,
    tile_accums: Vec<Vec<AccumCell>>,
    prev_amp: Vec<Vec<f32>>,
    curr_amp: Vec<Vec<f32>>,
    baseline: AmplitudeBaseline,
    dirty: DirtyMask,
    pool: Option<rayon::ThreadPool>,
}

impl StaticFrameEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        let grid = TileGrid::new(cfg.width, cfg.height, cfg.tile_w, cfg.tile_h);
        let router = TileRouter::new(cfg.router, grid.tile_count());
        let workers = tile_workers(cfg.workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("drift-tile-{i}"))
            .build()
            .ok();

        let mut engine = Self {
            lut: GammaLut::new(cfg.gamma),
            tile_accums: Vec::new(),
            prev_amp: Vec::new(),
            curr_amp: Vec::new(),
            baseline: AmplitudeBaseline::for_grid(&grid),
            dirty: DirtyMask::new(grid.tile_count()),
            router,
            grid,
            cfg,
            pool,
        };
        engine.rebuild_buffers();
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn is_calibrated(&self) -> bool {
        self.router.is_calibrated()
    }

    /// Frames folded into the amplitude baseline so far.
    pub fn baseline_frames(&self) -> u32 {
        self.baseline.frames_accumulated
    }

    /// Resize the render target. Resets accumulators, amplitude history,
    /// the baseline, and the router's calibration window.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.cfg.width = width;
        self.cfg.height = height;
        self.grid = TileGrid::new(width, height, self.cfg.tile_w, self.cfg.tile_h);
        self.router.reset(self.grid.tile_count());
        self.baseline = AmplitudeBaseline::for_grid(&self.grid);
        self.dirty = DirtyMask::new(self.grid.tile_count());
        self.rebuild_buffers();
    }

    fn rebuild_buffers(&mut self) {
        self.tile_accums = self
            .grid
            .tiles()
            .iter()
            .map(|t| vec![AccumCell::default(); t.pixel_count()])
            .collect();
        self.prev_amp = self
            .grid
            .tiles()
            .iter()
            .map(|t| vec![0.0; t.pixel_count()])
            .collect();
        self.curr_amp = self.prev_amp.clone();
    }

    pub fn render_next_frame(&mut self) -> RenderResult {
        self.router.begin_frame();
        let eps = self.router.amplitude_epsilon();

        for amp in &mut self.curr_amp {
            amp.fill(0.0);
        }

        let cfg = self.cfg;
        let (frame_w, frame_h) = self.grid.frame_size();
        let tiles = self.grid.tiles();
        let lut = &self.lut;
        let prev = &self.prev_amp;
        let accums = &mut self.tile_accums;
        let curr = &mut self.curr_amp;

        // Each tile worker owns a disjoint accumulator and amplitude
        // segment; only the change counts flow back.
        let mut render = || {
            accums
                .par_iter_mut()
                .zip_eq(curr.par_iter_mut())
                .zip_eq(prev.par_iter())
                .zip_eq(tiles.par_iter())
                .map(|(((accum, curr), prev), tile)| {
                    process_tile(tile, accum, curr, prev, &cfg, frame_w, eps, lut)
                })
                .collect::<Vec<usize>>()
        };
        let changed_counts = match &self.pool {
            Some(pool) => pool.install(render),
            None => render(),
        };

        for (idx, changed) in changed_counts.iter().enumerate() {
            let total = tiles[idx].pixel_count();
            let percent = if total > 0 {
                100.0 * *changed as f64 / total as f64
            } else {
                100.0
            };
            self.router.update_tile_change(idx, percent);
            self.dirty
                .set(idx, self.router.decide(idx) == TileRoute::Offload);
        }

        let mut pixels = vec![[0f32; 3]; frame_w as usize * frame_h as usize];
        for (tile, accum) in self.grid.tiles().iter().zip(&self.tile_accums) {
            let mut local = 0usize;
            for y in tile.y0..tile.y1 {
                for x in tile.x0..tile.x1 {
                    let (r, g, b) = accum[local].to_pixel();
                    pixels[(y * frame_w + x) as usize] = [r as f32, g as f32, b as f32];
                    local += 1;
                }
            }
        }

        std::mem::swap(&mut self.prev_amp, &mut self.curr_amp);
        // prev_amp now holds this frame's amplitudes.
        if !self.router.is_calibrated() {
            self.baseline.merge(&self.prev_amp);
        }

        for (idx, accum) in self.tile_accums.iter_mut().enumerate() {
            if self.dirty.is_dirty(idx) {
                for cell in accum.iter_mut() {
                    cell.clear();
                }
            }
        }

        RenderResult {
            frame: SpectrumFrame {
                width: frame_w,
                height: frame_h,
                pixels,
            },
            dirty_mask: self.dirty.clone(),
            calibration_complete: self.router.is_calibrated(),
        }
    }
}

/// Worker-pool sizing policy, overridable via environment.
fn tile_workers(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    if let Some(n) = env_config::tile_worker_override() {
        return n;
    }
    let cores = std::thread::available_parallelism().map_or(4, |n| n.get());
    cores.saturating_sub(2).max(4)
}

#[allow(clippy::too_many_arguments)]
fn process_tile(
    tile: &TileRect,
    accum: &mut [AccumCell],
    curr: &mut [f32],
    prev: &[f32],
    cfg: &EngineConfig,
    frame_w: u32,
    eps: f64,
    lut: &GammaLut,
) -> usize {
    let mut rng = rand::thread_rng();
    let spp_x = cfg.spp_x.max(1);
    let spp_y = cfg.spp_y.max(1);
    let spp = f64::from(spp_x * spp_y);
    let mut changed = 0usize;
    let mut local = 0usize;

    for _y in tile.y0..tile.y1 {
        for x in tile.x0..tile.x1 {
            let (mut sr, mut sg, mut sb) = (0.0f64, 0.0f64, 0.0f64);
            for _sy in 0..spp_y {
                for sx in 0..spp_x {
                    let jx = if cfg.jitter { rng.gen::<f64>() } else { 0.5 };
                    // The gradient varies only along x; the vertical
                    // subpixel offset cannot change the sample.
                    let fx = (f64::from(sx) + jx) / f64::from(spp_x);
                    let norm_x = (f64::from(x) + fx) / f64::from(frame_w);
                    let nm = VIOLET_MIN_NM + SPECTRUM_RANGE_NM * norm_x;
                    let (r, g, b) = shade(nm, lut);
                    sr += r;
                    sg += g;
                    sb += b;
                }
            }
            sr /= spp;
            sg /= spp;
            sb /= spp;

            let amp = ((sr.abs() + sg.abs() + sb.abs()) / 3.0) as f32;
            curr[local] = amp;
            if (f64::from(prev[local]) - f64::from(amp)).abs() > eps {
                changed += 1;
            }
            accum[local].add_with_cap(sr, sg, sb, 1.0, cfg.weight_cap);
            local += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EngineConfig {
        EngineConfig {
            width: 64,
            height: 32,
            tile_w: 16,
            tile_h: 16,
            spp_x: 1,
            spp_y: 1,
            jitter: false,
            weight_cap: 4.0,
            gamma: 2.2,
            router: RouterConfig {
                epsilon: 0.05,
                k_percent: 5.0,
                calib_frames: 1000,
                calib_min_seconds: 3600.0,
                allow_skip_route: true,
            },
            workers: 2,
        }
    }

    #[test]
    fn first_frame_is_fully_dirty_second_is_clean() {
        let mut engine = StaticFrameEngine::new(test_config());

        // Against a zero baseline everything changes.
        let first = engine.render_next_frame();
        assert_eq!(first.dirty_mask.dirty_count(), first.dirty_mask.len());
        assert!(!first.calibration_complete);

        // A deterministic static scene re-renders identically.
        let second = engine.render_next_frame();
        assert_eq!(second.dirty_mask.dirty_count(), 0);
    }

    #[test]
    fn static_frames_render_identically() {
        let mut engine = StaticFrameEngine::new(test_config());
        engine.render_next_frame();
        let a = engine.render_next_frame();
        let b = engine.render_next_frame();
        assert_eq!(a.frame.pixels(), b.frame.pixels());
    }

    #[test]
    fn output_spans_violet_to_red() {
        let mut engine = StaticFrameEngine::new(test_config());
        let result = engine.render_next_frame();
        let left = result.frame.pixel(0, 0);
        let right = result.frame.pixel(63, 31);
        assert!(left[2] > 0.0, "violet edge carries blue");
        assert!(right[0] > 0.0, "red edge carries red");
        assert_eq!(right[2], 0.0, "red edge has no blue");
    }

    #[test]
    fn raw_image_conversion_keeps_layout() {
        let mut engine = StaticFrameEngine::new(test_config());
        let result = engine.render_next_frame();
        let img = result.frame.to_raw_image();
        assert!(img.ok());
        assert_eq!(img.dimensions(), (64, 32));
        assert!(img.as_bgra_bytes().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn calibration_completes_and_baseline_stops_growing() {
        let mut cfg = test_config();
        cfg.router.calib_frames = 3;
        cfg.router.calib_min_seconds = 0.0;
        let mut engine = StaticFrameEngine::new(cfg);

        assert!(!engine.render_next_frame().calibration_complete);
        assert!(!engine.render_next_frame().calibration_complete);
        assert!(engine.render_next_frame().calibration_complete);
        let frozen = engine.baseline_frames();
        engine.render_next_frame();
        assert_eq!(engine.baseline_frames(), frozen);
    }

    #[test]
    fn resolution_change_resets_calibration() {
        let mut cfg = test_config();
        cfg.router.calib_frames = 1;
        cfg.router.calib_min_seconds = 0.0;
        let mut engine = StaticFrameEngine::new(cfg);
        assert!(engine.render_next_frame().calibration_complete);

        engine.set_resolution(32, 32);
        let result = engine.render_next_frame();
        assert!(!result.calibration_complete);
        assert_eq!(result.frame.width(), 32);
        assert_eq!(result.dirty_mask.len(), engine.grid().tile_count());
    }

    #[test]
    fn zero_sized_target_renders_no_pixels() {
        let mut cfg = test_config();
        cfg.width = 0;
        cfg.height = 32;
        let mut engine = StaticFrameEngine::new(cfg);
        let result = engine.render_next_frame();
        assert!(result.frame.pixels().is_empty());
        assert_eq!(result.dirty_mask.len(), 0);
    }

    #[test]
    fn dirty_mask_bits_round_trip() {
        let mut mask = DirtyMask::new(130);
        mask.set(0, true);
        mask.set(64, true);
        mask.set(129, true);
        assert!(mask.is_dirty(0));
        assert!(mask.is_dirty(64));
        assert!(mask.is_dirty(129));
        assert!(!mask.is_dirty(1));
        assert_eq!(mask.dirty_count(), 3);
        mask.set(64, false);
        assert_eq!(mask.dirty_count(), 2);
    }
}
