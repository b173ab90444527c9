//! Tile-parallel static-frame rendering: tiler, change router,
//! sharpening accumulators, spectrum shading, and the engine that ties
//! them together.

mod accum;
mod engine;
mod router;
mod spectrum;
mod tiler;

pub use accum::AccumCell;
pub use engine::{DirtyMask, EngineConfig, RenderResult, SpectrumFrame, StaticFrameEngine};
pub use router::{RouterConfig, TileRoute, TileRouter};
pub use spectrum::{
    intensity_taper, shade, spectrum_gradient_image, wavelength_to_rgb, GammaLut, DEFAULT_GAMMA,
    RED_MAX_NM, SPECTRUM_RANGE_NM, VIOLET_MIN_NM,
};
pub use tiler::{TileGrid, TileRect};
