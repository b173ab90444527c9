//! In-place and copying pixel operations on BGRA8 rasters.

mod filters;
mod resize;

pub use filters::{
    apply_brightness_contrast, apply_filters, apply_gamma, apply_grayscale, apply_pixelate,
    FrameFilters,
};
pub use resize::resize_bilinear;
