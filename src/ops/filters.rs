use crate::image::RawImage;

/// Cosmetic per-frame corrections applied after the dedupe decision has
/// been made on the raw content.
#[derive(Clone, Copy, Debug)]
pub struct FrameFilters {
    pub grayscale: bool,
    /// Additive brightness in [-1.0, 1.0], scaled into 8-bit space.
    pub brightness: f64,
    /// Multiplicative contrast (>= 0) around mid-gray.
    pub contrast: f64,
    /// Gamma correction; values <= 0 are ignored.
    pub gamma: f64,
    /// Box-pixelate block size; active when >= 2.
    pub pixelate: u32,
}

impl Default for FrameFilters {
    fn default() -> Self {
        Self {
            grayscale: false,
            brightness: 0.0,
            contrast: 1.0,
            gamma: 1.0,
            pixelate: 0,
        }
    }
}

impl FrameFilters {
    pub fn is_identity(&self) -> bool {
        !self.grayscale
            && self.brightness.abs() <= 1e-9
            && (self.contrast - 1.0).abs() <= 1e-9
            && (self.gamma - 1.0).abs() <= 1e-9
            && self.pixelate < 2
    }
}

/// BT.601 luma, replicated into all three color channels.
pub fn apply_grayscale(img: &mut RawImage) {
    for px in img.as_mut_bgra_bytes().chunks_exact_mut(4) {
        let luma =
            0.299 * f64::from(px[2]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[0]) + 0.5;
        let v = luma.clamp(0.0, 255.0) as u8;
        px[0] = v;
        px[1] = v;
        px[2] = v;
    }
}

/// Contrast scales around 128 (mid-gray), brightness adds afterwards.
pub fn apply_brightness_contrast(img: &mut RawImage, brightness: f64, contrast: f64) {
    let add = (brightness * 255.0).round() as i32;
    for px in img.as_mut_bgra_bytes().chunks_exact_mut(4) {
        for c in 0..3 {
            let scaled = ((f64::from(px[c]) - 128.0) * contrast + 128.0).round() as i32 + add;
            px[c] = scaled.clamp(0, 255) as u8;
        }
    }
}

/// Gamma correction through a 256-entry LUT.
pub fn apply_gamma(img: &mut RawImage, gamma: f64) {
    if gamma <= 0.0 {
        return;
    }
    let inv = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let normalized = (i as f64 / 255.0).powf(inv);
        *entry = (normalized * 255.0).clamp(0.0, 255.0) as u8;
    }
    for px in img.as_mut_bgra_bytes().chunks_exact_mut(4) {
        px[0] = lut[px[0] as usize];
        px[1] = lut[px[1] as usize];
        px[2] = lut[px[2] as usize];
    }
}

/// Blocky pixelate: each block takes its top-left pixel's color.
pub fn apply_pixelate(img: &mut RawImage, block: u32) {
    if block < 2 {
        return;
    }
    let w = img.width() as usize;
    let h = img.height() as usize;
    let block = block as usize;
    let bytes = img.as_mut_bgra_bytes();
    for by in (0..h).step_by(block) {
        for bx in (0..w).step_by(block) {
            let src_idx = (by * w + bx) * 4;
            let (b, g, r) = (bytes[src_idx], bytes[src_idx + 1], bytes[src_idx + 2]);
            for y in by..(by + block).min(h) {
                for x in bx..(bx + block).min(w) {
                    let i = (y * w + x) * 4;
                    bytes[i] = b;
                    bytes[i + 1] = g;
                    bytes[i + 2] = r;
                }
            }
        }
    }
}

/// Full chain in fixed order: grayscale, brightness/contrast, gamma,
/// pixelate. Skips stages left at their identity values.
pub fn apply_filters(img: &mut RawImage, filters: &FrameFilters) {
    if !img.ok() {
        return;
    }
    if filters.grayscale {
        apply_grayscale(img);
    }
    if (filters.contrast - 1.0).abs() > 1e-9 || filters.brightness.abs() > 1e-9 {
        apply_brightness_contrast(img, filters.brightness, filters.contrast);
    }
    if (filters.gamma - 1.0).abs() > 1e-9 {
        apply_gamma(img, filters.gamma);
    }
    if filters.pixelate >= 2 {
        apply_pixelate(img, filters.pixelate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureResult;

    #[test]
    fn grayscale_equalizes_channels() -> CaptureResult<()> {
        let mut img = RawImage::solid(4, 4, 10, 100, 200)?;
        apply_grayscale(&mut img);
        for px in img.as_bgra_bytes().chunks_exact(4) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px[3], 255);
        }
        Ok(())
    }

    #[test]
    fn identity_filters_do_not_touch_pixels() -> CaptureResult<()> {
        let img = RawImage::solid(6, 6, 12, 34, 56)?;
        let mut copy = img.clone();
        apply_filters(&mut copy, &FrameFilters::default());
        assert!(img.bytes_equal(&copy));
        Ok(())
    }

    #[test]
    fn contrast_clamps_to_byte_range() -> CaptureResult<()> {
        let mut img = RawImage::solid(2, 2, 250, 250, 250)?;
        apply_brightness_contrast(&mut img, 0.5, 3.0);
        assert!(img.as_bgra_bytes().chunks_exact(4).all(|px| px[0] == 255));
        Ok(())
    }

    #[test]
    fn pixelate_copies_block_top_left() -> CaptureResult<()> {
        let mut img = RawImage::zeroed(4, 4)?;
        {
            let bytes = img.as_mut_bgra_bytes();
            // Distinct color at (0,0); rest stays black.
            bytes[0] = 9;
            bytes[1] = 8;
            bytes[2] = 7;
        }
        apply_pixelate(&mut img, 4);
        for px in img.as_bgra_bytes().chunks_exact(4) {
            assert_eq!((px[0], px[1], px[2]), (9, 8, 7));
        }
        Ok(())
    }

    #[test]
    fn gamma_one_is_identity() -> CaptureResult<()> {
        let img = RawImage::solid(3, 3, 77, 88, 99)?;
        let mut copy = img.clone();
        apply_gamma(&mut copy, 1.0);
        assert!(img.bytes_equal(&copy));
        Ok(())
    }
}
