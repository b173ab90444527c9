//! Visible-spectrum shading: the piecewise wavelength→RGB map, the
//! spectrum-edge intensity taper, and a gamma lookup table.

use crate::error::CaptureResult;
use crate::image::RawImage;

pub const VIOLET_MIN_NM: f64 = 380.0;
pub const RED_MAX_NM: f64 = 750.0;
pub const SPECTRUM_RANGE_NM: f64 = RED_MAX_NM - VIOLET_MIN_NM;

pub const DEFAULT_GAMMA: f64 = 2.2;

/// Piecewise-linear wavelength→RGB, channels clamped to [0, 1].
/// Wavelengths outside [380, 750] nm shade to black.
pub fn wavelength_to_rgb(nm: f64) -> (f64, f64, f64) {
    let (r, g, b) = if (380.0..440.0).contains(&nm) {
        (-(nm - 440.0) / 60.0, 0.0, 1.0)
    } else if (440.0..490.0).contains(&nm) {
        (0.0, (nm - 440.0) / 50.0, 1.0)
    } else if (490.0..510.0).contains(&nm) {
        (0.0, 1.0, -(nm - 510.0) / 20.0)
    } else if (510.0..580.0).contains(&nm) {
        ((nm - 510.0) / 70.0, 1.0, 0.0)
    } else if (580.0..645.0).contains(&nm) {
        (1.0, -(nm - 645.0) / 65.0, 0.0)
    } else if (645.0..=750.0).contains(&nm) {
        (1.0, 0.0, 0.0)
    } else {
        (0.0, 0.0, 0.0)
    };
    (r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
}

/// Intensity falls off toward both ends of the visible range.
pub fn intensity_taper(nm: f64) -> f64 {
    if (380.0..420.0).contains(&nm) {
        0.3 + 0.7 * (nm - 380.0) / 40.0
    } else if nm > 701.0 && nm <= 750.0 {
        0.3 + 0.7 * (750.0 - nm) / 49.0
    } else {
        1.0
    }
}

/// Gamma correction table over [0, 1] with linear interpolation between
/// entries. Dense enough that 8-bit quantization of the result matches
/// the closed form.
pub struct GammaLut {
    table: Vec<f64>,
}

const GAMMA_LUT_STEPS: usize = 4096;

impl GammaLut {
    pub fn new(gamma: f64) -> Self {
        let inv = if gamma > 0.0 { 1.0 / gamma } else { 1.0 };
        let table = (0..=GAMMA_LUT_STEPS)
            .map(|i| (i as f64 / GAMMA_LUT_STEPS as f64).powf(inv))
            .collect();
        Self { table }
    }

    pub fn apply(&self, value: f64) -> f64 {
        let clamped = value.clamp(0.0, 1.0);
        let scaled = clamped * GAMMA_LUT_STEPS as f64;
        let lo = scaled.floor() as usize;
        if lo >= GAMMA_LUT_STEPS {
            return self.table[GAMMA_LUT_STEPS];
        }
        let frac = scaled - lo as f64;
        self.table[lo] * (1.0 - frac) + self.table[lo + 1] * frac
    }
}

/// Full shading chain for one wavelength: piecewise RGB, intensity
/// taper, then gamma.
pub fn shade(nm: f64, lut: &GammaLut) -> (f64, f64, f64) {
    let (r, g, b) = wavelength_to_rgb(nm);
    let intensity = intensity_taper(nm);
    (
        lut.apply(r * intensity),
        lut.apply(g * intensity),
        lut.apply(b * intensity),
    )
}

/// One-call synthetic frame: the visible spectrum swept left to right,
/// constant down each column. Used by fixtures and renderer tests.
pub fn spectrum_gradient_image(width: u32, height: u32) -> CaptureResult<RawImage> {
    let mut img = RawImage::zeroed(width, height)?;
    if width == 0 || height == 0 {
        return Ok(img);
    }

    let lut = GammaLut::new(DEFAULT_GAMMA);
    let denom = (width.max(2) - 1) as f64;
    let mut row = Vec::with_capacity(width as usize * 4);
    for x in 0..width {
        let nm = VIOLET_MIN_NM + SPECTRUM_RANGE_NM * f64::from(x) / denom;
        let (r, g, b) = shade(nm, &lut);
        row.push((b * 255.0).round().clamp(0.0, 255.0) as u8);
        row.push((g * 255.0).round().clamp(0.0, 255.0) as u8);
        row.push((r * 255.0).round().clamp(0.0, 255.0) as u8);
        row.push(255);
    }

    let stride = width as usize * 4;
    let bytes = img.as_mut_bgra_bytes();
    for y in 0..height as usize {
        bytes[y * stride..(y + 1) * stride].copy_from_slice(&row);
    }
    Ok(img)
}
