use crate::error::{CaptureError, CaptureResult};

/// A fixed-layout raster: 4 bytes per pixel in B,G,R,A order, row-major
/// top-down, no row padding. `bytes.len() == width * height * 4` holds
/// for every image whose `ok()` is true; the empty image (all zeroes) is
/// the conventional failure value at capture boundaries.
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl RawImage {
    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            bytes: Vec::new(),
        }
    }

    pub fn from_bgra8(width: u32, height: u32, bytes: Vec<u8>) -> CaptureResult<Self> {
        let expected = bgra_len(width, height)?;
        if bytes.len() != expected {
            return Err(CaptureError::InvalidConfig(format!(
                "BGRA frame data length mismatch: got {}, expected {} for {}x{}",
                bytes.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            bytes,
        })
    }

    /// Allocate a zeroed image. Alpha is left at 0; callers that expose
    /// the result must fill pixels (or use [`RawImage::solid`]).
    pub fn zeroed(width: u32, height: u32) -> CaptureResult<Self> {
        let len = bgra_len(width, height)?;
        Ok(Self {
            width,
            height,
            bytes: vec![0; len],
        })
    }

    /// A uniformly colored image. Handy for fixtures and tests.
    pub fn solid(width: u32, height: u32, b: u8, g: u8, r: u8) -> CaptureResult<Self> {
        let mut img = Self::zeroed(width, height)?;
        for px in img.bytes.chunks_exact_mut(4) {
            px[0] = b;
            px[1] = g;
            px[2] = r;
            px[3] = 255;
        }
        Ok(img)
    }

    pub fn ok(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.bytes.len() == (self.width as usize) * (self.height as usize) * 4
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    pub fn as_bgra_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_bgra_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Byte-exact comparison. Dimension mismatch is "not equal", never a
    /// panic; mis-sized inputs are a caller bug handled where cheap.
    pub fn bytes_equal(&self, other: &RawImage) -> bool {
        self.width == other.width && self.height == other.height && self.bytes == other.bytes
    }
}

fn bgra_len(width: u32, height: u32) -> CaptureResult<usize> {
    let w = usize::try_from(width).map_err(|_| CaptureError::BufferOverflow)?;
    let h = usize::try_from(height).map_err(|_| CaptureError::BufferOverflow)?;
    w.checked_mul(h)
        .and_then(|px| px.checked_mul(4))
        .ok_or(CaptureError::BufferOverflow)
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("data_len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_image_has_full_alpha_and_exact_length() -> CaptureResult<()> {
        let img = RawImage::solid(16, 9, 10, 20, 30)?;
        assert!(img.ok());
        assert_eq!(img.as_bgra_bytes().len(), 16 * 9 * 4);
        assert!(img.as_bgra_bytes().chunks_exact(4).all(|px| px[3] == 255));
        Ok(())
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let err = RawImage::from_bgra8(4, 4, vec![0; 10]);
        assert!(err.is_err());
    }

    #[test]
    fn empty_image_is_not_ok() {
        assert!(!RawImage::empty().ok());
    }

    #[test]
    fn bytes_equal_rejects_dimension_mismatch() -> CaptureResult<()> {
        let a = RawImage::solid(4, 4, 1, 2, 3)?;
        let b = RawImage::solid(8, 2, 1, 2, 3)?;
        assert!(!a.bytes_equal(&b));
        Ok(())
    }
}
