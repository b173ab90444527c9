use crate::image::RawImage;

/// Bilinear BGRA→BGRA scale preserving top-down layout.
///
/// Destination pixel centers map back into source space as
/// `(x + 0.5) * w / new_w - 0.5`; source coordinates are clamped to the
/// valid range so edge pixels extend rather than wrap. Alpha is forced
/// to 255 in the output. Invalid input (empty source or a zero target
/// dimension) yields an empty image whose `ok()` is false.
pub fn resize_bilinear(src: &RawImage, new_w: u32, new_h: u32) -> RawImage {
    if !src.ok() || new_w == 0 || new_h == 0 {
        return RawImage::empty();
    }

    let sw = src.width() as usize;
    let sh = src.height() as usize;
    let dw = new_w as usize;
    let dh = new_h as usize;

    let scale_x = sw as f64 / dw as f64;
    let scale_y = sh as f64 / dh as f64;

    let src_bytes = src.as_bgra_bytes();
    let mut dst = vec![0u8; dw * dh * 4];

    for y in 0..dh {
        let fy = ((y as f64 + 0.5) * scale_y - 0.5).clamp(0.0, (sh - 1) as f64);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let ty = fy - y0 as f64;

        for x in 0..dw {
            let fx = ((x as f64 + 0.5) * scale_x - 0.5).clamp(0.0, (sw - 1) as f64);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let tx = fx - x0 as f64;

            let p00 = &src_bytes[(y0 * sw + x0) * 4..][..4];
            let p10 = &src_bytes[(y0 * sw + x1) * 4..][..4];
            let p01 = &src_bytes[(y1 * sw + x0) * 4..][..4];
            let p11 = &src_bytes[(y1 * sw + x1) * 4..][..4];

            let out = &mut dst[(y * dw + x) * 4..][..4];
            for c in 0..3 {
                let top = (1.0 - tx) * f64::from(p00[c]) + tx * f64::from(p10[c]);
                let bottom = (1.0 - tx) * f64::from(p01[c]) + tx * f64::from(p11[c]);
                let mixed = (1.0 - ty) * top + ty * bottom;
                out[c] = mixed.round().clamp(0.0, 255.0) as u8;
            }
            out[3] = 255;
        }
    }

    RawImage::from_bgra8(new_w, new_h, dst).unwrap_or_else(|_| RawImage::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureResult;

    #[test]
    fn invalid_inputs_yield_empty_image() -> CaptureResult<()> {
        assert!(!resize_bilinear(&RawImage::empty(), 4, 4).ok());
        let src = RawImage::solid(4, 4, 1, 2, 3)?;
        assert!(!resize_bilinear(&src, 0, 4).ok());
        assert!(!resize_bilinear(&src, 4, 0).ok());
        Ok(())
    }

    #[test]
    fn output_layout_and_alpha() -> CaptureResult<()> {
        let src = RawImage::solid(10, 6, 30, 60, 90)?;
        let dst = resize_bilinear(&src, 7, 5);
        assert!(dst.ok());
        assert_eq!(dst.as_bgra_bytes().len(), 7 * 5 * 4);
        assert!(dst.as_bgra_bytes().chunks_exact(4).all(|px| px[3] == 255));
        Ok(())
    }

    #[test]
    fn identity_resize_is_near_exact() -> CaptureResult<()> {
        let mut src = RawImage::zeroed(8, 8)?;
        for (i, px) in src.as_mut_bgra_bytes().chunks_exact_mut(4).enumerate() {
            px[0] = (i * 3) as u8;
            px[1] = (i * 5) as u8;
            px[2] = (i * 7) as u8;
            px[3] = 255;
        }
        let dst = resize_bilinear(&src, 8, 8);
        for (a, b) in src
            .as_bgra_bytes()
            .chunks_exact(4)
            .zip(dst.as_bgra_bytes().chunks_exact(4))
        {
            for c in 0..3 {
                assert!((i16::from(a[c]) - i16::from(b[c])).abs() <= 1);
            }
        }
        Ok(())
    }

    #[test]
    fn upscale_of_solid_image_stays_solid() -> CaptureResult<()> {
        let src = RawImage::solid(3, 3, 11, 22, 33)?;
        let dst = resize_bilinear(&src, 9, 9);
        assert!(dst
            .as_bgra_bytes()
            .chunks_exact(4)
            .all(|px| px[0] == 11 && px[1] == 22 && px[2] == 33));
        Ok(())
    }
}
