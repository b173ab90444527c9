use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, CaptureResult};
use crate::image::RawImage;
use crate::sinks::FrameSink;

/// `base` + `_000042` + `ext`, zero-padded to `pad` digits.
pub fn numbered_path(base: &Path, index: u64, ext: &str, pad: usize) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("_{index:0pad$}{ext}"));
    PathBuf::from(name)
}

/// Write a 32-bit uncompressed BMP (BITMAPINFOHEADER, BI_RGB). The
/// source is top-down BGRA; BMP convention stores rows bottom-up, so
/// rows are emitted in reverse order with a positive height.
pub fn write_bmp32(path: &Path, image: &RawImage) -> CaptureResult<()> {
    if !image.ok() {
        return Err(CaptureError::SinkWrite(format!(
            "refusing to encode invalid image to {}",
            path.display()
        )));
    }

    let width = image.width();
    let height = image.height();
    let stride = width as usize * 4;
    let pixel_bytes = stride as u32 * height;
    let file_size = 14 + 40 + pixel_bytes;

    let file = File::create(path)
        .map_err(|e| CaptureError::SinkWrite(format!("{}: {e}", path.display())))?;
    let mut out = BufWriter::new(file);

    let sink_err = |e: std::io::Error| CaptureError::SinkWrite(format!("{}: {e}", path.display()));

    // BITMAPFILEHEADER
    out.write_all(b"BM").map_err(sink_err)?;
    out.write_all(&file_size.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&0u16.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&0u16.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&(14u32 + 40).to_le_bytes()).map_err(sink_err)?;

    // BITMAPINFOHEADER
    out.write_all(&40u32.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&(width as i32).to_le_bytes()).map_err(sink_err)?;
    out.write_all(&(height as i32).to_le_bytes()).map_err(sink_err)?;
    out.write_all(&1u16.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&32u16.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&0u32.to_le_bytes()).map_err(sink_err)?; // BI_RGB
    out.write_all(&pixel_bytes.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&2835u32.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&2835u32.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&0u32.to_le_bytes()).map_err(sink_err)?;
    out.write_all(&0u32.to_le_bytes()).map_err(sink_err)?;

    let bytes = image.as_bgra_bytes();
    for y in (0..height as usize).rev() {
        out.write_all(&bytes[y * stride..(y + 1) * stride])
            .map_err(sink_err)?;
    }
    out.flush().map_err(sink_err)?;
    Ok(())
}

/// Records non-duplicate frames as `BASE_<frame index>.bmp`. The parent
/// directory is created once at construction; failure there is a
/// startup error, not a per-frame one.
pub struct BmpRecorder {
    base: PathBuf,
    written: Vec<(PathBuf, u64)>,
}

impl BmpRecorder {
    pub fn create(base: PathBuf) -> CaptureResult<Self> {
        if let Some(parent) = base.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CaptureError::RecordDirUnavailable(format!("{}: {e}", parent.display()))
                })?;
            }
        }
        Ok(Self {
            base,
            written: Vec::new(),
        })
    }

    /// Write one frame under its capture index. Returns the path.
    pub fn write_indexed(&mut self, image: &RawImage, frame_index: u64) -> CaptureResult<PathBuf> {
        let path = numbered_path(&self.base, frame_index, ".bmp", 6);
        write_bmp32(&path, image)?;
        self.written.push((path.clone(), frame_index));
        Ok(path)
    }

    /// Paths written so far, with their capture indices, in write order.
    pub fn written(&self) -> &[(PathBuf, u64)] {
        &self.written
    }
}

/// [`FrameSink`] writing an expanded sequence into a directory as
/// `prefix_%06d.bmp`.
pub struct BmpDirSink {
    dir: PathBuf,
    prefix: String,
    written: Vec<PathBuf>,
}

impl BmpDirSink {
    pub fn create(dir: PathBuf, prefix: impl Into<String>) -> CaptureResult<Self> {
        std::fs::create_dir_all(&dir)
            .map_err(|e| CaptureError::RecordDirUnavailable(format!("{}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            written: Vec::new(),
        })
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl FrameSink for BmpDirSink {
    fn write_frame(&mut self, image: &RawImage, index: u64) -> CaptureResult<()> {
        let path = numbered_path(&self.dir.join(&self.prefix), index, ".bmp", 6);
        write_bmp32(&path, image)?;
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_path_pads_to_six_digits() {
        let p = numbered_path(Path::new("out/frame"), 3, ".bmp", 6);
        assert_eq!(p, PathBuf::from("out/frame_000003.bmp"));
    }

    #[test]
    fn bmp_header_and_row_order() -> CaptureResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("t.bmp");

        // 1x2 image: top pixel (1,2,3,255), bottom pixel (4,5,6,255).
        let mut img = RawImage::zeroed(1, 2)?;
        img.as_mut_bgra_bytes().copy_from_slice(&[1, 2, 3, 255, 4, 5, 6, 255]);
        write_bmp32(&path, &img)?;

        let data = std::fs::read(&path)?;
        assert_eq!(&data[..2], b"BM");
        assert_eq!(data.len(), 14 + 40 + 8);
        // File size field.
        assert_eq!(u32::from_le_bytes(data[2..6].try_into().unwrap()), 62);
        // Info header: size 40, width 1, height 2 (positive: bottom-up),
        // planes 1, bit count 32, BI_RGB.
        assert_eq!(u32::from_le_bytes(data[14..18].try_into().unwrap()), 40);
        assert_eq!(i32::from_le_bytes(data[18..22].try_into().unwrap()), 1);
        assert_eq!(i32::from_le_bytes(data[22..26].try_into().unwrap()), 2);
        assert_eq!(u16::from_le_bytes(data[26..28].try_into().unwrap()), 1);
        assert_eq!(u16::from_le_bytes(data[28..30].try_into().unwrap()), 32);
        assert_eq!(u32::from_le_bytes(data[30..34].try_into().unwrap()), 0);
        // Pixel data starts with the bottom row.
        assert_eq!(&data[54..58], &[4, 5, 6, 255]);
        assert_eq!(&data[58..62], &[1, 2, 3, 255]);
        Ok(())
    }

    #[test]
    fn invalid_image_is_rejected() {
        let err = write_bmp32(Path::new("/nonexistent/x.bmp"), &RawImage::empty());
        assert!(matches!(err, Err(CaptureError::SinkWrite(_))));
    }

    #[test]
    fn recorder_creates_parent_directory() -> CaptureResult<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("nested/deeper/frame");
        let mut recorder = BmpRecorder::create(base)?;
        let img = RawImage::solid(2, 2, 1, 1, 1)?;
        let path = recorder.write_indexed(&img, 7)?;
        assert!(path.ends_with("frame_000007.bmp"));
        assert!(path.exists());
        assert_eq!(recorder.written().len(), 1);
        Ok(())
    }

    #[test]
    fn dir_sink_writes_sequential_names() -> CaptureResult<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = BmpDirSink::create(dir.path().join("clip"), "cap")?;
        let img = RawImage::solid(2, 2, 9, 9, 9)?;
        sink.write_frame(&img, 0)?;
        sink.write_frame(&img, 1)?;
        assert_eq!(sink.written().len(), 2);
        assert!(sink.written()[1].ends_with("cap_000001.bmp"));
        Ok(())
    }
}
