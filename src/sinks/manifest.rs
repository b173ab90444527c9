use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, CaptureResult};

/// One written frame file and how many capture ticks it covered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub repeats: u64,
}

/// Write an FFmpeg concat-demuxer manifest for a deduplicated frame
/// sequence: each entry emits a `file` line followed by a `duration`
/// line of `repeats / fps` seconds. The concat demuxer ignores the
/// duration of the last listed file, so the final entry's `file` line
/// is emitted a second time without a duration to preserve the clip's
/// temporal extent.
pub fn write_concat_manifest(
    manifest_path: &Path,
    entries: &[ManifestEntry],
    fps: u32,
) -> CaptureResult<()> {
    if entries.is_empty() {
        return Err(CaptureError::InvalidConfig(
            "cannot write a concat manifest with no entries".into(),
        ));
    }
    let fps = fps.max(1);

    let file = std::fs::File::create(manifest_path)
        .map_err(|e| CaptureError::SinkWrite(format!("{}: {e}", manifest_path.display())))?;
    let mut out = std::io::BufWriter::new(file);
    let sink_err =
        |e: std::io::Error| CaptureError::SinkWrite(format!("{}: {e}", manifest_path.display()));

    for entry in entries {
        let duration = entry.repeats.max(1) as f64 / f64::from(fps);
        writeln!(out, "file '{}'", escape_single_quotes(&entry.path)).map_err(sink_err)?;
        writeln!(out, "duration {duration:.6}").map_err(sink_err)?;
    }
    let last = entries.last().expect("checked non-empty");
    writeln!(out, "file '{}'", escape_single_quotes(&last.path)).map_err(sink_err)?;
    out.flush().map_err(sink_err)?;
    Ok(())
}

fn escape_single_quotes(path: &Path) -> String {
    path.display().to_string().replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lines_follow_concat_convention() -> CaptureResult<()> {
        let dir = tempfile::tempdir()?;
        let manifest = dir.path().join("clip.txt");
        let entries = vec![
            ManifestEntry {
                path: PathBuf::from("cap_000000.bmp"),
                repeats: 30,
            },
            ManifestEntry {
                path: PathBuf::from("cap_000001.bmp"),
                repeats: 1,
            },
        ];
        write_concat_manifest(&manifest, &entries, 30)?;

        let text = std::fs::read_to_string(&manifest)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "file 'cap_000000.bmp'",
                "duration 1.000000",
                "file 'cap_000001.bmp'",
                "duration 0.033333",
                // Final file repeated, no trailing duration.
                "file 'cap_000001.bmp'",
            ]
        );
        Ok(())
    }

    #[test]
    fn empty_manifest_is_an_error() {
        let err = write_concat_manifest(Path::new("unused.txt"), &[], 30);
        assert!(matches!(err, Err(CaptureError::InvalidConfig(_))));
    }
}
