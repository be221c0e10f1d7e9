use image::{GrayImage, ImageFormat, ImageResult};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Pipeline stages that expose an intermediate raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Grayscale raster straight out of the decoder.
    Decoded,
    /// Raster cropped to the content bounding box.
    Cropped,
    /// Cropped content after the nearest-neighbour rescale.
    Resized,
    /// Final 28x28 canvas handed to the tensor encoder.
    Normalized,
}

impl Stage {
    /// Returns the stage as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decoded => "decoded",
            Stage::Cropped => "cropped",
            Stage::Resized => "resized",
            Stage::Normalized => "normalized",
        }
    }
}

/// Hook invoked after each pipeline stage.
///
/// Observers are advisory: they receive a borrowed raster, cannot alter it and
/// cannot fail the request. Implementations must swallow their own errors.
pub trait PipelineObserver: Send + Sync {
    fn on_stage(&self, stage: Stage, raster: &GrayImage);
}

/// Observer that does nothing. This is the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_stage(&self, _stage: Stage, _raster: &GrayImage) {}
}

/// Writes every intermediate raster as a PNG into a directory for operator
/// troubleshooting.
///
/// The decoded image lands in `decoded_image.png` and the final canvas in
/// `resized_centered_image.png`; the other stages use `<stage>_image.png`.
/// Each request overwrites the previous files. Every PNG is written to a
/// temporary file in the same directory and renamed into place, so concurrent
/// requests never leave a half-written image; the last one to finish wins.
#[derive(Clone, Debug)]
pub struct DebugImageWriter {
    dir: PathBuf,
}

impl DebugImageWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(stage: Stage) -> String {
        match stage {
            Stage::Decoded => "decoded_image.png".to_string(),
            Stage::Normalized => "resized_centered_image.png".to_string(),
            other => format!("{}_image.png", other.as_str()),
        }
    }
}

impl DebugImageWriter {
    fn write_png(&self, path: &Path, raster: &GrayImage) -> ImageResult<()> {
        let mut file = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            raster.write_to(&mut writer, ImageFormat::Png)?;
            writer.flush()?;
        }
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl PipelineObserver for DebugImageWriter {
    fn on_stage(&self, stage: Stage, raster: &GrayImage) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            log::warn!("Cannot create debug directory {:?}: {}", self.dir, e);
            return;
        }
        let path = self.dir.join(Self::file_name(stage));
        match self.write_png(&path, raster) {
            Ok(()) => log::debug!("{} image saved to {:?}", stage.as_str(), path),
            Err(e) => log::warn!("Failed to save {} image to {:?}: {}", stage.as_str(), path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn writes_stage_images() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DebugImageWriter::new(dir.path().join("debug"));
        let raster = GrayImage::from_pixel(4, 3, Luma([200]));

        writer.on_stage(Stage::Decoded, &raster);
        writer.on_stage(Stage::Normalized, &raster);
        writer.on_stage(Stage::Cropped, &raster);

        let decoded = image::open(dir.path().join("debug/decoded_image.png")).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
        assert!(dir.path().join("debug/resized_centered_image.png").exists());
        assert!(dir.path().join("debug/cropped_image.png").exists());
    }

    #[test]
    fn concurrent_writes_leave_one_whole_image() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DebugImageWriter::new(dir.path());

        std::thread::scope(|scope| {
            for size in 1..=8u32 {
                let writer = &writer;
                scope.spawn(move || {
                    let raster = GrayImage::from_pixel(size * 10, size * 10, Luma([size as u8]));
                    for _ in 0..10 {
                        writer.on_stage(Stage::Decoded, &raster);
                    }
                });
            }
        });

        let decoded = image::open(dir.path().join("decoded_image.png"))
            .unwrap()
            .to_luma8();
        let size = decoded.width() / 10;
        assert_eq!(decoded.height(), decoded.width());
        assert!(decoded.pixels().all(|p| p.0[0] as u32 == size));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn write_failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be makes every write fail.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let writer = DebugImageWriter::new(&blocker);
        writer.on_stage(Stage::Decoded, &GrayImage::new(2, 2));
        assert!(blocker.is_file());
    }
}
