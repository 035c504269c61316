//! Export of reconstructions and references as PNG images.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::{imageops, GrayImage, ImageBuffer, Luma};
use tracing::{debug, warn};

use rdsweep_core::{LumaImage, LumaView, LuminanceImageSet, ModelDims, Result, SweepError};

use crate::config::ExportConfig;

/// Single-channel buffer wide enough for every supported bit depth.
pub type LumaBuffer = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Receives the cast reconstructions of every row that was scored.
pub trait ReconstructionSink {
    /// `label` names the configuration, `image` is the image index.
    fn accept(&mut self, label: &str, image: usize, reconstruction: LumaView<'_>) -> Result<()>;

    /// Drops whatever was accepted under `label`.
    fn discard(&mut self, _label: &str) -> Result<()> {
        Ok(())
    }
}

/// Writes PNG files:
///
/// ```text
/// <root>/<label>/reconstruction_<j>.png
/// <root>/<label>/reconstruction_<j>_crop_<k>.png
/// <root>/reference/reference_<j>.png
/// ```
///
/// Listed images are rotated 90 degrees clockwise before cropping.
/// Samples above 8 bits are written as 16-bit PNG without rescaling.
#[derive(Debug, Clone)]
pub struct PngExporter {
    root: PathBuf,
    crop_size: usize,
    crop_positions: Vec<[usize; 2]>,
    rotated: HashSet<usize>,
}

impl PngExporter {
    pub fn new(root: impl Into<PathBuf>, config: &ExportConfig) -> Self {
        Self {
            root: root.into(),
            crop_size: config.crop_size,
            crop_positions: config.crop_positions.clone(),
            rotated: config.rotated_images.iter().copied().collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes every reference image under `reference/`.
    pub fn export_references(&self, images: &LuminanceImageSet) -> Result<()> {
        let dir = self.root.join("reference");
        for (index, image) in images.iter().enumerate() {
            self.write_with_crops(&dir, "reference", index, image)?;
        }
        Ok(())
    }

    fn write_with_crops(
        &self,
        dir: &Path,
        stem: &str,
        index: usize,
        image: LumaView<'_>,
    ) -> Result<()> {
        fs::create_dir_all(dir)?;
        let mut buffer = luma_buffer(image)?;
        if self.rotated.contains(&index) {
            buffer = imageops::rotate90(&buffer);
        }

        save_png(&dir.join(format!("{stem}_{index}.png")), &buffer, image.bit_depth)?;
        for (k, &[row, col]) in self.crop_positions.iter().enumerate() {
            match crop(&buffer, row, col, self.crop_size) {
                Some(c) => save_png(
                    &dir.join(format!("{stem}_{index}_crop_{k}.png")),
                    &c,
                    image.bit_depth,
                )?,
                None => warn!(
                    image = index,
                    crop = k,
                    width = buffer.width(),
                    height = buffer.height(),
                    "crop does not fit in the image, skipped"
                ),
            }
        }
        debug!(image = index, dir = %dir.display(), "image exported");
        Ok(())
    }
}

impl ReconstructionSink for PngExporter {
    fn accept(&mut self, label: &str, image: usize, reconstruction: LumaView<'_>) -> Result<()> {
        let dir = self.root.join(label);
        self.write_with_crops(&dir, "reconstruction", image, reconstruction)
    }

    fn discard(&mut self, label: &str) -> Result<()> {
        match fs::remove_dir_all(self.root.join(label)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Hands a fully scored row to `sink`.
///
/// When an image is refused, everything already accepted under `label` is
/// discarded and the index of the refused image comes back with the error.
pub(crate) fn export_row(
    sink: &mut dyn ReconstructionSink,
    label: &str,
    row: &[LumaImage],
) -> std::result::Result<(), (usize, SweepError)> {
    for (image, reconstruction) in row.iter().enumerate() {
        if let Err(error) = sink.accept(label, image, reconstruction.view()) {
            if let Err(cleanup) = sink.discard(label) {
                warn!(label, error = %cleanup, "partial export left behind");
            }
            return Err((image, error));
        }
    }
    Ok(())
}

/// Copies `image` into an image buffer.
pub fn luma_buffer(image: LumaView<'_>) -> Result<LumaBuffer> {
    let ModelDims { height, width } = image.dims;
    LumaBuffer::from_raw(width as u32, height as u32, image.samples.to_vec()).ok_or_else(|| {
        SweepError::shape_mismatch("exported image", image.dims.pixels(), image.samples.len())
    })
}

/// Square crop with top-left corner `(row, col)`, if it fits.
pub fn crop(buffer: &LumaBuffer, row: usize, col: usize, size: usize) -> Option<LumaBuffer> {
    let (width, height) = (buffer.width() as usize, buffer.height() as usize);
    if size == 0 || row + size > height || col + size > width {
        return None;
    }
    let (x, y, side) = (col as u32, row as u32, size as u32);
    Some(imageops::crop_imm(buffer, x, y, side, side).to_image())
}

/// Saves as 8-bit PNG up to 8 bits per sample, 16-bit PNG above.
pub fn save_png(path: &Path, buffer: &LumaBuffer, bit_depth: u8) -> Result<()> {
    let saved = if bit_depth <= 8 {
        let gray: GrayImage = ImageBuffer::from_fn(buffer.width(), buffer.height(), |x, y| {
            Luma([buffer.get_pixel(x, y)[0] as u8])
        });
        gray.save(path)
    } else {
        buffer.save(path)
    };
    saved.map_err(|e| SweepError::io(format!("failed to save {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn view(dims: ModelDims, samples: &[u16]) -> LumaView<'_> {
        LumaView {
            dims,
            bit_depth: 8,
            samples,
        }
    }

    fn config(crop_size: usize, crop_positions: Vec<[usize; 2]>, rotated: Vec<usize>) -> ExportConfig {
        ExportConfig {
            enabled: true,
            crop_size,
            crop_positions,
            rotated_images: rotated,
        }
    }

    #[test]
    fn test_crop_bounds() {
        let samples: Vec<u16> = (0..16).collect();
        let buffer = luma_buffer(view(ModelDims::new(4, 4), &samples)).unwrap();
        let c = crop(&buffer, 1, 2, 2).unwrap();
        assert_eq!(c.into_raw(), vec![6, 7, 10, 11]);
        assert!(crop(&buffer, 3, 0, 2).is_none());
        assert!(crop(&buffer, 0, 0, 0).is_none());
    }

    #[test]
    fn test_buffer_rejects_short_samples() {
        let samples = [0u16; 3];
        assert!(matches!(
            luma_buffer(view(ModelDims::new(2, 2), &samples)),
            Err(SweepError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rotation_is_clockwise() {
        // 1 2 3        4 1
        // 4 5 6   ->   5 2
        //              6 3
        let dir = tempdir().unwrap();
        let mut exporter = PngExporter::new(dir.path(), &config(1, vec![], vec![0]));
        let samples = [1u16, 2, 3, 4, 5, 6];
        exporter
            .accept("run", 0, view(ModelDims::new(2, 3), &samples))
            .unwrap();

        let saved = image::open(dir.path().join("run/reconstruction_0.png"))
            .unwrap()
            .into_luma8();
        assert_eq!(saved.dimensions(), (2, 3));
        assert_eq!(saved.into_raw(), vec![4, 1, 5, 2, 6, 3]);
    }

    #[test]
    fn test_sixteen_bit_samples_survive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep.png");
        let samples = [64u16, 940];
        let plane = LumaView {
            dims: ModelDims::new(1, 2),
            bit_depth: 10,
            samples: &samples,
        };
        save_png(&path, &luma_buffer(plane).unwrap(), 10).unwrap();
        let saved = image::open(&path).unwrap().into_luma16();
        assert_eq!(saved.into_raw(), vec![64, 940]);
    }

    #[test]
    fn test_exporter_layout() {
        let dir = tempdir().unwrap();
        let mut exporter = PngExporter::new(dir.path(), &config(2, vec![[0, 0], [10, 10]], vec![1]));
        let samples = [100u16; 16];
        exporter
            .accept("multiplier_1dot0", 1, view(ModelDims::new(4, 4), &samples))
            .unwrap();

        let out = dir.path().join("multiplier_1dot0");
        assert!(out.join("reconstruction_1.png").exists());
        assert!(out.join("reconstruction_1_crop_0.png").exists());
        assert!(!out.join("reconstruction_1_crop_1.png").exists());

        exporter.discard("multiplier_1dot0").unwrap();
        assert!(!out.exists());
        exporter.discard("never_written").unwrap();
    }

    /// Keeps labels until `refuse` is reached.
    #[derive(Default)]
    struct CountingSink {
        kept: Vec<(String, usize)>,
        refuse: Option<usize>,
    }

    impl ReconstructionSink for CountingSink {
        fn accept(&mut self, label: &str, image: usize, _reconstruction: LumaView<'_>) -> Result<()> {
            if self.refuse == Some(image) {
                return Err(SweepError::io("refused"));
            }
            self.kept.push((label.to_string(), image));
            Ok(())
        }

        fn discard(&mut self, label: &str) -> Result<()> {
            self.kept.retain(|(kept, _)| kept != label);
            Ok(())
        }
    }

    #[test]
    fn test_export_row_discards_partial_rows() {
        let cast = LumaImage {
            dims: ModelDims::new(1, 1),
            bit_depth: 8,
            samples: vec![16],
        };
        let row = vec![cast.clone(), cast.clone(), cast];
        let mut sink = CountingSink {
            kept: vec![("other".into(), 0)],
            refuse: Some(2),
        };

        let (failed_at, _) = export_row(&mut sink, "run", &row).unwrap_err();
        assert_eq!(failed_at, 2);
        assert_eq!(sink.kept, vec![("other".to_string(), 0)]);

        sink.refuse = None;
        export_row(&mut sink, "run", &row).unwrap();
        assert_eq!(sink.kept.len(), 4);
    }
}
