//! A deterministic block-transform model.
//!
//! Checkpoints are small JSON files. The encoder maps every `B × B` block of
//! an image to `B²` orthonormal DCT coefficients, one latent channel per
//! coefficient; the decoder inverts it. Quantizing the coefficients behaves
//! like a learned transform codec with a known rate-distortion trade-off,
//! which makes it useful for exercising a sweep end to end.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::trace;

use rdsweep_core::quantize::validate_bin_widths;
use rdsweep_core::transform::{dct_2d, idct_2d};
use rdsweep_core::{
    LatentShape, LatentTensor, LuminanceImageSet, ModelDims, Reconstruction, Result, SweepError,
};

use crate::session::{LatentDecoder, LatentEncoder, ModelBackend};

/// Serialized parameters of a block-transform model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockCheckpoint {
    /// Side of the square transform block.
    pub block_size: usize,
    /// Trained bin width of each of the `block_size²` channels.
    pub bin_widths: Vec<f32>,
}

impl BlockCheckpoint {
    /// Checkpoint with the same bin width for every channel.
    pub fn uniform(block_size: usize, bin_width: f32) -> Self {
        Self {
            block_size,
            bin_widths: vec![bin_width; block_size * block_size],
        }
    }

    /// Saves via a temp file and an atomic rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        let file = File::create(&temp_path)
            .map_err(|e| SweepError::io(format!("failed to create checkpoint temp file: {e}")))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        fs::rename(&temp_path, path)
            .map_err(|e| SweepError::io(format!("failed to rename checkpoint: {e}")))?;
        Ok(())
    }

    /// Loads and validates a checkpoint. Every failure is a `ModelLoad`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SweepError::model_load(path, e.to_string()))?;
        let checkpoint: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| SweepError::model_load(path, format!("corrupt checkpoint: {e}")))?;

        if checkpoint.block_size == 0 {
            return Err(SweepError::model_load(path, "block size is zero"));
        }
        let channels = checkpoint.block_size * checkpoint.block_size;
        if checkpoint.bin_widths.len() != channels {
            return Err(SweepError::model_load(
                path,
                format!(
                    "{} bin widths for {} channels",
                    checkpoint.bin_widths.len(),
                    channels
                ),
            ));
        }
        validate_bin_widths(&checkpoint.bin_widths)
            .map_err(|e| SweepError::model_load(path, e.to_string()))?;
        Ok(checkpoint)
    }

    fn latent_shape(&self, path: &Path, dims: ModelDims) -> Result<LatentShape> {
        let b = self.block_size;
        if dims.height % b != 0 || dims.width % b != 0 {
            return Err(SweepError::model_load(
                path,
                format!("image size {dims} is not a multiple of the block size {b}"),
            ));
        }
        Ok(LatentShape {
            images: 1,
            rows: dims.height / b,
            cols: dims.width / b,
            channels: b * b,
        })
    }
}

/// Backend for [`BlockCheckpoint`] models.
///
/// Counts loads and teardowns, and the number of models loaded since the
/// last teardown, so callers can observe the session lifecycle.
#[derive(Debug, Default)]
pub struct BlockTransformBackend {
    loads: usize,
    teardowns: usize,
    live: usize,
    peak_live: usize,
}

impl BlockTransformBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns
    }

    /// Models loaded since the last teardown.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Highest value `live` ever reached.
    pub fn peak_live(&self) -> usize {
        self.peak_live
    }

    fn track_load(&mut self) {
        self.loads += 1;
        self.live += 1;
        self.peak_live = self.peak_live.max(self.live);
    }
}

impl ModelBackend for BlockTransformBackend {
    type Encoder = BlockEncoder;
    type Decoder = BlockDecoder;

    fn load_encoder(&mut self, checkpoint: &Path, dims: ModelDims) -> Result<BlockEncoder> {
        let params = BlockCheckpoint::load(checkpoint)?;
        let shape = params.latent_shape(checkpoint, dims)?;
        self.track_load();
        Ok(BlockEncoder {
            block_size: params.block_size,
            bin_widths: params.bin_widths,
            shape,
        })
    }

    fn load_decoder(&mut self, checkpoint: &Path, dims: ModelDims) -> Result<BlockDecoder> {
        let params = BlockCheckpoint::load(checkpoint)?;
        let shape = params.latent_shape(checkpoint, dims)?;
        self.track_load();
        Ok(BlockDecoder {
            block_size: params.block_size,
            dims,
            shape,
        })
    }

    fn teardown(&mut self) {
        self.teardowns += 1;
        self.live = 0;
    }
}

/// Forward block DCT.
#[derive(Debug)]
pub struct BlockEncoder {
    block_size: usize,
    bin_widths: Vec<f32>,
    shape: LatentShape,
}

impl LatentEncoder for BlockEncoder {
    fn encode(&mut self, images: &LuminanceImageSet) -> Result<LatentTensor> {
        let b = self.block_size;
        let dims = images.dims();
        let shape = LatentShape {
            images: images.len(),
            ..self.shape
        };
        let mut latent = LatentTensor::zeros(shape);
        let per_image = shape.per_image();

        let mut block = vec![0.0f32; b * b];
        let mut coeffs = vec![0.0f32; b * b];
        let data = latent.as_mut_slice();

        for (index, image) in images.iter().enumerate() {
            let out = &mut data[index * per_image..(index + 1) * per_image];
            for row in 0..shape.rows {
                for col in 0..shape.cols {
                    for y in 0..b {
                        let start = (row * b + y) * dims.width + col * b;
                        for (x, v) in block[y * b..(y + 1) * b].iter_mut().enumerate() {
                            *v = f32::from(image.samples[start + x]);
                        }
                    }
                    dct_2d(&block, &mut coeffs, b);
                    let at = (row * shape.cols + col) * shape.channels;
                    out[at..at + shape.channels].copy_from_slice(&coeffs);
                }
            }
        }

        trace!(shape = %shape, "block transform encoded");
        Ok(latent)
    }

    fn trained_bin_widths(&self) -> &[f32] {
        &self.bin_widths
    }
}

/// Inverse block DCT.
#[derive(Debug)]
pub struct BlockDecoder {
    block_size: usize,
    dims: ModelDims,
    shape: LatentShape,
}

impl LatentDecoder for BlockDecoder {
    fn latent_shape(&self) -> LatentShape {
        self.shape
    }

    fn decode(&mut self, latent: &LatentTensor) -> Result<Reconstruction> {
        let b = self.block_size;
        let shape = latent.shape();
        let pixels = self.dims.pixels();
        let mut samples = vec![0.0f32; shape.images * pixels];
        let mut block = vec![0.0f32; b * b];

        for index in 0..shape.images {
            let view = latent.image(index);
            let out = &mut samples[index * pixels..(index + 1) * pixels];
            for row in 0..shape.rows {
                for col in 0..shape.cols {
                    let at = (row * shape.cols + col) * shape.channels;
                    idct_2d(&view.data[at..at + shape.channels], &mut block, b);
                    for y in 0..b {
                        let start = (row * b + y) * self.dims.width + col * b;
                        out[start..start + b].copy_from_slice(&block[y * b..(y + 1) * b]);
                    }
                }
            }
        }

        Reconstruction::new(self.dims, samples)
    }
}
