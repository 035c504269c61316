//! Image, latent and measurement types shared across the sweep.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};

/// Spatial dimensions a model session was declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelDims {
    /// Image height in pixels.
    pub height: usize,
    /// Image width in pixels.
    pub width: usize,
}

impl ModelDims {
    /// Create new dimensions.
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Number of pixels of one image.
    #[inline]
    pub const fn pixels(&self) -> usize {
        self.height * self.width
    }
}

impl std::fmt::Display for ModelDims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Ordered set of fixed-size single-channel images.
///
/// Samples are stored image after image, row-major, with one bit depth
/// shared by the whole set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuminanceImageSet {
    dims: ModelDims,
    bit_depth: u8,
    samples: Vec<u16>,
}

impl LuminanceImageSet {
    /// Create an image set, validating the sample count and bit depth.
    pub fn new(dims: ModelDims, bit_depth: u8, samples: Vec<u16>) -> Result<Self> {
        if !(1..=16).contains(&bit_depth) {
            return Err(SweepError::invalid_config(format!(
                "bit depth {bit_depth} outside 1..=16"
            )));
        }
        if dims.pixels() == 0 || samples.len() % dims.pixels() != 0 {
            return Err(SweepError::shape_mismatch(
                "image set",
                format!("a multiple of {} samples", dims.pixels()),
                samples.len(),
            ));
        }
        let max = max_sample(bit_depth);
        if let Some(bad) = samples.iter().find(|&&s| s > max) {
            return Err(SweepError::InvalidMeasurement(format!(
                "sample {bad} exceeds {bit_depth}-bit range"
            )));
        }
        Ok(Self {
            dims,
            bit_depth,
            samples,
        })
    }

    /// Build an 8-bit image set.
    pub fn from_u8(dims: ModelDims, samples: &[u8]) -> Result<Self> {
        Self::new(dims, 8, samples.iter().map(|&s| u16::from(s)).collect())
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.samples.len() / self.dims.pixels()
    }

    /// True if the set holds no image.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Image dimensions.
    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    /// Bits per sample.
    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    /// Borrow image `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn image(&self, index: usize) -> LumaView<'_> {
        let n = self.dims.pixels();
        LumaView {
            dims: self.dims,
            bit_depth: self.bit_depth,
            samples: &self.samples[index * n..(index + 1) * n],
        }
    }

    /// Iterate over all images in order.
    pub fn iter(&self) -> impl Iterator<Item = LumaView<'_>> {
        (0..self.len()).map(move |i| self.image(i))
    }
}

/// Largest sample value representable with `bit_depth` bits.
#[inline]
pub fn max_sample(bit_depth: u8) -> u16 {
    ((1u32 << bit_depth) - 1) as u16
}

/// Borrowed view of one luminance image.
#[derive(Debug, Clone, Copy)]
pub struct LumaView<'a> {
    /// Image dimensions.
    pub dims: ModelDims,
    /// Bits per sample.
    pub bit_depth: u8,
    /// Row-major samples.
    pub samples: &'a [u16],
}

/// Owned single luminance image, e.g. a cast reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LumaImage {
    /// Image dimensions.
    pub dims: ModelDims,
    /// Bits per sample.
    pub bit_depth: u8,
    /// Row-major samples.
    pub samples: Vec<u16>,
}

impl LumaImage {
    /// Borrow as a view.
    pub fn view(&self) -> LumaView<'_> {
        LumaView {
            dims: self.dims,
            bit_depth: self.bit_depth,
            samples: &self.samples,
        }
    }
}

/// Shape of a latent tensor `[image, row, col, channel]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LatentShape {
    pub images: usize,
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
}

impl LatentShape {
    /// Elements of one image's latent.
    #[inline]
    pub const fn per_image(&self) -> usize {
        self.rows * self.cols * self.channels
    }

    /// Total element count.
    #[inline]
    pub const fn len(&self) -> usize {
        self.images * self.per_image()
    }

    /// True if the shape holds no element.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for LatentShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.images, self.rows, self.cols, self.channels
        )
    }
}

/// Four-axis latent tensor with the channel axis innermost.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentTensor {
    shape: LatentShape,
    data: Vec<f32>,
}

impl LatentTensor {
    /// Wrap `data`, checking it matches `shape`.
    pub fn new(shape: LatentShape, data: Vec<f32>) -> Result<Self> {
        if data.len() != shape.len() {
            return Err(SweepError::shape_mismatch(
                "latent tensor",
                shape.len(),
                data.len(),
            ));
        }
        Ok(Self { shape, data })
    }

    /// All-zero tensor.
    pub fn zeros(shape: LatentShape) -> Self {
        Self {
            shape,
            data: vec![0.0; shape.len()],
        }
    }

    pub fn shape(&self) -> LatentShape {
        self.shape
    }

    pub fn channels(&self) -> usize {
        self.shape.channels
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Borrow the latent of image `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= shape.images`.
    pub fn image(&self, index: usize) -> LatentView<'_> {
        let n = self.shape.per_image();
        LatentView {
            rows: self.shape.rows,
            cols: self.shape.cols,
            channels: self.shape.channels,
            data: &self.data[index * n..(index + 1) * n],
        }
    }
}

/// Borrowed latent of a single image `[row, col, channel]`.
#[derive(Debug, Clone, Copy)]
pub struct LatentView<'a> {
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
    pub data: &'a [f32],
}

impl<'a> LatentView<'a> {
    /// Iterate over the values of one channel in raster order.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + 'a {
        self.data
            .iter()
            .skip(channel)
            .step_by(self.channels.max(1))
            .copied()
    }
}

/// Floating-point decoder output for a batch of images.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    dims: ModelDims,
    data: Vec<f32>,
}

impl Reconstruction {
    /// Wrap decoder output, checking it holds whole images.
    pub fn new(dims: ModelDims, data: Vec<f32>) -> Result<Self> {
        if dims.pixels() == 0 || data.len() % dims.pixels() != 0 {
            return Err(SweepError::shape_mismatch(
                "reconstruction",
                format!("a multiple of {} samples", dims.pixels()),
                data.len(),
            ));
        }
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.data.len() / self.dims.pixels()
    }

    /// True if there is no image.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow image `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn image(&self, index: usize) -> FloatPlane<'_> {
        let n = self.dims.pixels();
        FloatPlane {
            dims: self.dims,
            samples: &self.data[index * n..(index + 1) * n],
        }
    }
}

/// Borrowed floating-point image.
#[derive(Debug, Clone, Copy)]
pub struct FloatPlane<'a> {
    pub dims: ModelDims,
    pub samples: &'a [f32],
}

/// One rate-distortion measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateDistortionPoint {
    /// Bits per pixel, finite and non-negative.
    pub rate: f64,
    /// PSNR in dB, finite or `+inf`.
    pub psnr: f64,
}

impl RateDistortionPoint {
    /// Create a point, rejecting values outside their domain.
    pub fn new(rate: f64, psnr: f64) -> Result<Self> {
        if !rate.is_finite() || rate < 0.0 {
            return Err(SweepError::InvalidMeasurement(format!(
                "rate {rate} is not a finite non-negative number"
            )));
        }
        if psnr.is_nan() || psnr == f64::NEG_INFINITY {
            return Err(SweepError::InvalidMeasurement(format!(
                "psnr {psnr} is neither finite nor +inf"
            )));
        }
        Ok(Self { rate, psnr })
    }
}
