//! Scoped ownership of the one resident model.
//!
//! A [`ModelSession`] wraps a [`ModelBackend`] and hands out leases. A lease
//! mutably borrows the session, so a second model cannot be acquired while
//! one is resident, and dropping the lease tears the backend context down on
//! every exit path, unwinding included.
//!
//! ```text
//! session.acquire_encoder() ──▶ EncoderLease ──encode──▶ LatentTensor
//!            ▲                        │
//!            └──── teardown ◀──── drop / release
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use rdsweep_core::{
    LatentShape, LatentTensor, LuminanceImageSet, ModelDims, Reconstruction, Result, SweepError,
};

/// A loaded encoder.
pub trait LatentEncoder {
    /// Encodes every image of the set into one latent tensor.
    fn encode(&mut self, images: &LuminanceImageSet) -> Result<LatentTensor>;

    /// Bin widths the checkpoint was trained with, one per latent channel.
    fn trained_bin_widths(&self) -> &[f32];
}

/// A loaded decoder.
pub trait LatentDecoder {
    /// Latent shape of a single image this decoder accepts. `images` is 1.
    fn latent_shape(&self) -> LatentShape;

    fn decode(&mut self, latent: &LatentTensor) -> Result<Reconstruction>;
}

/// Loads models from checkpoints into an isolated computation context.
pub trait ModelBackend {
    type Encoder: LatentEncoder;
    type Decoder: LatentDecoder;

    fn load_encoder(&mut self, checkpoint: &Path, dims: ModelDims) -> Result<Self::Encoder>;

    fn load_decoder(&mut self, checkpoint: &Path, dims: ModelDims) -> Result<Self::Decoder>;

    /// Destroys all state of the current context.
    fn teardown(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelKind {
    Encoder,
    Decoder,
}

#[derive(Debug, Clone)]
struct Resident {
    kind: ModelKind,
    checkpoint: PathBuf,
}

/// Owner of a backend and of at most one resident model.
pub struct ModelSession<B: ModelBackend> {
    backend: B,
    resident: Option<Resident>,
}

impl<B: ModelBackend> ModelSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            resident: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// True while a lease is alive, or after a lease was leaked.
    pub fn is_resident(&self) -> bool {
        self.resident.is_some()
    }

    /// Loads the encoder of `checkpoint` for images of size `dims`.
    pub fn acquire_encoder(
        &mut self,
        checkpoint: &Path,
        dims: ModelDims,
    ) -> Result<EncoderLease<'_, B>> {
        self.evict_stale();
        let encoder = self.load(ModelKind::Encoder, checkpoint, |backend| {
            backend.load_encoder(checkpoint, dims)
        })?;
        Ok(EncoderLease {
            session: self,
            encoder: Some(encoder),
            dims,
        })
    }

    /// Loads the decoder of `checkpoint` producing images of size `dims`.
    pub fn acquire_decoder(
        &mut self,
        checkpoint: &Path,
        dims: ModelDims,
    ) -> Result<DecoderLease<'_, B>> {
        self.evict_stale();
        let decoder = self.load(ModelKind::Decoder, checkpoint, |backend| {
            backend.load_decoder(checkpoint, dims)
        })?;
        Ok(DecoderLease {
            session: self,
            decoder: Some(decoder),
            dims,
        })
    }

    fn load<M>(
        &mut self,
        kind: ModelKind,
        checkpoint: &Path,
        load: impl FnOnce(&mut B) -> Result<M>,
    ) -> Result<M> {
        match load(&mut self.backend) {
            Ok(model) => {
                debug!(?kind, checkpoint = %checkpoint.display(), "model acquired");
                self.resident = Some(Resident {
                    kind,
                    checkpoint: checkpoint.to_path_buf(),
                });
                Ok(model)
            }
            Err(e) => {
                // A failed load may leave partial state behind.
                self.backend.teardown();
                Err(e)
            }
        }
    }

    /// Tears down a context whose lease never ran its destructor.
    fn evict_stale(&mut self) {
        if let Some(stale) = self.resident.take() {
            warn!(
                kind = ?stale.kind,
                checkpoint = %stale.checkpoint.display(),
                "tearing down a model whose lease was leaked"
            );
            self.backend.teardown();
        }
    }

    fn release(&mut self) {
        if let Some(resident) = self.resident.take() {
            self.backend.teardown();
            debug!(kind = ?resident.kind, checkpoint = %resident.checkpoint.display(), "model released");
        }
    }
}

impl<B: ModelBackend> Drop for ModelSession<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A resident encoder. Released on drop.
pub struct EncoderLease<'s, B: ModelBackend> {
    session: &'s mut ModelSession<B>,
    encoder: Option<B::Encoder>,
    dims: ModelDims,
}

impl<B: ModelBackend> EncoderLease<'_, B> {
    /// Encodes `images`, which must match the declared image size.
    pub fn encode(&mut self, images: &LuminanceImageSet) -> Result<LatentTensor> {
        if images.dims() != self.dims {
            return Err(SweepError::shape_mismatch(
                "encoder input",
                self.dims,
                images.dims(),
            ));
        }
        let encoder = self.encoder.as_mut().ok_or_else(released)?;
        let latent = encoder.encode(images)?;
        if latent.shape().images != images.len() {
            return Err(SweepError::shape_mismatch(
                "encoder output images",
                images.len(),
                latent.shape().images,
            ));
        }
        Ok(latent)
    }

    pub fn trained_bin_widths(&self) -> &[f32] {
        self.encoder
            .as_ref()
            .map(|e| e.trained_bin_widths())
            .unwrap_or(&[])
    }

    /// Releases the encoder now rather than at the end of scope.
    pub fn release(self) {}
}

impl<B: ModelBackend> Drop for EncoderLease<'_, B> {
    fn drop(&mut self) {
        self.encoder.take();
        self.session.release();
    }
}

/// A resident decoder. Released on drop.
pub struct DecoderLease<'s, B: ModelBackend> {
    session: &'s mut ModelSession<B>,
    decoder: Option<B::Decoder>,
    dims: ModelDims,
}

impl<B: ModelBackend> DecoderLease<'_, B> {
    /// Decodes `latent`, whose per-image shape must match the decoder's.
    pub fn decode(&mut self, latent: &LatentTensor) -> Result<Reconstruction> {
        let decoder = self.decoder.as_mut().ok_or_else(released)?;
        let expected = decoder.latent_shape();
        let actual = latent.shape();
        if (actual.rows, actual.cols, actual.channels)
            != (expected.rows, expected.cols, expected.channels)
        {
            return Err(SweepError::shape_mismatch(
                "decoder input",
                LatentShape {
                    images: actual.images,
                    ..expected
                },
                actual,
            ));
        }

        let reconstruction = decoder.decode(latent)?;
        if reconstruction.dims() != self.dims || reconstruction.len() != actual.images {
            return Err(SweepError::shape_mismatch(
                "decoder output",
                format!("{} images of {}", actual.images, self.dims),
                format!("{} images of {}", reconstruction.len(), reconstruction.dims()),
            ));
        }
        Ok(reconstruction)
    }

    pub fn release(self) {}
}

impl<B: ModelBackend> Drop for DecoderLease<'_, B> {
    fn drop(&mut self) {
        self.decoder.take();
        self.session.release();
    }
}

fn released() -> SweepError {
    SweepError::invalid_config("model lease used after release")
}
