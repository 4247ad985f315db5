//! Encoder/decoder pairing with optional latent noise
//!
//! Both families implement [`Autoencoder`]; the provided `forward` encodes,
//! optionally noises the latent, decodes, and returns the clean latent
//! alongside the reconstruction.

use burn::prelude::*;
use burn::tensor::Distribution;

use crate::error::Result;

/// Adds N(0, std²) noise elementwise, or returns `z` untouched when `std` is 0
pub fn add_latent_noise<B: Backend, const D: usize>(z: Tensor<B, D>, std: f64) -> Tensor<B, D> {
    if std > 0.0 {
        tracing::trace!(std, shape = ?z.dims(), "noising decoder input");
        let noise = Tensor::random(z.shape(), Distribution::Normal(0.0, std), &z.device());
        z + noise
    } else {
        z
    }
}

/// An encoder/decoder pair built from one configuration
///
/// `D` is the latent rank: 4 for spatial latents, 3 for token latents.
pub trait Autoencoder<B: Backend, const D: usize> {
    /// Image `[batch, channels, height, width]` to latent
    fn encode(&self, x: Tensor<B, 4>) -> Result<Tensor<B, D>>;

    /// Latent to image `[batch, channels, height, width]`
    fn decode(&self, z: Tensor<B, D>) -> Result<Tensor<B, 4>>;

    /// Std of the noise injected between encoder and decoder
    fn noise_decoder_inputs(&self) -> f64;

    /// Returns `(reconstruction, z)` where `z` is the pre-noise latent
    fn forward(&self, x: Tensor<B, 4>) -> Result<(Tensor<B, 4>, Tensor<B, D>)> {
        let z = self.encode(x)?;
        let dec_input = add_latent_noise(z.clone(), self.noise_decoder_inputs());
        let rec = self.decode(dec_input)?;
        Ok((rec, z))
    }
}
