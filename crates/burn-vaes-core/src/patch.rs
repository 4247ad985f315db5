//! Patch projections between images and token sequences
//!
//! [`PatchProjIn`] slices an image into non-overlapping `p×p` patches and
//! embeds each to model width; [`PatchProjOut`] maps tokens back to patch
//! pixels and tiles them into the full image. Tokens are ordered row-major
//! over the patch grid.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::silu;

use crate::layernorm::LayerNorm;

/// `[B, C, H, W]` → `[B, (H/p)*(W/p), C*p*p]`
pub fn patchify<B: Backend>(x: Tensor<B, 4>, patch_size: usize) -> Tensor<B, 3> {
    let [batch, channels, height, width] = x.dims();
    let (gh, gw) = (height / patch_size, width / patch_size);

    // [B, C, gh, p, gw, p] -> [B, gh, gw, C, p, p]
    x.reshape([batch, channels, gh, patch_size, gw, patch_size])
        .permute([0, 2, 4, 1, 3, 5])
        .reshape([batch, gh * gw, channels * patch_size * patch_size])
}

/// Inverse of [`patchify`]: `[B, (H/p)*(W/p), C*p*p]` → `[B, C, H, W]`
pub fn unpatchify<B: Backend>(
    x: Tensor<B, 3>,
    patch_size: usize,
    channels: usize,
    height: usize,
    width: usize,
) -> Tensor<B, 4> {
    let [batch, _num_patches, _patch_dim] = x.dims();
    let (gh, gw) = (height / patch_size, width / patch_size);

    // [B, gh, gw, C, p, p] -> [B, C, gh, p, gw, p]
    x.reshape([batch, gh, gw, channels, patch_size, patch_size])
        .permute([0, 3, 1, 4, 2, 5])
        .reshape([batch, channels, height, width])
}

/// Image to patch tokens
#[derive(Module, Debug)]
pub struct PatchProjIn<B: Backend> {
    pub proj: Linear<B>,
    pub patch_size: usize,
}

impl<B: Backend> PatchProjIn<B> {
    pub fn new(d_model: usize, channels: usize, patch_size: usize, device: &B::Device) -> Self {
        let patch_dim = channels * patch_size * patch_size;
        Self {
            proj: LinearConfig::new(patch_dim, d_model).init(device),
            patch_size,
        }
    }

    /// `[B, C, H, W]` → `[B, num_patches, d_model]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 3> {
        self.proj.forward(patchify(x, self.patch_size))
    }
}

/// Patch tokens to image: norm, SiLU, linear to patch pixels, unpatchify
#[derive(Module, Debug)]
pub struct PatchProjOut<B: Backend> {
    pub norm: LayerNorm<B>,
    pub proj: Linear<B>,
    pub sample_size: usize,
    pub channels: usize,
    pub patch_size: usize,
}

impl<B: Backend> PatchProjOut<B> {
    pub fn new(
        sample_size: usize,
        d_model: usize,
        channels: usize,
        patch_size: usize,
        device: &B::Device,
    ) -> Self {
        let patch_dim = channels * patch_size * patch_size;
        Self {
            norm: LayerNorm::new(d_model, device),
            proj: LinearConfig::new(d_model, patch_dim).init(device),
            sample_size,
            channels,
            patch_size,
        }
    }

    /// `[B, num_patches, d_model]` → `[B, C, sample_size, sample_size]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let x = silu(self.norm.forward(x));
        let x = self.proj.forward(x);
        unpatchify(
            x,
            self.patch_size,
            self.channels,
            self.sample_size,
            self.sample_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_patchify_token_order() {
        let device = Default::default();
        // 1 channel 4x4 image, 2x2 patches
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let x = Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device).reshape([1, 1, 4, 4]);

        let tokens = patchify(x, 2);
        assert_eq!(tokens.dims(), [1, 4, 4]);

        let values: Vec<f32> = tokens.into_data().to_vec().unwrap();
        // Top-left patch first, then top-right
        assert_eq!(&values[..8], &[0.0, 1.0, 4.0, 5.0, 2.0, 3.0, 6.0, 7.0]);
    }

    #[test]
    fn test_unpatchify_inverts_patchify() {
        let device = Default::default();
        let data: Vec<f32> = (0..2 * 3 * 8 * 8).map(|v| v as f32).collect();
        let x = Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device).reshape([2, 3, 8, 8]);

        let image = unpatchify(patchify(x, 4), 4, 3, 8, 8);
        let restored: Vec<f32> = image.into_data().to_vec().unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_patch_projections_shape() {
        let device = Default::default();
        let proj_in = PatchProjIn::<TestBackend>::new(32, 3, 4, &device);
        let proj_out = PatchProjOut::<TestBackend>::new(16, 32, 3, 4, &device);

        let x = Tensor::zeros([2, 3, 16, 16], &device);
        let tokens = proj_in.forward(x);
        assert_eq!(tokens.dims(), [2, 16, 32]);

        let image = proj_out.forward(tokens);
        assert_eq!(image.dims(), [2, 3, 16, 16]);
    }
}
