//! Group normalization for convolutional feature maps
//!
//! Channels are split into groups and each group is normalized over its
//! channels and spatial extent. Used by the residual stacks and the output
//! head of the convolutional decoder.

use burn::module::Param;
use burn::prelude::*;
use burn::tensor::DType;

/// Largest group count used when picking groups automatically
pub const MAX_GROUPS: usize = 32;

/// Group normalization module
///
/// # Formula
///
/// For input with C channels divided into G groups:
/// ```text
/// y = (x - mean(x_group)) / sqrt(var(x_group) + eps) * weight + bias
/// ```
#[derive(Module, Debug)]
pub struct GroupNorm<B: Backend> {
    /// Number of groups to divide channels into
    pub num_groups: usize,
    /// Scale parameter (gamma), shape [num_channels]
    pub weight: Param<Tensor<B, 1>>,
    /// Bias parameter (beta), shape [num_channels]
    pub bias: Param<Tensor<B, 1>>,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl<B: Backend> GroupNorm<B> {
    /// Creates a group norm with an explicit group count
    ///
    /// `num_channels` must be divisible by `num_groups`.
    pub fn new(num_groups: usize, num_channels: usize, device: &B::Device) -> Self {
        debug_assert!(
            num_groups > 0 && num_channels % num_groups == 0,
            "{num_channels} channels cannot be split into {num_groups} groups"
        );
        Self {
            num_groups,
            weight: Param::from_tensor(Tensor::ones([num_channels], device)),
            bias: Param::from_tensor(Tensor::zeros([num_channels], device)),
            eps: 1e-6,
        }
    }

    /// Creates a group norm with the largest group count (at most 32)
    /// that evenly divides `num_channels`
    pub fn for_channels(num_channels: usize, device: &B::Device) -> Self {
        Self::new(group_count(num_channels), num_channels, device)
    }

    /// Normalizes a `[batch, channels, height, width]` tensor
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, height, width] = x.dims();
        let group_size = channels / self.num_groups;

        let x = x.reshape([batch, self.num_groups, group_size * height * width]);

        // Statistics in f32 so half-precision backends don't overflow the reduction
        let dtype = x.dtype();
        let x_f32 = x.clone().cast(DType::F32);
        let mean = x_f32.clone().mean_dim(2);
        let diff = x_f32 - mean.clone();
        let var = (diff.clone() * diff).mean_dim(2);

        let mean = mean.cast(dtype);
        let var = var.cast(dtype);

        let x = (x - mean) / (var + self.eps).sqrt();
        let x = x.reshape([batch, channels, height, width]);

        let weight = self.weight.val().reshape([1, channels, 1, 1]);
        let bias = self.bias.val().reshape([1, channels, 1, 1]);

        x * weight + bias
    }
}

/// Largest divisor of `num_channels` that is at most [`MAX_GROUPS`]
pub fn group_count(num_channels: usize) -> usize {
    (1..=MAX_GROUPS.min(num_channels.max(1)))
        .rev()
        .find(|g| num_channels % g == 0)
        .unwrap_or(1)
}
