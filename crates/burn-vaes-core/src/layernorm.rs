//! Layer normalization over the last dimension
//!
//! Pre-norm for the token transformer and the patch output head.

use burn::module::Param;
use burn::prelude::*;

/// Layer normalization module
///
/// ```text
/// y = (x - mean(x)) / sqrt(var(x) + eps) * weight + bias
/// ```
#[derive(Module, Debug)]
pub struct LayerNorm<B: Backend> {
    /// Scale parameter
    pub weight: Param<Tensor<B, 1>>,
    /// Shift parameter
    pub bias: Param<Tensor<B, 1>>,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl<B: Backend> LayerNorm<B> {
    /// Creates a layer norm over a last dimension of size `size`
    pub fn new(size: usize, device: &B::Device) -> Self {
        Self {
            weight: Param::from_tensor(Tensor::ones([size], device)),
            bias: Param::from_tensor(Tensor::zeros([size], device)),
            eps: 1e-5,
        }
    }

    /// Normalizes the last dimension of a tensor of any rank
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let last_dim = D - 1;
        let (var, mean) = x.clone().var_mean_bias(last_dim);

        let x_norm = (x - mean) / (var + self.eps).sqrt();

        x_norm * self.weight.val().unsqueeze() + self.bias.val().unsqueeze()
    }
}
