//! Bidirectional transformer stack
//!
//! Pre-norm encoder blocks shared by the token encoder and decoder. There is
//! no causal mask: every position attends to every other position.

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{gelu, softmax};

use crate::layernorm::LayerNorm;

/// Multi-head self-attention without masking
#[derive(Module, Debug)]
pub struct MultiHeadAttention<B: Backend> {
    /// Fused query/key/value projection
    pub qkv: Linear<B>,
    /// Output projection
    pub out: Linear<B>,
    pub num_heads: usize,
    pub head_dim: usize,
}

impl<B: Backend> MultiHeadAttention<B> {
    /// `d_model` must be divisible by `num_heads`
    pub fn new(d_model: usize, num_heads: usize, device: &B::Device) -> Self {
        Self {
            qkv: LinearConfig::new(d_model, d_model * 3)
                .with_bias(false)
                .init(device),
            out: LinearConfig::new(d_model, d_model)
                .with_bias(false)
                .init(device),
            num_heads,
            head_dim: d_model / num_heads,
        }
    }

    /// `[batch, seq_len, d_model]` → `[batch, seq_len, d_model]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, seq_len, d_model] = x.dims();

        // [b, n, 3d] -> [3, b, heads, n, head_dim]
        let qkv = self
            .qkv
            .forward(x)
            .reshape([batch, seq_len, 3, self.num_heads, self.head_dim])
            .permute([2, 0, 3, 1, 4]);

        let take = |i: usize| {
            qkv.clone()
                .slice([i..i + 1])
                .reshape([batch, self.num_heads, seq_len, self.head_dim])
        };
        let (q, k, v) = (take(0), take(1), take(2));

        let scale = (self.head_dim as f64).powf(-0.5);
        let attn = softmax(q.matmul(k.transpose()) * scale, 3);
        let out = attn.matmul(v);

        let out = out.swap_dims(1, 2).reshape([batch, seq_len, d_model]);
        self.out.forward(out)
    }
}

/// Two-layer GELU feed-forward network with 4x expansion
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> Mlp<B> {
    pub fn new(d_model: usize, device: &B::Device) -> Self {
        let hidden = d_model * 4;
        Self {
            fc1: LinearConfig::new(d_model, hidden).init(device),
            fc2: LinearConfig::new(hidden, d_model).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.fc2.forward(gelu(self.fc1.forward(x)))
    }
}

/// Pre-norm transformer block
///
/// ```text
/// x = x + attn(norm1(x))
/// x = x + mlp(norm2(x))
/// ```
#[derive(Module, Debug)]
pub struct TransformerBlock<B: Backend> {
    pub norm1: LayerNorm<B>,
    pub attn: MultiHeadAttention<B>,
    pub norm2: LayerNorm<B>,
    pub mlp: Mlp<B>,
}

impl<B: Backend> TransformerBlock<B> {
    pub fn new(d_model: usize, num_heads: usize, device: &B::Device) -> Self {
        Self {
            norm1: LayerNorm::new(d_model, device),
            attn: MultiHeadAttention::new(d_model, num_heads, device),
            norm2: LayerNorm::new(d_model, device),
            mlp: Mlp::new(d_model, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let h = x.clone() + self.attn.forward(self.norm1.forward(x));
        h.clone() + self.mlp.forward(self.norm2.forward(h))
    }
}

/// Configuration for [`StackedTransformer`]
#[derive(Debug, Clone, Copy)]
pub struct StackedTransformerConfig {
    pub n_layers: usize,
    pub n_heads: usize,
    pub d_model: usize,
}

impl StackedTransformerConfig {
    pub fn new(n_layers: usize, n_heads: usize, d_model: usize) -> Self {
        Self {
            n_layers,
            n_heads,
            d_model,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> StackedTransformer<B> {
        StackedTransformer {
            layers: (0..self.n_layers)
                .map(|_| TransformerBlock::new(self.d_model, self.n_heads, device))
                .collect(),
        }
    }
}

/// `n_layers` transformer blocks applied in sequence
#[derive(Module, Debug)]
pub struct StackedTransformer<B: Backend> {
    pub layers: Vec<TransformerBlock<B>>,
}

impl<B: Backend> StackedTransformer<B> {
    pub fn forward(&self, mut x: Tensor<B, 3>) -> Tensor<B, 3> {
        for layer in &self.layers {
            x = layer.forward(x);
        }
        x
    }
}
