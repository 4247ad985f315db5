//! Learned embedding tables
//!
//! Positional encodings and the learned latent/image token banks of the
//! token autoencoder are both plain `[n, d]` parameters drawn from N(0, 0.02).

use burn::module::Param;
use burn::nn::Initializer;
use burn::prelude::*;

/// Std of the normal init used for every learned table
pub const EMBED_INIT_STD: f64 = 0.02;

/// Creates an `[n, d]` parameter initialized from N(0, 0.02)
pub fn learned_table<B: Backend>(n: usize, d: usize, device: &B::Device) -> Param<Tensor<B, 2>> {
    Initializer::Normal {
        mean: 0.0,
        std: EMBED_INIT_STD,
    }
    .init([n, d], device)
}

/// Broadcasts an `[n, d]` table to `[batch, n, d]`
pub fn expand_batch<B: Backend>(table: Tensor<B, 2>, batch: usize) -> Tensor<B, 3> {
    table.unsqueeze::<3>().repeat_dim(0, batch)
}

/// Learned absolute positional encoding added to a token sequence
#[derive(Module, Debug)]
pub struct LearnedPosEnc<B: Backend> {
    /// Position table, shape `[max_len, d_model]`
    pub table: Param<Tensor<B, 2>>,
}

impl<B: Backend> LearnedPosEnc<B> {
    pub fn new(max_len: usize, d_model: usize, device: &B::Device) -> Self {
        Self {
            table: learned_table(max_len, d_model, device),
        }
    }

    /// Adds the encoding for positions `0..seq_len` to `[batch, seq_len, d_model]`
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, seq_len, d_model] = x.dims();
        let pos = self.table.val().slice([0..seq_len, 0..d_model]);
        x + expand_batch(pos, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_pos_enc_is_per_position() {
        let device = Default::default();
        let pos = LearnedPosEnc::<TestBackend>::new(8, 4, &device);

        let x = Tensor::zeros([3, 8, 4], &device);
        let y = pos.forward(x);
        assert_eq!(y.dims(), [3, 8, 4]);

        // Every batch item receives the same table
        let first: Vec<f32> = y.clone().slice([0..1]).into_data().to_vec().unwrap();
        let last: Vec<f32> = y.slice([2..3]).into_data().to_vec().unwrap();
        assert_eq!(first, last);

        let table: Vec<f32> = pos.table.val().into_data().to_vec().unwrap();
        assert_eq!(first, table);
    }

    #[test]
    fn test_learned_table_scale() {
        let device = Default::default();
        let table = learned_table::<TestBackend>(64, 64, &device);
        let values: Vec<f32> = table.val().into_data().to_vec().unwrap();

        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
        assert!(mean.abs() < 0.01);
        assert!((var.sqrt() - 0.02).abs() < 0.005);
    }
}
