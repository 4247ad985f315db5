//! Space↔channel rearrangements
//!
//! Pixel (un)shuffle, the learned fold/unfold shortcuts built on top of
//! them, and the parameter-free channel average / repeat transforms used
//! around the latent bottleneck.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;

/// Spatial factor of a single fold or unfold
pub const FOLD_FACTOR: usize = 2;

/// Pixel unshuffle: `[B, C, H*r, W*r]` → `[B, C*r², H, W]`
///
/// Output channel `c*r² + i*r + j` holds the pixel at offset `(i, j)` of
/// each `r×r` cell of input channel `c`.
pub fn pixel_unshuffle<B: Backend>(x: Tensor<B, 4>, r: usize) -> Tensor<B, 4> {
    let [b, c, h, w] = x.dims();
    let (oh, ow) = (h / r, w / r);

    x.reshape([b, c, oh, r, ow, r])
        .permute([0, 1, 3, 5, 2, 4])
        .reshape([b, c * r * r, oh, ow])
}

/// Pixel shuffle: `[B, C*r², H, W]` → `[B, C, H*r, W*r]`, inverse of
/// [`pixel_unshuffle`]
pub fn pixel_shuffle<B: Backend>(x: Tensor<B, 4>, r: usize) -> Tensor<B, 4> {
    let [b, c, h, w] = x.dims();
    let oc = c / (r * r);

    x.reshape([b, oc, r, r, h, w])
        .permute([0, 1, 4, 2, 5, 3])
        .reshape([b, oc, h * r, w * r])
}

/// Averages `[B, rep*C, H, W]` down to `[B, C, H, W]`
///
/// Channel `c` of the output is the mean of input channels
/// `c, C + c, 2C + c, ...`.
pub fn channel_average<B: Backend>(x: Tensor<B, 4>, out_channels: usize) -> Tensor<B, 4> {
    let [b, c, h, w] = x.dims();
    let rep = c / out_channels;

    x.reshape([b, rep, out_channels, h, w])
        .mean_dim(1)
        .reshape([b, out_channels, h, w])
}

/// Tiles `[B, C, H, W]` to `[B, rep*C, H, W]`, the broadcast counterpart of
/// [`channel_average`]
pub fn channel_repeat<B: Backend>(x: Tensor<B, 4>, rep: usize) -> Tensor<B, 4> {
    let [b, c, h, w] = x.dims();

    x.unsqueeze_dim::<5>(1)
        .repeat_dim(1, rep)
        .reshape([b, rep * c, h, w])
}

/// Space-to-channel fold: `[B, C_in, 2H, 2W]` → `[B, C_out, H, W]`
///
/// Pixel unshuffle by 2 followed by a 1x1 projection from `4*C_in` to
/// `C_out` channels.
#[derive(Module, Debug)]
pub struct SpaceToChannel<B: Backend> {
    pub proj: Conv2d<B>,
}

impl<B: Backend> SpaceToChannel<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let folded = in_channels * FOLD_FACTOR * FOLD_FACTOR;
        let proj = Conv2dConfig::new([folded, out_channels], [1, 1])
            .with_bias(false)
            .init(device);

        Self { proj }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.proj.forward(pixel_unshuffle(x, FOLD_FACTOR))
    }
}

/// Channel-to-space unfold: `[B, C_in, H, W]` → `[B, C_out, 2H, 2W]`
///
/// 1x1 projection to `4*C_out` channels followed by pixel shuffle by 2.
#[derive(Module, Debug)]
pub struct ChannelToSpace<B: Backend> {
    pub proj: Conv2d<B>,
}

impl<B: Backend> ChannelToSpace<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let unfolded = out_channels * FOLD_FACTOR * FOLD_FACTOR;
        let proj = Conv2dConfig::new([in_channels, unfolded], [1, 1])
            .with_bias(false)
            .init(device);

        Self { proj }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        pixel_shuffle(self.proj.forward(x), FOLD_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn arange(shape: [usize; 4], device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4> {
        let n: usize = shape.iter().product();
        let data: Vec<f32> = (0..n).map(|v| v as f32).collect();
        Tensor::<TestBackend, 1>::from_floats(data.as_slice(), device).reshape(shape)
    }

    #[test]
    fn test_pixel_unshuffle_layout() {
        let device = Default::default();
        // Single 2x2 cell: [[0, 1], [2, 3]]
        let x = arange([1, 1, 2, 2], &device);
        let y = pixel_unshuffle(x, 2);

        assert_eq!(y.dims(), [1, 4, 1, 1]);
        let values: Vec<f32> = y.into_data().to_vec().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_pixel_shuffle_inverts_unshuffle() {
        let device = Default::default();
        let x = arange([2, 3, 8, 4], &device);

        let folded = pixel_unshuffle(x.clone(), 2);
        assert_eq!(folded.dims(), [2, 12, 4, 2]);

        let restored = pixel_shuffle(folded, 2);
        assert_eq!(restored.dims(), [2, 3, 8, 4]);

        let a: Vec<f32> = x.into_data().to_vec().unwrap();
        let b: Vec<f32> = restored.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_channel_average_of_repeat_is_identity() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random([2, 4, 3, 3], Distribution::Normal(0.0, 1.0), &device);

        let repeated = channel_repeat(x.clone(), 8);
        assert_eq!(repeated.dims(), [2, 32, 3, 3]);

        let averaged = channel_average(repeated, 4);
        assert_eq!(averaged.dims(), [2, 4, 3, 3]);

        let a: Vec<f32> = x.into_data().to_vec().unwrap();
        let b: Vec<f32> = averaged.into_data().to_vec().unwrap();
        for (l, r) in a.iter().zip(&b) {
            assert!((l - r).abs() < 1e-5);
        }
    }

    #[test]
    fn test_channel_average_groups() {
        let device = Default::default();
        // 4 channels averaged to 2: out[0] = mean(ch0, ch2), out[1] = mean(ch1, ch3)
        let x = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 6.0], &device)
            .reshape([1, 4, 1, 1]);
        let values: Vec<f32> = channel_average(x, 2).into_data().to_vec().unwrap();
        assert_eq!(values, vec![2.0, 4.0]);
    }

    #[test]
    fn test_fold_unfold_shapes() {
        let device = Default::default();
        let fold = SpaceToChannel::<TestBackend>::new(8, 16, &device);
        let unfold = ChannelToSpace::<TestBackend>::new(16, 8, &device);

        let x = Tensor::zeros([2, 8, 16, 16], &device);
        let folded = fold.forward(x);
        assert_eq!(folded.dims(), [2, 16, 8, 8]);

        let unfolded = unfold.forward(folded);
        assert_eq!(unfolded.dims(), [2, 8, 16, 16]);
    }
}
