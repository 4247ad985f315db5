//! Residual block stacks for the convolutional autoencoder
//!
//! Three flavors share one residual block:
//! - [`SameBlock`] keeps resolution and channel count
//! - [`DownBlock`] runs its blocks then halves resolution while changing channels
//! - [`UpBlock`] doubles resolution while changing channels then runs its blocks

use burn::nn::{
    Initializer, PaddingConfig2d,
    conv::{Conv2d, Conv2dConfig},
};
use burn::prelude::*;
use burn::tensor::activation::silu;

use crate::groupnorm::GroupNorm;

/// Default Kaiming gain of burn's conv layers
const CONV_GAIN: f64 = 0.577_350_269_189_625_8;

fn conv3x3<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    gain: f64,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .with_initializer(Initializer::KaimingUniform {
            gain,
            fan_out_only: false,
        })
        .init(device)
}

/// Pre-activation residual block at constant width
///
/// ```text
/// y = x + conv2(silu(norm2(conv1(silu(norm1(x))))))
/// ```
///
/// The init gain of `conv2` is divided by `sqrt(total_blocks)` so deep
/// stacks start close to identity.
#[derive(Module, Debug)]
pub struct ResBlock<B: Backend> {
    pub norm1: GroupNorm<B>,
    pub conv1: Conv2d<B>,
    pub norm2: GroupNorm<B>,
    pub conv2: Conv2d<B>,
}

impl<B: Backend> ResBlock<B> {
    pub fn new(channels: usize, total_blocks: usize, device: &B::Device) -> Self {
        let scaled_gain = CONV_GAIN / (total_blocks.max(1) as f64).sqrt();

        Self {
            norm1: GroupNorm::for_channels(channels, device),
            conv1: conv3x3(channels, channels, CONV_GAIN, device),
            norm2: GroupNorm::for_channels(channels, device),
            conv2: conv3x3(channels, channels, scaled_gain, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let h = self.norm1.forward(x.clone());
        let h = silu(h);
        let h = self.conv1.forward(h);

        let h = self.norm2.forward(h);
        let h = silu(h);
        let h = self.conv2.forward(h);

        x + h
    }
}

fn res_blocks<B: Backend>(
    channels: usize,
    num_blocks: usize,
    total_blocks: usize,
    device: &B::Device,
) -> Vec<ResBlock<B>> {
    (0..num_blocks)
        .map(|_| ResBlock::new(channels, total_blocks, device))
        .collect()
}

/// Residual stack at constant resolution
#[derive(Module, Debug)]
pub struct SameBlock<B: Backend> {
    pub proj: Option<Conv2d<B>>,
    pub blocks: Vec<ResBlock<B>>,
}

impl<B: Backend> SameBlock<B> {
    /// Creates a stack of `num_blocks` residual blocks
    ///
    /// A 1x1 projection is inserted first when `in_channels != out_channels`.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        num_blocks: usize,
        total_blocks: usize,
        device: &B::Device,
    ) -> Self {
        let proj = (in_channels != out_channels).then(|| {
            Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_bias(false)
                .init(device)
        });

        Self {
            proj,
            blocks: res_blocks(out_channels, num_blocks, total_blocks, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut h = match &self.proj {
            Some(proj) => proj.forward(x),
            None => x,
        };
        for block in &self.blocks {
            h = block.forward(h);
        }
        h
    }
}

/// Residual stack followed by a 2x strided-conv downsample
#[derive(Module, Debug)]
pub struct DownBlock<B: Backend> {
    pub blocks: Vec<ResBlock<B>>,
    pub down: Conv2d<B>,
}

impl<B: Backend> DownBlock<B> {
    /// `[B, in, 2H, 2W]` → `[B, out, H, W]`
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        num_blocks: usize,
        total_blocks: usize,
        device: &B::Device,
    ) -> Self {
        // Padding 1 with stride 2 maps even sizes exactly to half
        let down = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);

        Self {
            blocks: res_blocks(in_channels, num_blocks, total_blocks, device),
            down,
        }
    }

    pub fn forward(&self, mut x: Tensor<B, 4>) -> Tensor<B, 4> {
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.down.forward(x)
    }
}

/// Nearest-neighbor 2x upsample and conv followed by a residual stack
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    pub up: Conv2d<B>,
    pub blocks: Vec<ResBlock<B>>,
}

impl<B: Backend> UpBlock<B> {
    /// `[B, in, H, W]` → `[B, out, 2H, 2W]`
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        num_blocks: usize,
        total_blocks: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            up: conv3x3(in_channels, out_channels, CONV_GAIN, device),
            blocks: res_blocks(out_channels, num_blocks, total_blocks, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        use burn::tensor::module::interpolate;
        use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

        let [_b, _c, h, w] = x.dims();
        let x = interpolate(
            x,
            [h * 2, w * 2],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );

        let mut x = self.up.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_same_block_shape() {
        let device = Default::default();
        let block = SameBlock::<TestBackend>::new(16, 16, 2, 3, &device);
        assert!(block.proj.is_none());

        let x = Tensor::zeros([2, 16, 8, 8], &device);
        assert_eq!(block.forward(x).dims(), [2, 16, 8, 8]);
    }

    #[test]
    fn test_same_block_projects_width() {
        let device = Default::default();
        let block = SameBlock::<TestBackend>::new(8, 16, 1, 1, &device);

        let x = Tensor::zeros([1, 8, 4, 4], &device);
        assert_eq!(block.forward(x).dims(), [1, 16, 4, 4]);
    }

    #[test]
    fn test_down_block_halves_resolution() {
        let device = Default::default();
        let block = DownBlock::<TestBackend>::new(8, 16, 2, 4, &device);

        let x = Tensor::zeros([2, 8, 16, 16], &device);
        assert_eq!(block.forward(x).dims(), [2, 16, 8, 8]);
    }

    #[test]
    fn test_up_block_doubles_resolution() {
        let device = Default::default();
        let block = UpBlock::<TestBackend>::new(16, 8, 2, 4, &device);

        let x = Tensor::zeros([2, 16, 8, 8], &device);
        assert_eq!(block.forward(x).dims(), [2, 8, 16, 16]);
    }

    #[test]
    fn test_zero_block_stack_is_identity() {
        let device = Default::default();
        let block = SameBlock::<TestBackend>::new(4, 4, 0, 1, &device);

        let x = Tensor::<TestBackend, 4>::ones([1, 4, 2, 2], &device);
        let y: Vec<f32> = block.forward(x).into_data().to_vec().unwrap();
        assert!(y.iter().all(|&v| v == 1.0));
    }
}
