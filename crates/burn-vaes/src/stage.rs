//! Two-branch residual stages of the convolutional autoencoder
//!
//! Every level of the DCAE hierarchy is `main(x) + shortcut(x)`. The
//! shortcut is either a learned fold/unfold, the identity, or a
//! parameter-free channel average/repeat around the latent.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use burn_vaes_core::resnet::{DownBlock, SameBlock, UpBlock};
use burn_vaes_core::shuffle::{ChannelToSpace, SpaceToChannel, channel_average, channel_repeat};

/// A stage whose output is the sum of a main branch and a shortcut branch
pub trait ResidualStage<B: Backend> {
    fn main(&self, x: Tensor<B, 4>) -> Tensor<B, 4>;

    fn shortcut(&self, x: Tensor<B, 4>) -> Tensor<B, 4>;

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let res = self.shortcut(x.clone());
        self.main(x) + res
    }
}

fn conv1x1<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [1, 1])
        .with_bias(false)
        .init(device)
}

/// Halves resolution: residual stack + strided conv, plus space-to-channel fold
#[derive(Module, Debug)]
pub struct DownStage<B: Backend> {
    pub block: DownBlock<B>,
    pub fold: SpaceToChannel<B>,
}

impl<B: Backend> DownStage<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        num_blocks: usize,
        total_blocks: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            block: DownBlock::new(in_channels, out_channels, num_blocks, total_blocks, device),
            fold: SpaceToChannel::new(in_channels, out_channels, device),
        }
    }
}

impl<B: Backend> ResidualStage<B> for DownStage<B> {
    fn main(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.block.forward(x)
    }

    fn shortcut(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.fold.forward(x)
    }
}

/// Doubles resolution: upsample + residual stack, plus channel-to-space unfold
#[derive(Module, Debug)]
pub struct UpStage<B: Backend> {
    pub block: UpBlock<B>,
    pub unfold: ChannelToSpace<B>,
}

impl<B: Backend> UpStage<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        num_blocks: usize,
        total_blocks: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            block: UpBlock::new(in_channels, out_channels, num_blocks, total_blocks, device),
            unfold: ChannelToSpace::new(in_channels, out_channels, device),
        }
    }
}

impl<B: Backend> ResidualStage<B> for UpStage<B> {
    fn main(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.block.forward(x)
    }

    fn shortcut(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.unfold.forward(x)
    }
}

/// Bottleneck stage at constant width with an identity shortcut
#[derive(Module, Debug)]
pub struct BottleneckStage<B: Backend> {
    pub block: SameBlock<B>,
}

impl<B: Backend> BottleneckStage<B> {
    pub fn new(channels: usize, num_blocks: usize, total_blocks: usize, device: &B::Device) -> Self {
        Self {
            block: SameBlock::new(channels, channels, num_blocks, total_blocks, device),
        }
    }
}

impl<B: Backend> ResidualStage<B> for BottleneckStage<B> {
    fn main(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.block.forward(x)
    }

    fn shortcut(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        x
    }
}

/// Bottleneck → latent: 1x1 conv plus channel-group average
#[derive(Module, Debug)]
pub struct LatentProjection<B: Backend> {
    pub conv: Conv2d<B>,
    pub latent_channels: usize,
}

impl<B: Backend> LatentProjection<B> {
    /// `channels` must be a multiple of `latent_channels`
    pub fn new(channels: usize, latent_channels: usize, device: &B::Device) -> Self {
        Self {
            conv: conv1x1(channels, latent_channels, device),
            latent_channels,
        }
    }
}

impl<B: Backend> ResidualStage<B> for LatentProjection<B> {
    fn main(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(x)
    }

    fn shortcut(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        channel_average(x, self.latent_channels)
    }
}

/// Latent → bottleneck: 1x1 conv plus channel repeat
#[derive(Module, Debug)]
pub struct LatentExpansion<B: Backend> {
    pub conv: Conv2d<B>,
    pub repeats: usize,
}

impl<B: Backend> LatentExpansion<B> {
    /// `channels` must be a multiple of `latent_channels`
    pub fn new(latent_channels: usize, channels: usize, device: &B::Device) -> Self {
        Self {
            conv: conv1x1(latent_channels, channels, device),
            repeats: channels / latent_channels,
        }
    }
}

impl<B: Backend> ResidualStage<B> for LatentExpansion<B> {
    fn main(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(x)
    }

    fn shortcut(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        channel_repeat(x, self.repeats)
    }
}
