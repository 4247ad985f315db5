//! Convolutional hierarchical autoencoder (DCAE)
//!
//! ```text
//! encoder: conv_in → [landscape→square] → (S-1)× DownStage → BottleneckStage → LatentProjection
//! decoder: LatentExpansion → BottleneckStage → (S-1)× UpStage → [square→landscape] → norm → silu → conv_out
//! ```
//!
//! Every stage is a [`ResidualStage`]: a residual block stack summed with a
//! shortcut (space↔channel fold, identity, or channel average/repeat).
//! Spatial size shrinks by `2^(S-1)` between image and latent.

use burn::module::Ignored;
use burn::nn::{
    PaddingConfig2d,
    conv::{Conv2d, Conv2dConfig},
};
use burn::prelude::*;
use burn::tensor::activation::silu;
use burn_vaes_core::aspect::{LandscapeToSquare, SpatialLayout, SquareToLandscape};
use burn_vaes_core::groupnorm::GroupNorm;

use crate::autoencoder::{Autoencoder, add_latent_noise};
use crate::config::ResNetConfig;
use crate::error::{Result, check_shape};
use crate::stage::{
    BottleneckStage, DownStage, LatentExpansion, LatentProjection, ResidualStage, UpStage,
};

fn conv3x3<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// DCAE encoder: `[B, C, H, W]` → `[B, latent_channels, h, w]`
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub conv_in: Conv2d<B>,
    pub l_to_s: Option<LandscapeToSquare<B>>,
    pub stages: Vec<DownStage<B>>,
    pub bottleneck: BottleneckStage<B>,
    pub latent_proj: LatentProjection<B>,
    pub config: Ignored<ResNetConfig>,
}

impl<B: Backend> Encoder<B> {
    /// Builds an encoder, rejecting inconsistent configs
    pub fn new(config: &ResNetConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let schedule = config.channel_schedule();
        let blocks = &config.encoder_blocks_per_stage;
        let total_blocks = blocks.len();

        let l_to_s = match config.layout()? {
            SpatialLayout::Landscape { side, .. } => {
                Some(LandscapeToSquare::new(config.ch_0, side, device))
            }
            SpatialLayout::Square(_) => None,
        };

        let stages = schedule
            .windows(2)
            .zip(blocks)
            .map(|(ch, &n)| DownStage::new(ch[0], ch[1], n, total_blocks, device))
            .collect();

        tracing::debug!(
            channels = ?schedule,
            blocks = ?blocks,
            landscape = l_to_s.is_some(),
            "built DCAE encoder"
        );

        Ok(Self {
            conv_in: conv3x3(config.channels, config.ch_0, device),
            l_to_s,
            stages,
            bottleneck: BottleneckStage::new(
                config.ch_max,
                blocks[total_blocks - 1],
                total_blocks,
                device,
            ),
            latent_proj: LatentProjection::new(config.ch_max, config.latent_channels, device),
            config: Ignored(config.clone()),
        })
    }

    /// Encodes an image batch to latents
    ///
    /// Fails with [`VaeError::ShapeMismatch`](crate::VaeError::ShapeMismatch)
    /// unless the input is `[batch, channels, height, width]` as configured.
    pub fn forward(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let dims = x.dims();
        check_shape("image", self.config.image_shape(dims[0]), dims)?;

        let mut h = self.conv_in.forward(x);
        if let Some(adapter) = &self.l_to_s {
            h = adapter.forward(h);
        }

        for stage in &self.stages {
            h = stage.forward(h);
        }
        let h = self.bottleneck.forward(h);

        Ok(self.latent_proj.forward(h))
    }
}

/// DCAE decoder: `[B, latent_channels, h, w]` → `[B, C, H, W]`
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub latent_in: LatentExpansion<B>,
    pub starter: BottleneckStage<B>,
    pub stages: Vec<UpStage<B>>,
    pub s_to_l: Option<SquareToLandscape<B>>,
    pub norm_out: GroupNorm<B>,
    pub conv_out: Conv2d<B>,
    /// Standalone deployment: noise inputs by `config.noise_decoder_inputs`
    pub decoder_only: bool,
    pub config: Ignored<ResNetConfig>,
}

impl<B: Backend> Decoder<B> {
    /// Builds a decoder; `config.decoder_only` selects standalone mode
    pub fn new(config: &ResNetConfig, device: &B::Device) -> Result<Self> {
        Self::build(config, config.decoder_only, device)
    }

    /// Builds a decoder for use behind an encoder (never noises its inputs)
    pub fn paired(config: &ResNetConfig, device: &B::Device) -> Result<Self> {
        Self::build(config, false, device)
    }

    fn build(config: &ResNetConfig, decoder_only: bool, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let schedule = config.channel_schedule();
        let blocks = &config.decoder_blocks_per_stage;
        let total_blocks = blocks.len();

        // Stage k maps schedule[S-1-k] -> schedule[S-2-k] with blocks[k] blocks
        let stages = schedule
            .windows(2)
            .rev()
            .zip(blocks)
            .map(|(ch, &n)| UpStage::new(ch[1], ch[0], n, total_blocks, device))
            .collect();

        let s_to_l = match config.layout()? {
            SpatialLayout::Landscape { height, width, .. } => {
                Some(SquareToLandscape::new(config.ch_0, height, width, device))
            }
            SpatialLayout::Square(_) => None,
        };

        tracing::debug!(
            channels = ?schedule.iter().rev().collect::<Vec<_>>(),
            blocks = ?blocks,
            landscape = s_to_l.is_some(),
            decoder_only,
            "built DCAE decoder"
        );

        Ok(Self {
            latent_in: LatentExpansion::new(config.latent_channels, config.ch_max, device),
            starter: BottleneckStage::new(
                config.ch_max,
                blocks[total_blocks - 1],
                total_blocks,
                device,
            ),
            stages,
            s_to_l,
            norm_out: GroupNorm::for_channels(config.ch_0, device),
            conv_out: conv3x3(config.ch_0, config.channels, device),
            decoder_only,
            config: Ignored(config.clone()),
        })
    }

    /// Decodes a latent batch to images
    ///
    /// In standalone mode with positive `noise_decoder_inputs`, Gaussian
    /// noise is added to the latent first.
    pub fn forward(&self, z: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        let dims = z.dims();
        check_shape("latent", self.config.latent_shape(dims[0]), dims)?;

        let z = if self.decoder_only {
            add_latent_noise(z, self.config.noise_decoder_inputs)
        } else {
            z
        };

        let h = self.latent_in.forward(z);
        let mut h = self.starter.forward(h);

        for stage in &self.stages {
            h = stage.forward(h);
        }

        if let Some(adapter) = &self.s_to_l {
            h = adapter.forward(h);
        }
        let h = self.norm_out.forward(h);
        let h = silu(h);

        Ok(self.conv_out.forward(h))
    }
}

/// Paired DCAE encoder and decoder
#[derive(Module, Debug)]
pub struct Dcae<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
    pub config: Ignored<ResNetConfig>,
}

impl<B: Backend> Dcae<B> {
    pub fn new(config: &ResNetConfig, device: &B::Device) -> Result<Self> {
        Ok(Self {
            encoder: Encoder::new(config, device)?,
            decoder: Decoder::paired(config, device)?,
            config: Ignored(config.clone()),
        })
    }
}

impl<B: Backend> Autoencoder<B, 4> for Dcae<B> {
    fn encode(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self.encoder.forward(x)
    }

    fn decode(&self, z: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        self.decoder.forward(z)
    }

    fn noise_decoder_inputs(&self) -> f64 {
        self.config.noise_decoder_inputs
    }
}
