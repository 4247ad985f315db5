//! Landscape↔square spatial adapters
//!
//! The convolutional stages assume square feature maps. A 16:9 input is
//! resized to a square map right after the input conv and resized back just
//! before the output head. Any other non-square ratio is rejected by
//! [`SpatialLayout::resolve`] instead of guessing an adapter.

use burn::nn::{
    PaddingConfig2d,
    conv::{Conv2d, Conv2dConfig},
};
use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Width/height ratio treated as landscape
pub const LANDSCAPE_RATIO: f64 = 16.0 / 9.0;

/// Allowed distance from [`LANDSCAPE_RATIO`]
pub const LANDSCAPE_TOLERANCE: f64 = 0.01;

/// Whether `[height, width]` is (approximately) 16:9
pub fn is_landscape(height: usize, width: usize) -> bool {
    if height == 0 {
        return false;
    }
    let ratio = width as f64 / height as f64;
    (ratio - LANDSCAPE_RATIO).abs() < LANDSCAPE_TOLERANCE
}

/// How a configured sample resolution maps onto square stage resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialLayout {
    /// Already square; adapters are skipped
    Square(usize),
    /// 16:9 input processed on a `side × side` grid
    Landscape {
        height: usize,
        width: usize,
        side: usize,
    },
}

impl SpatialLayout {
    /// Resolves the layout for `[height, width]`
    ///
    /// Returns `None` for ratios that are neither square nor 16:9.
    pub fn resolve(height: usize, width: usize) -> Option<Self> {
        if height == width {
            Some(Self::Square(height))
        } else if is_landscape(height, width) {
            Some(Self::Landscape {
                height,
                width,
                side: height.next_power_of_two(),
            })
        } else {
            None
        }
    }

    /// Side length of the square grid the stages run on
    pub fn side(&self) -> usize {
        match *self {
            Self::Square(side) => side,
            Self::Landscape { side, .. } => side,
        }
    }

    pub fn is_landscape(&self) -> bool {
        matches!(self, Self::Landscape { .. })
    }
}

fn resize<B: Backend>(x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    interpolate(x, size, InterpolateOptions::new(InterpolateMode::Bilinear))
}

fn conv3x3<B: Backend>(channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([channels, channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

/// Resizes a landscape map to `side × side`, then mixes with a 3x3 conv
#[derive(Module, Debug)]
pub struct LandscapeToSquare<B: Backend> {
    pub conv: Conv2d<B>,
    pub side: usize,
}

impl<B: Backend> LandscapeToSquare<B> {
    pub fn new(channels: usize, side: usize, device: &B::Device) -> Self {
        Self {
            conv: conv3x3(channels, device),
            side,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(resize(x, [self.side, self.side]))
    }
}

/// Resizes a square map back to `height × width`, then mixes with a 3x3 conv
#[derive(Module, Debug)]
pub struct SquareToLandscape<B: Backend> {
    pub conv: Conv2d<B>,
    pub height: usize,
    pub width: usize,
}

impl<B: Backend> SquareToLandscape<B> {
    pub fn new(channels: usize, height: usize, width: usize, device: &B::Device) -> Self {
        Self {
            conv: conv3x3(channels, device),
            height,
            width,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(resize(x, [self.height, self.width]))
    }
}
