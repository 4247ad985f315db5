//! Building Blocks for Image Autoencoders
//!
//! Shared components used by the convolutional (DCAE) and token-based
//! (TiToK) autoencoders in `burn-vaes`.
//!
//! # Modules
//!
//! ## Convolutional
//!
//! - [`resnet`] - Residual stacks at same, halved, and doubled resolution
//! - [`shuffle`] - Pixel (un)shuffle, space↔channel folds, channel average/repeat
//! - [`aspect`] - 16:9 landscape↔square adapters and layout resolution
//! - [`groupnorm`] - Group normalization
//!
//! ## Token
//!
//! - [`patch`] - Image↔patch-token projections
//! - [`embeddings`] - Learned positional encodings and token tables
//! - [`transformer`] - Bidirectional pre-norm transformer stack
//! - [`layernorm`] - Layer normalization
//!
//! # Example
//!
//! ```ignore
//! use burn_vaes_core::shuffle::SpaceToChannel;
//!
//! // [B, 64, 32, 32] -> [B, 128, 16, 16]
//! let fold = SpaceToChannel::new(64, 128, &device);
//! let y = fold.forward(x);
//! ```

pub mod aspect;
pub mod embeddings;
pub mod groupnorm;
pub mod layernorm;
pub mod patch;
pub mod resnet;
pub mod shuffle;
pub mod transformer;
