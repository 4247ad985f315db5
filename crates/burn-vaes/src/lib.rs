//! Image Autoencoders in Burn
//!
//! Two autoencoder families mapping images to compact latents and back.
//!
//! # Components
//!
//! - [`dcae`] - Convolutional hierarchical autoencoder with space↔channel
//!   shortcuts; latents are `[batch, latent_channels, h, w]`
//! - [`titok`] - Token-based transformer autoencoder; latents are
//!   `[batch, latent_tokens, latent_channels]`
//! - [`Autoencoder`] - Encoder/decoder pairing with optional latent noise
//!
//! # Configuration
//!
//! [`ResNetConfig`] and [`TransformerConfig`] fix every tensor shape. They are
//! validated when a model is built; a model never exists for an inconsistent
//! config, and `forward` rejects inputs that don't match it.
//!
//! # Example
//!
//! ```ignore
//! use burn_vaes::{Autoencoder, Dcae, ResNetConfig};
//!
//! let config = ResNetConfig::dcae_256();
//! let model = Dcae::<Backend>::new(&config, &device)?;
//!
//! // [1, 3, 256, 256] -> latent [1, 4, 32, 32]
//! let (reconstruction, latent) = model.forward(image)?;
//! ```

pub mod autoencoder;
pub mod config;
pub mod dcae;
pub mod error;
pub mod stage;
pub mod titok;

pub use autoencoder::{Autoencoder, add_latent_noise};
pub use config::{ModelConfig, ResNetConfig, TransformerConfig};
pub use dcae::Dcae;
pub use error::{Result, VaeError};
pub use stage::ResidualStage;
pub use titok::TitokVae;
