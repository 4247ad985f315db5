//! Model configuration
//!
//! Configs are plain serde structs, immutable once a model is built. Every
//! model constructor runs `validate()` first, so shape problems surface at
//! build time rather than on the first forward pass.

use std::path::Path;

use burn_vaes_core::aspect::SpatialLayout;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaeError};

fn check_noise(noise: f64) -> Result<()> {
    if noise.is_finite() && noise >= 0.0 {
        Ok(())
    } else {
        Err(VaeError::InvalidConfig(format!(
            "noise_decoder_inputs must be a finite non-negative number, got {noise}"
        )))
    }
}

fn check_nonzero(fields: &[(&str, usize)]) -> Result<()> {
    match fields.iter().find(|(_, v)| *v == 0) {
        Some((name, _)) => Err(VaeError::InvalidConfig(format!("{name} must be non-zero"))),
        None => Ok(()),
    }
}

/// Convolutional (DCAE) autoencoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResNetConfig {
    /// Input resolution `[height, width]`
    pub sample_size: [usize; 2],
    /// Image channels (3 for RGB)
    pub channels: usize,
    /// Latent side length
    pub latent_size: usize,
    /// Latent channels
    pub latent_channels: usize,
    /// Std of the Gaussian noise added to latents before decoding (0 disables)
    #[serde(default)]
    pub noise_decoder_inputs: f64,
    /// Width of the first stage
    pub ch_0: usize,
    /// Width cap, reached at the bottleneck
    pub ch_max: usize,
    /// Residual blocks per encoder stage; the last entry is the bottleneck stage
    pub encoder_blocks_per_stage: Vec<usize>,
    /// Residual blocks per decoder stage; the last entry is the bottleneck stage
    pub decoder_blocks_per_stage: Vec<usize>,
    /// Standalone decoder deployment: noise its own inputs
    #[serde(default)]
    pub decoder_only: bool,
}

impl ResNetConfig {
    /// 256x256 RGB, 4 stages (32 → 128 channels), 4x32x32 latent
    pub fn dcae_256() -> Self {
        Self {
            sample_size: [256, 256],
            channels: 3,
            latent_size: 32,
            latent_channels: 4,
            noise_decoder_inputs: 0.0,
            ch_0: 32,
            ch_max: 128,
            encoder_blocks_per_stage: vec![2, 2, 2, 2],
            decoder_blocks_per_stage: vec![2, 2, 2, 2],
            decoder_only: false,
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise_decoder_inputs = noise;
        self
    }

    pub fn with_decoder_only(mut self, decoder_only: bool) -> Self {
        self.decoder_only = decoder_only;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Number of stages, counting the bottleneck stage
    pub fn num_stages(&self) -> usize {
        self.encoder_blocks_per_stage.len()
    }

    /// Spatial reduction between the (square) input grid and the latent
    ///
    /// `None` when the stage count is too deep to express as a `usize` factor.
    pub fn downscale(&self) -> Option<usize> {
        let shift = u32::try_from(self.num_stages().saturating_sub(1)).ok()?;
        1usize.checked_shl(shift)
    }

    /// Stage widths: `ch_0`, doubling and capped at `ch_max`
    pub fn channel_schedule(&self) -> Vec<usize> {
        std::iter::successors(Some(self.ch_0), |&ch| Some(ch.saturating_mul(2).min(self.ch_max)))
            .take(self.num_stages())
            .collect()
    }

    pub fn layout(&self) -> Result<SpatialLayout> {
        let [height, width] = self.sample_size;
        SpatialLayout::resolve(height, width)
            .ok_or(VaeError::UnsupportedAspect { height, width })
    }

    /// `[batch, channels, height, width]`
    pub fn image_shape(&self, batch: usize) -> [usize; 4] {
        let [height, width] = self.sample_size;
        [batch, self.channels, height, width]
    }

    /// `[batch, latent_channels, latent_size, latent_size]`
    pub fn latent_shape(&self, batch: usize) -> [usize; 4] {
        [batch, self.latent_channels, self.latent_size, self.latent_size]
    }

    pub fn validate(&self) -> Result<()> {
        check_nonzero(&[
            ("channels", self.channels),
            ("latent_channels", self.latent_channels),
            ("ch_0", self.ch_0),
            ("ch_max", self.ch_max),
            ("encoder_blocks_per_stage", self.encoder_blocks_per_stage.len()),
            ("decoder_blocks_per_stage", self.decoder_blocks_per_stage.len()),
        ])?;
        check_noise(self.noise_decoder_inputs)?;

        let (encoder, decoder) = (
            self.encoder_blocks_per_stage.len(),
            self.decoder_blocks_per_stage.len(),
        );
        if encoder != decoder {
            return Err(VaeError::StageMismatch { encoder, decoder });
        }

        let reached = self.channel_schedule().last().copied().unwrap_or(self.ch_0);
        if reached != self.ch_max {
            return Err(VaeError::ChannelSchedule {
                ch_0: self.ch_0,
                ch_max: self.ch_max,
                reached,
            });
        }

        if self.ch_max % self.latent_channels != 0 {
            return Err(VaeError::LatentGrouping {
                channels: self.ch_max,
                latent_channels: self.latent_channels,
            });
        }

        let side = self.layout()?.side();
        let factor = self.downscale().ok_or_else(|| {
            VaeError::InvalidConfig(format!(
                "{} stages downscale past the representable range",
                self.num_stages()
            ))
        })?;
        if side % factor != 0 {
            return Err(VaeError::Resolution { size: side, factor });
        }
        if side / factor != self.latent_size {
            return Err(VaeError::LatentSize {
                configured: self.latent_size,
                derived: side / factor,
            });
        }

        Ok(())
    }
}

/// Token-based (TiToK) autoencoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Square input side length
    pub sample_size: usize,
    /// Image channels
    pub channels: usize,
    /// Side length of each square patch
    pub patch_size: usize,
    /// Number of latent tokens
    pub latent_size: usize,
    /// Channels per latent token
    pub latent_channels: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub d_model: usize,
    /// Std of the Gaussian noise added to latents before decoding (0 disables)
    #[serde(default)]
    pub noise_decoder_inputs: f64,
}

impl TransformerConfig {
    /// 16x16 input with 1x1 patches (256 tokens), 16 latent tokens of width 128
    pub fn titok_16() -> Self {
        Self {
            sample_size: 16,
            channels: 32,
            patch_size: 1,
            latent_size: 16,
            latent_channels: 128,
            n_layers: 6,
            n_heads: 6,
            d_model: 384,
            noise_decoder_inputs: 0.0,
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise_decoder_inputs = noise;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Patch tokens per image
    pub fn num_patches(&self) -> usize {
        let grid = self.sample_size / self.patch_size;
        grid * grid
    }

    /// Latent plus patch (or image) tokens
    pub fn seq_len(&self) -> usize {
        self.latent_size + self.num_patches()
    }

    /// `[batch, channels, sample_size, sample_size]`
    pub fn image_shape(&self, batch: usize) -> [usize; 4] {
        [batch, self.channels, self.sample_size, self.sample_size]
    }

    /// `[batch, latent_size, latent_channels]`
    pub fn latent_shape(&self, batch: usize) -> [usize; 3] {
        [batch, self.latent_size, self.latent_channels]
    }

    pub fn validate(&self) -> Result<()> {
        check_nonzero(&[
            ("sample_size", self.sample_size),
            ("channels", self.channels),
            ("patch_size", self.patch_size),
            ("latent_size", self.latent_size),
            ("latent_channels", self.latent_channels),
            ("n_layers", self.n_layers),
            ("n_heads", self.n_heads),
            ("d_model", self.d_model),
        ])?;
        check_noise(self.noise_decoder_inputs)?;

        if self.sample_size % self.patch_size != 0 {
            return Err(VaeError::Resolution {
                size: self.sample_size,
                factor: self.patch_size,
            });
        }
        if self.d_model % self.n_heads != 0 {
            return Err(VaeError::InvalidConfig(format!(
                "d_model {} is not divisible by n_heads {}",
                self.d_model, self.n_heads
            )));
        }

        Ok(())
    }
}

/// Either model family, tagged by `"model"` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelConfig {
    Dcae(ResNetConfig),
    Titok(TransformerConfig),
}

impl ModelConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Dcae(config) => config.validate(),
            Self::Titok(config) => config.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        ResNetConfig::dcae_256().validate().unwrap();
        TransformerConfig::titok_16().validate().unwrap();
    }

    #[test]
    fn test_channel_schedule() {
        let config = ResNetConfig::dcae_256();
        assert_eq!(config.channel_schedule(), vec![32, 64, 128, 128]);
        assert_eq!(config.downscale(), Some(8));
    }

    #[test]
    fn test_too_many_stages_is_an_error() {
        let mut config = ResNetConfig::dcae_256();
        config.ch_0 = config.ch_max;
        config.encoder_blocks_per_stage = vec![1; 70];
        config.decoder_blocks_per_stage = vec![1; 70];

        assert_eq!(config.downscale(), None);
        assert!(matches!(config.validate(), Err(VaeError::InvalidConfig(_))));
    }

    #[test]
    fn test_stage_mismatch() {
        let mut config = ResNetConfig::dcae_256();
        config.decoder_blocks_per_stage = vec![2, 2, 2];
        assert!(matches!(
            config.validate(),
            Err(VaeError::StageMismatch {
                encoder: 4,
                decoder: 3
            })
        ));
    }

    #[test]
    fn test_schedule_must_reach_ch_max() {
        let mut config = ResNetConfig::dcae_256();
        config.encoder_blocks_per_stage = vec![2, 2];
        config.decoder_blocks_per_stage = vec![2, 2];
        config.latent_size = 128;
        assert!(matches!(
            config.validate(),
            Err(VaeError::ChannelSchedule { reached: 64, .. })
        ));
    }

    #[test]
    fn test_latent_grouping() {
        let mut config = ResNetConfig::dcae_256();
        config.latent_channels = 3;
        assert!(matches!(
            config.validate(),
            Err(VaeError::LatentGrouping {
                channels: 128,
                latent_channels: 3
            })
        ));
    }

    #[test]
    fn test_latent_size_must_match() {
        let mut config = ResNetConfig::dcae_256();
        config.latent_size = 16;
        assert!(matches!(
            config.validate(),
            Err(VaeError::LatentSize {
                configured: 16,
                derived: 32
            })
        ));
    }

    #[test]
    fn test_unsupported_aspect() {
        let mut config = ResNetConfig::dcae_256();
        config.sample_size = [192, 256];
        assert!(matches!(
            config.validate(),
            Err(VaeError::UnsupportedAspect {
                height: 192,
                width: 256
            })
        ));
    }

    #[test]
    fn test_landscape_latent_uses_square_side() {
        let mut config = ResNetConfig::dcae_256();
        config.sample_size = [360, 640];
        config.latent_size = 64;
        config.validate().unwrap();
        assert_eq!(config.layout().unwrap().side(), 512);
    }

    #[test]
    fn test_negative_noise_rejected() {
        let config = ResNetConfig::dcae_256().with_noise(-0.1);
        assert!(matches!(config.validate(), Err(VaeError::InvalidConfig(_))));
    }

    #[test]
    fn test_titok_shapes() {
        let config = TransformerConfig::titok_16();
        assert_eq!(config.num_patches(), 256);
        assert_eq!(config.seq_len(), 272);
        assert_eq!(config.latent_shape(2), [2, 16, 128]);
    }

    #[test]
    fn test_titok_rejects_bad_heads() {
        let mut config = TransformerConfig::titok_16();
        config.n_heads = 5;
        assert!(matches!(config.validate(), Err(VaeError::InvalidConfig(_))));
    }

    #[test]
    fn test_titok_rejects_bad_patch() {
        let mut config = TransformerConfig::titok_16();
        config.patch_size = 3;
        assert!(matches!(
            config.validate(),
            Err(VaeError::Resolution { size: 16, factor: 3 })
        ));
    }

    #[test]
    fn test_json_roundtrip_defaults() {
        let json = r#"{
            "sample_size": [64, 64],
            "channels": 3,
            "latent_size": 16,
            "latent_channels": 4,
            "ch_0": 16,
            "ch_max": 32,
            "encoder_blocks_per_stage": [1, 1, 1],
            "decoder_blocks_per_stage": [1, 1, 1]
        }"#;
        let config = ResNetConfig::from_json_str(json).unwrap();
        assert_eq!(config.noise_decoder_inputs, 0.0);
        assert!(!config.decoder_only);
        assert_eq!(config.channel_schedule(), vec![16, 32, 32]);
    }

    #[test]
    fn test_json_invalid_config_rejected() {
        let json = r#"{
            "sample_size": 16, "channels": 3, "patch_size": 4, "latent_size": 8,
            "latent_channels": 16, "n_layers": 2, "n_heads": 3, "d_model": 32
        }"#;
        assert!(matches!(
            TransformerConfig::from_json_str(json),
            Err(VaeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_tagged_model_config() {
        let json = serde_json::to_string(&ModelConfig::Titok(TransformerConfig::titok_16())).unwrap();
        assert!(json.contains(r#""model":"titok""#));

        let parsed: ModelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ModelConfig::Titok(TransformerConfig::titok_16()));
    }

    #[test]
    fn test_model_config_file_roundtrip() {
        let path = std::env::temp_dir().join(format!("burn-vaes-config-{}.json", std::process::id()));
        let config = ModelConfig::Dcae(ResNetConfig::dcae_256().with_noise(0.1));
        std::fs::write(&path, config.to_json_pretty().unwrap()).unwrap();

        let loaded = ModelConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_file() {
        let result = ModelConfig::from_json_file("/nonexistent/burn-vaes.json");
        assert!(matches!(result, Err(VaeError::Io(_))));
    }
}
