//! Token-based transformer autoencoder (TiTok)
//!
//! The encoder prepends a bank of learned latent tokens to the patch tokens
//! of an image, runs a bidirectional transformer, and keeps only the latent
//! positions. The decoder mirrors it: projected latents are followed by a
//! bank of learned image tokens, and the image positions are projected back
//! to pixels.
//!
//! ```text
//! encoder: [latent_tokens | patch(x)] + pos → transformer → [..n_latents] → linear
//! decoder: [linear(z) | image_tokens] + pos → transformer → [n_latents..] → unpatchify
//! ```

use burn::module::{Ignored, Param};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn_vaes_core::embeddings::{LearnedPosEnc, expand_batch, learned_table};
use burn_vaes_core::patch::{PatchProjIn, PatchProjOut};
use burn_vaes_core::transformer::{StackedTransformer, StackedTransformerConfig};

use crate::autoencoder::Autoencoder;
use crate::config::TransformerConfig;
use crate::error::{Result, check_shape};

fn transformer_config(config: &TransformerConfig) -> StackedTransformerConfig {
    StackedTransformerConfig::new(config.n_layers, config.n_heads, config.d_model)
}

/// TiTok encoder: `[B, C, H, W]` → `[B, latent_size, latent_channels]`
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub proj_in: PatchProjIn<B>,
    pub pos_enc: LearnedPosEnc<B>,
    /// Learned latent tokens, shape `[latent_size, d_model]`
    pub latent_tokens: Param<Tensor<B, 2>>,
    pub transformer: StackedTransformer<B>,
    pub proj_out: Linear<B>,
    pub config: Ignored<TransformerConfig>,
}

impl<B: Backend> Encoder<B> {
    pub fn new(config: &TransformerConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        tracing::debug!(
            patches = config.num_patches(),
            latents = config.latent_size,
            layers = config.n_layers,
            d_model = config.d_model,
            "built TiTok encoder"
        );

        Ok(Self {
            proj_in: PatchProjIn::new(config.d_model, config.channels, config.patch_size, device),
            pos_enc: LearnedPosEnc::new(config.seq_len(), config.d_model, device),
            latent_tokens: learned_table(config.latent_size, config.d_model, device),
            transformer: transformer_config(config).init(device),
            proj_out: LinearConfig::new(config.d_model, config.latent_channels)
                .with_bias(false)
                .init(device),
            config: Ignored(config.clone()),
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        let dims = x.dims();
        check_shape("image", self.config.image_shape(dims[0]), dims)?;

        let x = self.proj_in.forward(x);
        let [batch, _num_patches, d_model] = x.dims();
        let n_latents = self.config.latent_size;

        let z = expand_batch(self.latent_tokens.val(), batch);
        let x = Tensor::cat(vec![z, x], 1);
        let x = self.pos_enc.forward(x);

        let x = self.transformer.forward(x);
        let z = x.slice([0..batch, 0..n_latents, 0..d_model]);

        Ok(self.proj_out.forward(z))
    }
}

/// TiTok decoder: `[B, latent_size, latent_channels]` → `[B, C, H, W]`
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    pub proj_in: Linear<B>,
    /// Learned image tokens, shape `[num_patches, d_model]`
    pub image_tokens: Param<Tensor<B, 2>>,
    pub pos_enc: LearnedPosEnc<B>,
    pub transformer: StackedTransformer<B>,
    pub proj_out: PatchProjOut<B>,
    pub config: Ignored<TransformerConfig>,
}

impl<B: Backend> Decoder<B> {
    pub fn new(config: &TransformerConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        tracing::debug!(
            patches = config.num_patches(),
            latents = config.latent_size,
            layers = config.n_layers,
            d_model = config.d_model,
            "built TiTok decoder"
        );

        Ok(Self {
            proj_in: LinearConfig::new(config.latent_channels, config.d_model)
                .with_bias(false)
                .init(device),
            image_tokens: learned_table(config.num_patches(), config.d_model, device),
            pos_enc: LearnedPosEnc::new(config.seq_len(), config.d_model, device),
            transformer: transformer_config(config).init(device),
            proj_out: PatchProjOut::new(
                config.sample_size,
                config.d_model,
                config.channels,
                config.patch_size,
                device,
            ),
            config: Ignored(config.clone()),
        })
    }

    pub fn forward(&self, z: Tensor<B, 3>) -> Result<Tensor<B, 4>> {
        let dims = z.dims();
        check_shape("latent", self.config.latent_shape(dims[0]), dims)?;

        let z = self.proj_in.forward(z);
        let [batch, n_latents, d_model] = z.dims();
        let seq_len = self.config.seq_len();

        let x = expand_batch(self.image_tokens.val(), batch);
        let x = Tensor::cat(vec![z, x], 1);
        let x = self.pos_enc.forward(x);

        let x = self.transformer.forward(x);
        let x = x.slice([0..batch, n_latents..seq_len, 0..d_model]);

        Ok(self.proj_out.forward(x))
    }
}

/// Paired TiTok encoder and decoder
#[derive(Module, Debug)]
pub struct TitokVae<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
    pub config: Ignored<TransformerConfig>,
}

impl<B: Backend> TitokVae<B> {
    pub fn new(config: &TransformerConfig, device: &B::Device) -> Result<Self> {
        Ok(Self {
            encoder: Encoder::new(config, device)?,
            decoder: Decoder::new(config, device)?,
            config: Ignored(config.clone()),
        })
    }
}

impl<B: Backend> Autoencoder<B, 3> for TitokVae<B> {
    fn encode(&self, x: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
        self.encoder.forward(x)
    }

    fn decode(&self, z: Tensor<B, 3>) -> Result<Tensor<B, 4>> {
        self.decoder.forward(z)
    }

    fn noise_decoder_inputs(&self) -> f64 {
        self.config.noise_decoder_inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VaeError;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn small_config() -> TransformerConfig {
        TransformerConfig {
            sample_size: 8,
            channels: 3,
            patch_size: 2,
            latent_size: 4,
            latent_channels: 8,
            n_layers: 2,
            n_heads: 2,
            d_model: 16,
            noise_decoder_inputs: 0.0,
        }
    }

    fn image(batch: usize, config: &TransformerConfig) -> Tensor<TestBackend, 4> {
        Tensor::random(
            config.image_shape(batch),
            Distribution::Uniform(-1.0, 1.0),
            &Default::default(),
        )
    }

    #[test]
    fn test_encoder_latent_shape() {
        let device = Default::default();
        let config = small_config();
        let encoder = Encoder::<TestBackend>::new(&config, &device).unwrap();

        for batch in [1, 3] {
            let z = encoder.forward(image(batch, &config)).unwrap();
            assert_eq!(z.dims(), [batch, 4, 8]);
        }
    }

    #[test]
    fn test_latent_count_is_independent_of_resolution() {
        let device = Default::default();
        let mut config = small_config();
        config.sample_size = 16;
        let encoder = Encoder::<TestBackend>::new(&config, &device).unwrap();

        let z = encoder.forward(image(2, &config)).unwrap();
        assert_eq!(z.dims(), [2, 4, 8]);
    }

    #[test]
    fn test_decoder_image_shape() {
        let device = Default::default();
        let config = small_config();
        let decoder = Decoder::<TestBackend>::new(&config, &device).unwrap();
        assert_eq!(decoder.image_tokens.val().dims(), [16, 16]);

        let z = Tensor::zeros([2, 4, 8], &device);
        assert_eq!(decoder.forward(z).unwrap().dims(), [2, 3, 8, 8]);
    }

    #[test]
    fn test_rejects_wrong_shapes() {
        let device = Default::default();
        let config = small_config();
        let vae = TitokVae::<TestBackend>::new(&config, &device).unwrap();

        assert!(matches!(
            vae.encode(Tensor::zeros([1, 3, 16, 16], &device)),
            Err(VaeError::ShapeMismatch { tensor: "image", .. })
        ));
        assert!(matches!(
            vae.decode(Tensor::zeros([1, 5, 8], &device)),
            Err(VaeError::ShapeMismatch { tensor: "latent", .. })
        ));
    }

    #[test]
    fn test_construction_rejects_bad_heads() {
        let device = Default::default();
        let mut config = small_config();
        config.n_heads = 3;
        assert!(TitokVae::<TestBackend>::new(&config, &device).is_err());
    }

    #[test]
    fn test_forward_is_deterministic_without_noise() {
        let device = Default::default();
        let config = small_config();
        let vae = TitokVae::<TestBackend>::new(&config, &device).unwrap();
        let x = image(2, &config);

        let (rec_a, z_a) = vae.forward(x.clone()).unwrap();
        let (rec_b, z_b) = vae.forward(x).unwrap();
        assert_eq!(rec_a.dims(), [2, 3, 8, 8]);

        let rec_a: Vec<f32> = rec_a.into_data().to_vec().unwrap();
        let rec_b: Vec<f32> = rec_b.into_data().to_vec().unwrap();
        let z_a: Vec<f32> = z_a.into_data().to_vec().unwrap();
        let z_b: Vec<f32> = z_b.into_data().to_vec().unwrap();
        assert_eq!(rec_a, rec_b);
        assert_eq!(z_a, z_b);
    }

    #[test]
    fn test_forward_returns_clean_latent() {
        let device = Default::default();
        let config = small_config().with_noise(1.0);
        let vae = TitokVae::<TestBackend>::new(&config, &device).unwrap();
        let x = image(1, &config);

        let clean: Vec<f32> = vae.encode(x.clone()).unwrap().into_data().to_vec().unwrap();
        let (_rec, z) = vae.forward(x).unwrap();
        let z: Vec<f32> = z.into_data().to_vec().unwrap();
        assert_eq!(z, clean);
    }

    #[test]
    fn test_config_travels_with_module() {
        let device = Default::default();
        let config = small_config();
        let vae = TitokVae::<TestBackend>::new(&config, &device).unwrap();

        let copy = vae.clone();
        assert_eq!(copy.config.seq_len(), config.seq_len());
        assert_eq!(copy.encoder.config.latent_shape(2), [2, 4, 8]);
        assert_eq!(
            vae.num_params(),
            vae.encoder.num_params() + vae.decoder.num_params()
        );
    }
}
