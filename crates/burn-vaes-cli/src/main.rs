//! burn-vaes CLI
//!
//! Builds an autoencoder from a JSON config on the CPU backend and checks
//! its shape contract.
//!
//! Supports:
//! - Printing preset configs
//! - Inspecting the derived shapes and parameter count of a config
//! - Timing forward passes after a shape check

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_ndarray::NdArray;
use burn_vaes::{Autoencoder, Dcae, ModelConfig, ResNetConfig, TitokVae, TransformerConfig};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

type CpuBackend = NdArray<f32>;

/// Model family
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelKind {
    /// Convolutional autoencoder, 256x256 RGB
    Dcae,
    /// Token autoencoder, 16x16 with 1x1 patches
    Titok,
}

#[derive(Parser)]
#[command(name = "burn-vaes")]
#[command(about = "Shape checks and timing for image autoencoders")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a preset config as JSON
    Preset {
        #[arg(value_enum)]
        model: ModelKind,
    },

    /// Print derived shapes and parameter count for a config
    Inspect {
        /// Path to a JSON config tagged with "model"
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Check shapes, warm up, then time forward passes
    Bench {
        /// Path to a JSON config tagged with "model"
        #[arg(short, long)]
        config: PathBuf,

        /// Batch size
        #[arg(short, long, default_value_t = 1)]
        batch: usize,

        /// Untimed warm-up passes
        #[arg(long, default_value_t = 3)]
        warmup: usize,

        /// Timed passes
        #[arg(short, long, default_value_t = 5)]
        iters: usize,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn preset(model: ModelKind) -> ModelConfig {
    match model {
        ModelKind::Dcae => ModelConfig::Dcae(ResNetConfig::dcae_256()),
        ModelKind::Titok => ModelConfig::Titok(TransformerConfig::titok_16()),
    }
}

fn inspect(config: &ModelConfig) -> Result<()> {
    let device = Default::default();

    match config {
        ModelConfig::Dcae(config) => {
            let model = Dcae::<CpuBackend>::new(config, &device)?;
            let layout = config.layout()?;
            println!("model:       dcae");
            println!("image:       {:?}", config.image_shape(1));
            println!("latent:      {:?}", config.latent_shape(1));
            println!("channels:    {:?}", config.channel_schedule());
            println!("stage grid:  {}x{}", layout.side(), layout.side());
            println!("landscape:   {}", layout.is_landscape());
            println!("params:      {}", model.num_params());
        }
        ModelConfig::Titok(config) => {
            let model = TitokVae::<CpuBackend>::new(config, &device)?;
            println!("model:       titok");
            println!("image:       {:?}", config.image_shape(1));
            println!("latent:      {:?}", config.latent_shape(1));
            println!("patches:     {}", config.num_patches());
            println!("sequence:    {}", config.seq_len());
            println!("params:      {}", model.num_params());
        }
    }

    Ok(())
}

fn bench_model<M, const D: usize>(
    model: &M,
    image_shape: [usize; 4],
    latent_shape: [usize; D],
    warmup: usize,
    iters: usize,
) -> Result<()>
where
    M: Autoencoder<CpuBackend, D>,
{
    let device = Default::default();
    let x = Tensor::<CpuBackend, 4>::random(image_shape, Distribution::Normal(0.0, 1.0), &device);

    let (rec, z) = model.forward(x.clone())?;
    ensure!(
        rec.dims() == image_shape,
        "expected reconstruction {:?}, got {:?}",
        image_shape,
        rec.dims()
    );
    ensure!(
        z.dims() == latent_shape,
        "expected latent {:?}, got {:?}",
        latent_shape,
        z.dims()
    );
    tracing::info!(image = ?image_shape, latent = ?latent_shape, "shape check passed");

    let pb = ProgressBar::new((warmup + iters) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    pb.set_message("warm-up");
    for _ in 0..warmup {
        let (rec, _z) = model.forward(x.clone())?;
        let _ = rec.into_data();
        pb.inc(1);
    }

    pb.set_message("timed");
    let mut timings = Vec::with_capacity(iters);
    for _ in 0..iters {
        let start = Instant::now();
        let (rec, _z) = model.forward(x.clone())?;
        // Reading the data forces the backend to finish
        let _ = rec.into_data();
        timings.push(start.elapsed());
        pb.inc(1);
    }
    pb.finish_and_clear();

    if let (Some(min), Some(max)) = (timings.iter().min(), timings.iter().max()) {
        let mean = timings.iter().sum::<Duration>() / timings.len() as u32;
        println!("iters: {iters}  mean: {mean:?}  min: {min:?}  max: {max:?}");
    }

    Ok(())
}

fn bench(config: &ModelConfig, batch: usize, warmup: usize, iters: usize) -> Result<()> {
    ensure!(batch > 0, "batch size must be positive");
    let device = Default::default();

    match config {
        ModelConfig::Dcae(config) => {
            let model = Dcae::<CpuBackend>::new(config, &device)?;
            bench_model(
                &model,
                config.image_shape(batch),
                config.latent_shape(batch),
                warmup,
                iters,
            )
        }
        ModelConfig::Titok(config) => {
            let model = TitokVae::<CpuBackend>::new(config, &device)?;
            bench_model(
                &model,
                config.image_shape(batch),
                config.latent_shape(batch),
                warmup,
                iters,
            )
        }
    }
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Preset { model } => {
            println!("{}", preset(model).to_json_pretty()?);
            Ok(())
        }
        Commands::Inspect { config } => {
            let config = ModelConfig::from_json_file(&config)
                .with_context(|| format!("Failed to load config {}", config.display()))?;
            inspect(&config)
        }
        Commands::Bench {
            config,
            batch,
            warmup,
            iters,
        } => {
            let config = ModelConfig::from_json_file(&config)
                .with_context(|| format!("Failed to load config {}", config.display()))?;
            bench(&config, batch, warmup, iters)
        }
    }
}
