//! burn-ddpm CLI
//!
//! Command-line interface for pixel-space diffusion in pure Rust.
//!
//! Supports:
//! - Training a DDPM on a folder of images
//! - Generating images from a trained checkpoint

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use burn_ddpm::{
    adam_trainer, backends, load_checkpoint, save_batch, save_image, DiffusionProcess, ExperimentConfig,
    ImageFolder, ImageFolderLoader, NoiseSchedule, NoiseSource,
};

#[derive(Parser)]
#[command(name = "burn-ddpm")]
#[command(about = "Pixel-space diffusion (DDPM) training and sampling in pure Rust")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    InitConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Train a model on a directory of images
    Train(TrainArgs),

    /// Generate images from a checkpoint
    Sample(SampleArgs),

    /// Show configuration defaults and available backends
    Info,
}

#[derive(Args)]
struct TrainArgs {
    /// Directory of training images
    #[arg(short, long)]
    data: PathBuf,

    /// Configuration file (defaults when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Images per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Adam learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// Training resolution (multiple of 4)
    #[arg(long)]
    image_size: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Where the final and periodic checkpoints are written
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,

    /// Held-out images evaluated after training
    #[arg(long)]
    eval_data: Option<PathBuf>,

    /// Continue training from a checkpoint directory
    #[arg(long)]
    resume: Option<PathBuf>,
}

#[derive(Args)]
struct SampleArgs {
    /// Checkpoint directory written by `train`
    #[arg(short, long)]
    checkpoint: PathBuf,

    /// Number of images to generate
    #[arg(short, long, default_value = "1")]
    num_images: usize,

    /// Output resolution (multiple of 4)
    #[arg(long, default_value = "64")]
    image_size: usize,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Output PNG path; with several images, `<stem>_NNN.png` next to it
    #[arg(short, long, default_value = "generated_pixel_diffusion.png")]
    output: PathBuf,
}

impl TrainArgs {
    /// Loads the config file (if any) and applies command-line overrides
    fn experiment_config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ExperimentConfig::default(),
        };

        if let Some(epochs) = self.epochs {
            config.training.num_epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(lr) = self.lr {
            config.training.learning_rate = lr;
        }
        if let Some(image_size) = self.image_size {
            config.data.image_size = image_size;
        }
        if self.seed.is_some() {
            config.training.seed = self.seed;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn progress_bar(len: usize, template: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(template)?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Train with a specific backend
fn run_train<B: AutodiffBackend>(args: TrainArgs, device: &B::Device) -> Result<()> {
    let mut config = args.experiment_config()?;
    let mut rng = NoiseSource::new(config.training.seed);

    // a resumed run keeps the network and schedule it was trained with
    let (unet, history) = match &args.resume {
        Some(dir) => {
            let (unet, meta) = load_checkpoint::<B, _>(dir, device)
                .with_context(|| format!("Failed to load checkpoint {}", dir.display()))?;
            info!("Resuming from {} after {} epochs", dir.display(), meta.epoch);
            config.model = meta.model;
            config.schedule = meta.schedule;
            (unet, meta.loss_history)
        }
        None => (config.model.init::<B>(device)?, Vec::new()),
    };

    println!("burn-ddpm: pixel-space diffusion training\n");
    println!("Configuration:");
    println!("  Size:       {0}x{0}", config.data.image_size);
    println!("  Epochs:     {}", config.training.num_epochs);
    println!("  Batch size: {}", config.training.batch_size);
    println!("  LR:         {}", config.training.learning_rate);
    println!("  Steps:      {}", config.schedule.num_train_steps);
    println!("  Backend:    {}", backends::default_backend_name());
    if let Some(dir) = &args.resume {
        println!("  Resume:     {} (epoch {})", dir.display(), history.len());
    }
    println!();

    let folder = ImageFolder::open(&args.data, config.data.image_size)
        .with_context(|| format!("Failed to open dataset {}", args.data.display()))?;
    println!("Found {} images in {}", folder.len(), folder.root().display());
    let loader = ImageFolderLoader::<B>::new(folder, config.training.batch_size, device)?
        .with_shuffle(config.data.shuffle)
        .with_horizontal_flip(config.data.horizontal_flip);

    let schedule = NoiseSchedule::from_config(&config.schedule)?;
    let mut trainer = adam_trainer(unet, schedule, config.training.clone())?
        .with_history(history)
        .with_checkpoint_dir(&args.checkpoint_dir);

    let pb = progress_bar(
        config.training.num_epochs,
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )?;
    trainer
        .fit(&loader, &mut rng, |report| {
            pb.set_message(format!("Loss: {:.6}", report.loss));
            pb.inc(1);
        })
        .context("Training failed")?;
    pb.finish_with_message("Training complete");

    trainer
        .save_checkpoint(&args.checkpoint_dir)
        .context("Failed to save checkpoint")?;
    config
        .to_file(args.checkpoint_dir.join("config.json"))
        .context("Failed to save config")?;
    info!("Model saved to {}", args.checkpoint_dir.display());

    if let Some(eval_dir) = &args.eval_data {
        let folder = ImageFolder::open(eval_dir, config.data.image_size)
            .with_context(|| format!("Failed to open evaluation data {}", eval_dir.display()))?;
        let eval_loader = ImageFolderLoader::<B>::new(folder, config.training.batch_size, device)?;
        let loss = trainer.evaluate(&eval_loader, &mut rng)?;
        println!("Evaluation loss: {:.6}", loss);
    }

    Ok(())
}

/// Sample with a specific backend
fn run_sample<B: Backend>(args: SampleArgs, device: &B::Device) -> Result<()> {
    let (unet, meta) = load_checkpoint::<B, _>(&args.checkpoint, device)
        .with_context(|| format!("Failed to load checkpoint {}", args.checkpoint.display()))?;
    let schedule = meta.noise_schedule()?;
    let process = DiffusionProcess::new(schedule, unet);
    let mut rng = NoiseSource::new(args.seed);

    println!("burn-ddpm: pixel-space diffusion sampling\n");
    println!("  Checkpoint: {} (epoch {})", args.checkpoint.display(), meta.epoch);
    println!("  Images:     {}", args.num_images);
    println!("  Size:       {0}x{0}", args.image_size);
    println!("  Steps:      {}", process.num_steps());
    println!();

    let pb = progress_bar(
        process.num_steps(),
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )?;
    let shape = [args.num_images, 3, args.image_size, args.image_size];
    let images = process.sample_with_callback::<B, _>(shape, device, &mut rng, |step| {
        pb.set_position((step.step + 1) as u64);
        pb.set_message(format!("t = {}", step.timestep));
    })?;
    pb.finish_and_clear();

    if args.num_images == 1 {
        save_image(images, 0, &args.output)?;
        println!("Generated image saved as {}", args.output.display());
    } else {
        let dir = args
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let prefix = args
            .output
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("sample");
        let paths = save_batch(images, dir, prefix)?;
        println!("Generated {} images in {}", paths.len(), dir.display());
    }

    Ok(())
}

fn print_info() -> Result<()> {
    println!("burn-ddpm: pixel-space diffusion in pure Rust\n");
    println!("Available backends:");

    #[cfg(feature = "ndarray")]
    println!("  - ndarray (CPU, enabled)");
    #[cfg(not(feature = "ndarray"))]
    println!("  - ndarray (CPU, not enabled)");

    #[cfg(feature = "wgpu")]
    println!("  - wgpu (WebGPU, enabled)");
    #[cfg(not(feature = "wgpu"))]
    println!("  - wgpu (WebGPU, not enabled)");

    println!("\nDefault backend: {}", backends::default_backend_name());
    println!("\nDefault configuration:");
    println!("{}", serde_json::to_string_pretty(&ExperimentConfig::default())?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::InitConfig { output } => {
            ExperimentConfig::default()
                .to_file(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Configuration written to {}", output.display());
            Ok(())
        }

        Commands::Train(args) => {
            #[cfg(any(feature = "ndarray", feature = "wgpu"))]
            {
                let device = backends::default_device();
                run_train::<backends::TrainBackend>(args, &device)
            }

            #[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
            {
                let _ = args;
                anyhow::bail!("No backend enabled. Enable 'wgpu' or 'ndarray' feature.")
            }
        }

        Commands::Sample(args) => {
            #[cfg(any(feature = "ndarray", feature = "wgpu"))]
            {
                let device = backends::default_device();
                run_sample::<backends::DefaultBackend>(args, &device)
            }

            #[cfg(not(any(feature = "ndarray", feature = "wgpu")))]
            {
                let _ = args;
                anyhow::bail!("No backend enabled. Enable 'wgpu' or 'ndarray' feature.")
            }
        }

        Commands::Info => print_info(),
    }
}
