//! Pixel-Space Diffusion on Burn
//!
//! Train a DDPM on a folder of images and generate new ones by ancestral
//! sampling, directly in pixel space.
//!
//! # Crates
//!
//! - [`burn_ddpm_core`] - Error kinds, seeded noise, the [`Denoiser`] seam
//! - [`burn_ddpm_samplers`] - Linear noise schedule and the diffusion process
//! - [`burn_ddpm_unet`] - The time-conditioned UNet noise predictor
//!
//! # Modules
//!
//! - [`config`] - JSON experiment configuration
//! - [`dataset`] - Image folder batch source
//! - [`train`] - Adam training loop
//! - [`checkpoint`] - Parameter and metadata persistence
//! - [`export`] - PNG export of generated tensors
//! - [`backends`] - Backend selection by cargo feature
//!
//! # Example
//!
//! ```ignore
//! use burn_ddpm::backends::{default_device, TrainBackend};
//! use burn_ddpm::*;
//!
//! let config = ExperimentConfig::default();
//! let device = default_device();
//! let mut rng = NoiseSource::new(config.training.seed);
//!
//! let folder = ImageFolder::open("flowers", config.data.image_size)?;
//! let loader = ImageFolderLoader::<TrainBackend>::new(folder, config.training.batch_size, &device)?
//!     .with_shuffle(true)
//!     .with_horizontal_flip(true);
//!
//! let unet = config.model.init::<TrainBackend>(&device)?;
//! let schedule = NoiseSchedule::from_config(&config.schedule)?;
//! let mut trainer = adam_trainer(unet, schedule.clone(), config.training.clone())?;
//! trainer.fit(&loader, &mut rng, |_| {})?;
//!
//! let process = DiffusionProcess::new(schedule, trainer.model().valid());
//! let images = process.sample([4, 3, 64, 64], &device, &mut rng)?;
//! save_batch(images, "samples", "sample")?;
//! ```

pub mod backends;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod export;
pub mod train;

pub use burn_ddpm_core::{Denoiser, DiffusionError, NoiseSource};
pub use burn_ddpm_samplers::{DdpmSampler, DiffusionProcess, NoiseSchedule, SamplingState, ScheduleConfig, StepInfo};
pub use burn_ddpm_unet::{PixelUNet, PixelUNetConfig};

pub use checkpoint::{load_checkpoint, save_checkpoint, CheckpointError, CheckpointMeta};
pub use config::{ConfigError, DataConfig, ExperimentConfig};
pub use dataset::{DatasetError, ImageFolder, ImageFolderLoader};
pub use export::{save_batch, save_image, tensor_to_rgb, ExportError};
pub use train::{adam_trainer, BatchReport, EpochReport, TrainError, Trainer, TrainingConfig};
