//! Core Types for Pixel-Space Diffusion
//!
//! Shared pieces used by the schedule, the denoising network and the
//! training/sampling collaborators in the burn-ddpm workspace.
//!
//! # Modules
//!
//! - [`error`] - Precondition failures ([`DiffusionError`])
//! - [`noise`] - Seeded standard-normal generator ([`NoiseSource`])
//! - [`denoiser`] - The noise-prediction seam ([`Denoiser`])
//! - [`shape`] - Batch/timestep and spatial shape checks
//!
//! # Example
//!
//! ```ignore
//! use burn_ddpm_core::NoiseSource;
//!
//! let mut rng = NoiseSource::seeded(42);
//! let noise = rng.standard_normal::<Backend, 4>([1, 3, 64, 64], &device);
//! let t = rng.timesteps(1, 1000);
//! ```

pub mod denoiser;
pub mod error;
pub mod noise;
pub mod shape;

pub use denoiser::Denoiser;
pub use error::DiffusionError;
pub use noise::NoiseSource;
pub use shape::{batch_timesteps, check_batch, check_spatial_divisible};
