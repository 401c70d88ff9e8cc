//! Noise schedule and DDPM process for pixel-space diffusion
//!
//! - [`NoiseSchedule`] - linear beta schedule with alpha and alpha_bar tables
//! - [`DdpmSampler`] - the reverse (denoising) step math
//! - [`DiffusionProcess`] - forward corruption, training loss and ancestral sampling
//!   around any [`Denoiser`](burn_ddpm_core::Denoiser)

pub mod ddpm;
pub mod diffusion;
pub mod scheduler;

pub use ddpm::DdpmSampler;
pub use diffusion::{DiffusionProcess, SamplingState, StepInfo};
pub use scheduler::{NoiseSchedule, ScheduleConfig};
