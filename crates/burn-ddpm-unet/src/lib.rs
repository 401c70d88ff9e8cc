//! Pixel-Space UNet Noise Predictor
//!
//! A compact time-conditioned encoder-decoder that predicts the noise added
//! to an image at a given diffusion timestep.
//!
//! # Architecture
//!
//! Two encoder stages with skip buffers, a third encoder stage, a bottleneck
//! and two decoder stages that fuse the upsampled features with the matching
//! skip buffer. Resolution goes full → ½ → ¼ and back, so input height and
//! width must be divisible by 4.
//!
//! # Building Blocks
//!
//! - [`TimeEmbedding`] - Two-layer MLP on the raw timestep
//! - [`ConvStage`] - Pair of 3x3 convolutions with ReLU
//! - [`Downsample`], [`Upsample`] - Strided and transposed convolutions
//!
//! # Example
//!
//! ```ignore
//! use burn_ddpm_core::Denoiser;
//! use burn_ddpm_unet::PixelUNetConfig;
//!
//! let unet = PixelUNetConfig::default().init::<Backend>(&device)?;
//! let noise_pred = unet.predict(noisy_images, &[999])?;
//! ```

pub mod blocks;
pub mod unet;

pub use blocks::{inject_time, ConvStage, Downsample, TimeEmbedding, Upsample};
pub use unet::{PixelUNet, PixelUNetConfig, DOWNSAMPLE_FACTOR};
