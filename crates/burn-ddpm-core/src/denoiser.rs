//! The noise-prediction seam between the diffusion process and a network

use burn::prelude::*;

use crate::error::DiffusionError;

/// A time-conditioned noise predictor
///
/// Given a noisy batch `x` of shape `[batch, channels, height, width]` and one
/// timestep per batch element (or one shared timestep), returns the predicted
/// noise with the same shape as `x`.
pub trait Denoiser<B: Backend> {
    /// Predicts the noise that was mixed into `x` at `timesteps`
    fn predict(&self, x: Tensor<B, 4>, timesteps: &[usize]) -> Result<Tensor<B, 4>, DiffusionError>;

    /// Rejects input shapes the network cannot process
    ///
    /// Called before any noise is drawn so sampling fails fast.
    fn check_input(&self, dims: [usize; 4]) -> Result<(), DiffusionError> {
        let _ = dims;
        Ok(())
    }
}

impl<B: Backend, D: Denoiser<B> + ?Sized> Denoiser<B> for &D {
    fn predict(&self, x: Tensor<B, 4>, timesteps: &[usize]) -> Result<Tensor<B, 4>, DiffusionError> {
        (**self).predict(x, timesteps)
    }

    fn check_input(&self, dims: [usize; 4]) -> Result<(), DiffusionError> {
        (**self).check_input(dims)
    }
}
