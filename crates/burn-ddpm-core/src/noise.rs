//! Seeded randomness for noise draws
//!
//! Every random quantity in training and sampling (Gaussian noise, training
//! timesteps, data shuffling and flips) is drawn from one [`NoiseSource`]
//! passed in by the caller, so a fixed seed reproduces a run exactly
//! regardless of which backend executes the tensor math.

use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Random generator handle threaded through the diffusion operations
#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng: StdRng,
    seed: Option<u64>,
}

impl NoiseSource {
    /// Creates a generator with a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Creates a generator seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Seeded when `seed` is given, entropy otherwise
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// The seed this generator was created with, if any
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Draws a tensor of independent standard-normal values
    pub fn standard_normal<B: Backend, const D: usize>(
        &mut self,
        shape: [usize; D],
        device: &B::Device,
    ) -> Tensor<B, D> {
        let numel: usize = shape.iter().product();
        let values: Vec<f32> = (0..numel).map(|_| self.rng.sample(StandardNormal)).collect();
        Tensor::from_data(TensorData::new(values, shape), device)
    }

    /// Draws standard-normal noise shaped like `like`, on the same device
    pub fn standard_normal_like<B: Backend, const D: usize>(&mut self, like: &Tensor<B, D>) -> Tensor<B, D> {
        self.standard_normal(like.dims(), &like.device())
    }

    /// Draws `batch` timesteps uniformly from `[0, n_steps)`
    pub fn timesteps(&mut self, batch: usize, n_steps: usize) -> Vec<usize> {
        (0..batch).map(|_| self.rng.gen_range(0..n_steps)).collect()
    }

    /// Fair coin flip
    pub fn coin_flip(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }

    /// Shuffles a slice in place
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_same_seed_same_noise() {
        let device = Default::default();
        let a = NoiseSource::seeded(7).standard_normal::<TestBackend, 4>([2, 3, 4, 4], &device);
        let b = NoiseSource::seeded(7).standard_normal::<TestBackend, 4>([2, 3, 4, 4], &device);
        let a: Vec<f32> = a.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_statistics() {
        let device = Default::default();
        let noise = NoiseSource::seeded(1).standard_normal::<TestBackend, 1>([20_000], &device);
        let values: Vec<f32> = noise.into_data().to_vec().unwrap();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "var {var}");
    }

    #[test]
    fn test_timesteps_in_range() {
        let mut rng = NoiseSource::seeded(3);
        let t = rng.timesteps(512, 10);
        assert_eq!(t.len(), 512);
        assert!(t.iter().all(|&t| t < 10));
        // with 512 draws over 10 values every value should show up
        assert!((0..10).all(|v| t.contains(&v)));
    }
}
