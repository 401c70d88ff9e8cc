//! Backend support for burn-ddpm
//!
//! Enable the desired backend via feature flags:
//!
//! - `ndarray`: CPU backend using ndarray (default, no GPU required)
//! - `wgpu`: WebGPU backend (cross-platform GPU support)
//!
//! Training wraps the selected backend in [`Autodiff`].
//!
//! # Example
//!
//! ```ignore
//! use burn_ddpm::backends::{default_device, TrainBackend};
//! use burn_ddpm::PixelUNetConfig;
//!
//! let device = default_device();
//! let unet = PixelUNetConfig::default().init::<TrainBackend>(&device)?;
//! ```

pub use burn_autodiff::Autodiff;

#[cfg(feature = "ndarray")]
pub use burn_ndarray::{NdArray, NdArrayDevice};

#[cfg(feature = "wgpu")]
pub use burn_wgpu::{Wgpu, WgpuDevice};

/// Type alias for the default backend when using ndarray feature
#[cfg(feature = "ndarray")]
pub type DefaultBackend = NdArray<f32>;

/// Type alias for the default backend when using wgpu feature
#[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
pub type DefaultBackend = Wgpu;

/// Default backend with gradient tracking, used for training
#[cfg(any(feature = "ndarray", feature = "wgpu"))]
pub type TrainBackend = Autodiff<DefaultBackend>;

/// Get the default device for the enabled backend
#[cfg(feature = "ndarray")]
pub fn default_device() -> NdArrayDevice {
    NdArrayDevice::default()
}

/// Get the default device for the enabled backend
#[cfg(all(feature = "wgpu", not(feature = "ndarray")))]
pub fn default_device() -> WgpuDevice {
    WgpuDevice::default()
}

/// Names of the backends compiled into this build
pub fn enabled_backends() -> Vec<&'static str> {
    let mut names = Vec::new();
    if cfg!(feature = "ndarray") {
        names.push("ndarray");
    }
    if cfg!(feature = "wgpu") {
        names.push("wgpu");
    }
    names
}

/// Name of the backend behind [`DefaultBackend`]
pub fn default_backend_name() -> &'static str {
    if cfg!(feature = "ndarray") {
        "ndarray"
    } else if cfg!(feature = "wgpu") {
        "wgpu"
    } else {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "ndarray")]
    fn test_ndarray_is_default() {
        assert_eq!(default_backend_name(), "ndarray");
        assert!(enabled_backends().contains(&"ndarray"));
    }
}
