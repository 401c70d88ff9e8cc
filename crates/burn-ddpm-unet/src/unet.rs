//! Pixel-space UNet
//!
//! ```text
//! x ─ enc1 ─┬─ down1 ─ enc2 ─┬─ down2 ─ enc3 ─ bottleneck ─ up1 ─ cat ─ dec1 ─ up2 ─ cat ─ dec2 ─ out
//!           │                └──────────────── S2 ──────────────────┘                │
//!           └─────────────────────────────── S1 ─────────────────────────────────────┘
//! ```
//!
//! Each encoder stage adds the leading `channels` entries of the time
//! embedding to its output. The decoder and bottleneck are not
//! time-conditioned.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use burn_ddpm_core::{batch_timesteps, check_batch, check_spatial_divisible, Denoiser, DiffusionError};

use crate::blocks::{inject_time, ConvStage, Downsample, TimeEmbedding, Upsample};

/// Input height and width must be multiples of this (two 2x downsamples)
pub const DOWNSAMPLE_FACTOR: usize = 4;

/// PixelUNet configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelUNetConfig {
    /// Image channels (3 for RGB)
    pub in_channels: usize,
    /// Channels of the first encoder stage
    pub base_channels: usize,
    /// Width of the time embedding; at least 4 * base_channels
    ///
    /// The default of 256 covers the 4 * 64 channels of the third encoder
    /// stage, which reads that many leading embedding entries. A 128-wide
    /// embedding cannot feed it with the default base width.
    pub time_emb_dim: usize,
}

impl Default for PixelUNetConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            base_channels: 64,
            time_emb_dim: 256,
        }
    }
}

impl PixelUNetConfig {
    /// Creates a config with the given channel counts
    pub fn new(in_channels: usize, base_channels: usize, time_emb_dim: usize) -> Self {
        Self {
            in_channels,
            base_channels,
            time_emb_dim,
        }
    }

    /// Checks that the network can be built from this config
    pub fn validate(&self) -> Result<(), DiffusionError> {
        if self.in_channels == 0 || self.base_channels == 0 || self.time_emb_dim == 0 {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "channel counts must be positive (in_channels={}, base_channels={}, time_emb_dim={})",
                self.in_channels, self.base_channels, self.time_emb_dim
            )));
        }
        let deepest = 4 * self.base_channels;
        if self.time_emb_dim < deepest {
            return Err(DiffusionError::InvalidConfiguration(format!(
                "time_emb_dim {} is smaller than the {} channels of the third encoder stage",
                self.time_emb_dim, deepest
            )));
        }
        Ok(())
    }

    /// Initialize the network
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<PixelUNet<B>, DiffusionError> {
        self.validate()?;

        let c = self.base_channels;
        Ok(PixelUNet {
            time_embed: TimeEmbedding::new(self.time_emb_dim, device),
            enc1: ConvStage::new(self.in_channels, c, device),
            down1: Downsample::new(c, c * 2, device),
            enc2: ConvStage::new(c * 2, c * 2, device),
            down2: Downsample::new(c * 2, c * 4, device),
            enc3: ConvStage::new(c * 4, c * 4, device),
            bottleneck: ConvStage::with_hidden(c * 4, c * 8, c * 4, device),
            up1: Upsample::new(c * 4, c * 2, device),
            dec1: ConvStage::new(c * 4, c * 2, device),
            up2: Upsample::new(c * 2, c, device),
            dec2: ConvStage::new(c * 2, c, device),
            conv_out: Conv2dConfig::new([c, self.in_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            in_channels: self.in_channels,
            base_channels: c,
            time_emb_dim: self.time_emb_dim,
        })
    }
}

/// Time-conditioned encoder-decoder predicting the noise in an image
#[derive(Module, Debug)]
pub struct PixelUNet<B: Backend> {
    /// Timestep MLP
    pub time_embed: TimeEmbedding<B>,
    /// Encoder stage 1 (base channels, full resolution)
    pub enc1: ConvStage<B>,
    /// Full → ½ resolution
    pub down1: Downsample<B>,
    /// Encoder stage 2 (2x base channels)
    pub enc2: ConvStage<B>,
    /// ½ → ¼ resolution
    pub down2: Downsample<B>,
    /// Encoder stage 3 (4x base channels)
    pub enc3: ConvStage<B>,
    /// Expands to 8x base channels and contracts back to 4x
    pub bottleneck: ConvStage<B>,
    /// ¼ → ½ resolution
    pub up1: Upsample<B>,
    /// Fuses up1 output with skip S2
    pub dec1: ConvStage<B>,
    /// ½ → full resolution
    pub up2: Upsample<B>,
    /// Fuses up2 output with skip S1
    pub dec2: ConvStage<B>,
    /// Projection back to image channels (no activation)
    pub conv_out: Conv2d<B>,
    in_channels: usize,
    base_channels: usize,
    time_emb_dim: usize,
}

impl<B: Backend> PixelUNet<B> {
    /// The configuration this network was built from
    pub fn config(&self) -> PixelUNetConfig {
        PixelUNetConfig::new(self.in_channels, self.base_channels, self.time_emb_dim)
    }

    /// Forward pass
    ///
    /// # Arguments
    ///
    /// * `x` - Noisy images `[batch, in_channels, height, width]`, height and
    ///   width divisible by [`DOWNSAMPLE_FACTOR`]
    /// * `timesteps` - Timestep per batch element as floats, shape `[batch]`
    ///
    /// # Returns
    ///
    /// Predicted noise with the same shape as `x`
    pub fn forward(&self, x: Tensor<B, 4>, timesteps: Tensor<B, 1>) -> Tensor<B, 4> {
        let emb = self.time_embed.forward(timesteps);

        // Encoder
        let s1 = inject_time(self.enc1.forward(x), emb.clone());
        let h = self.down1.forward(s1.clone());
        let s2 = inject_time(self.enc2.forward(h), emb.clone());
        let h = self.down2.forward(s2.clone());
        let h = inject_time(self.enc3.forward(h), emb);

        let h = self.bottleneck.forward(h);

        // Decoder: upsampled features first, then the skip buffer
        let h = self.up1.forward(h);
        let h = self.dec1.forward(Tensor::cat(vec![h, s2], 1));
        let h = self.up2.forward(h);
        let h = self.dec2.forward(Tensor::cat(vec![h, s1], 1));

        self.conv_out.forward(h)
    }
}

impl<B: Backend> Denoiser<B> for PixelUNet<B> {
    fn predict(&self, x: Tensor<B, 4>, timesteps: &[usize]) -> Result<Tensor<B, 4>, DiffusionError> {
        let dims = x.dims();
        self.check_input(dims)?;

        let batch = dims[0];
        let values: Vec<f32> = batch_timesteps(timesteps, batch)?
            .into_iter()
            .map(|t| t as f32)
            .collect();
        let t = Tensor::<B, 1>::from_data(TensorData::new(values, [batch]), &x.device());

        Ok(self.forward(x, t))
    }

    fn check_input(&self, dims: [usize; 4]) -> Result<(), DiffusionError> {
        check_batch(dims)?;
        let [_, channels, _, _] = dims;
        if channels != self.in_channels {
            return Err(DiffusionError::ShapeMismatch(format!(
                "expected {} input channels, got {channels}",
                self.in_channels
            )));
        }
        check_spatial_divisible(dims, DOWNSAMPLE_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PixelUNetConfig::default();
        assert_eq!(config, PixelUNetConfig::new(3, 64, 256));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_narrow_time_embedding_rejected() {
        let config = PixelUNetConfig::new(3, 64, 128);
        assert!(matches!(
            config.validate(),
            Err(DiffusionError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(PixelUNetConfig::new(0, 8, 32).validate().is_err());
        assert!(PixelUNetConfig::new(3, 0, 32).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PixelUNetConfig = serde_json::from_str(r#"{"base_channels": 32}"#).unwrap();
        assert_eq!(config, PixelUNetConfig::new(3, 32, 256));
    }
}
