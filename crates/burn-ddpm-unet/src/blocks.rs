//! UNet building blocks: time embedding, convolution stages, down/up sampling

use burn::nn::{
    conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Timestep embedding MLP
///
/// Maps the raw (unnormalized) timestep value through
/// `Linear(1, dim) → ReLU → Linear(dim, dim)`.
#[derive(Module, Debug)]
pub struct TimeEmbedding<B: Backend> {
    /// Projection from the scalar timestep
    pub linear_1: Linear<B>,
    /// Output projection
    pub linear_2: Linear<B>,
}

impl<B: Backend> TimeEmbedding<B> {
    /// Creates a new time embedding of width `dim`
    pub fn new(dim: usize, device: &B::Device) -> Self {
        Self {
            linear_1: LinearConfig::new(1, dim).init(device),
            linear_2: LinearConfig::new(dim, dim).init(device),
        }
    }

    /// Embeds a batch of timesteps
    ///
    /// # Arguments
    ///
    /// * `timesteps` - Timestep values as floats, shape `[batch]`
    ///
    /// # Returns
    ///
    /// Embedding of shape `[batch, dim]`
    pub fn forward(&self, timesteps: Tensor<B, 1>) -> Tensor<B, 2> {
        let [batch] = timesteps.dims();
        let hidden = self.linear_1.forward(timesteps.reshape([batch, 1]));
        let hidden = relu(hidden);
        self.linear_2.forward(hidden)
    }
}

fn conv3x3<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

/// Two 3x3 same-padding convolutions, each followed by ReLU
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    /// First convolution (changes the channel count)
    pub conv1: Conv2d<B>,
    /// Second convolution
    pub conv2: Conv2d<B>,
}

impl<B: Backend> ConvStage<B> {
    /// Creates a new convolution stage
    ///
    /// # Arguments
    ///
    /// * `in_channels` - Number of input channels
    /// * `out_channels` - Number of output channels
    /// * `device` - Device to create tensors on
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self::with_hidden(in_channels, out_channels, out_channels, device)
    }

    /// Stage whose first convolution produces `hidden` channels
    pub fn with_hidden(in_channels: usize, hidden: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            conv1: conv3x3(in_channels, hidden, device),
            conv2: conv3x3(hidden, out_channels, device),
        }
    }

    /// Output has the same spatial size as the input
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let hidden = relu(self.conv1.forward(x));
        relu(self.conv2.forward(hidden))
    }
}

/// Downsample block (kernel 4, stride 2, padding 1 convolution)
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    /// Strided convolution for downsampling
    pub conv: Conv2d<B>,
}

impl<B: Backend> Downsample<B> {
    /// Creates a new downsample block (2x spatial reduction)
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [4, 4])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        Self { conv }
    }

    /// Downsamples input by 2x using strided convolution
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor of shape `[batch, in_channels, height, width]`
    ///
    /// # Returns
    ///
    /// Output tensor of shape `[batch, out_channels, height/2, width/2]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(x)
    }
}

/// Upsample block (kernel 4, stride 2, padding 1 transposed convolution)
#[derive(Module, Debug)]
pub struct Upsample<B: Backend> {
    /// Transposed convolution for upsampling
    pub conv: ConvTranspose2d<B>,
}

impl<B: Backend> Upsample<B> {
    /// Creates a new upsample block (2x spatial increase)
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = ConvTranspose2dConfig::new([in_channels, out_channels], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        Self { conv }
    }

    /// Output tensor of shape `[batch, out_channels, height*2, width*2]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(x)
    }
}

/// Adds the leading `channels` entries of the time embedding to every pixel
///
/// `emb` has shape `[batch, dim]` with `dim >= channels`.
pub fn inject_time<B: Backend>(x: Tensor<B, 4>, emb: Tensor<B, 2>) -> Tensor<B, 4> {
    let [b, c, _, _] = x.dims();
    let emb = emb.slice([0..b, 0..c]).reshape([b, c, 1, 1]);
    x + emb
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_time_embedding_shape() {
        let device = Default::default();
        let embed = TimeEmbedding::<TestBackend>::new(32, &device);
        let t = Tensor::<TestBackend, 1>::from_data(TensorData::new(vec![0.0f32, 500.0, 999.0], [3]), &device);
        assert_eq!(embed.forward(t).dims(), [3, 32]);
    }

    #[test]
    fn test_down_up_resolution() {
        let device = Default::default();
        let down = Downsample::<TestBackend>::new(4, 8, &device);
        let up = Upsample::<TestBackend>::new(8, 4, &device);

        let x = Tensor::<TestBackend, 4>::ones([2, 4, 16, 12], &device);
        let h = down.forward(x);
        assert_eq!(h.dims(), [2, 8, 8, 6]);
        assert_eq!(up.forward(h).dims(), [2, 4, 16, 12]);
    }

    #[test]
    fn test_conv_stage_keeps_spatial_size() {
        let device = Default::default();
        let stage = ConvStage::<TestBackend>::new(3, 5, &device);
        let x = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
        let out = stage.forward(x);
        assert_eq!(out.dims(), [1, 5, 8, 8]);
        // ReLU output is never negative
        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_inject_time_uses_leading_entries() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::zeros([2, 2, 2, 2], &device);
        let emb = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 9.0, 3.0, 4.0, 9.0], [2, 3]),
            &device,
        );

        let values: Vec<f32> = inject_time(x, emb).into_data().to_vec().unwrap();
        assert_eq!(
            values,
            vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0, 4.0, 4.0, 4.0, 4.0]
        );
    }
}
