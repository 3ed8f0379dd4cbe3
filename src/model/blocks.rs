use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Initializer, PRelu, PReluConfig, PaddingConfig2d,
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

/// One stage of the feature extractor: a wide 5x5 convolution, a 3x3
/// refinement, and a pooling step that eats part of the feature axis
/// according to the stride plan.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    conv1: Conv2d<B>,
    act1: PRelu<B>,
    norm1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    act2: PRelu<B>,
    norm2: BatchNorm<B, 2>,
}

fn he_normal() -> Initializer {
    Initializer::KaimingNormal {
        gain: 1.0,
        fan_out_only: false,
    }
}

impl<B: Backend> ConvStage<B> {
    pub fn init(
        in_channels: usize,
        out_channels: usize,
        pool_size: [usize; 2],
        stride: [usize; 2],
        training: bool,
        device: &Device<B>,
    ) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [5, 5])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(he_normal())
            .init(device);
        let act1 = PReluConfig::new().init(device);
        let norm1 = Self::norm(out_channels, training, device);

        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .with_initializer(he_normal())
            .init(device);
        let pool = MaxPool2dConfig::new(pool_size)
            .with_strides(stride)
            .with_padding(PaddingConfig2d::Valid)
            .init();
        let act2 = PReluConfig::new().init(device);
        let norm2 = Self::norm(out_channels, training, device);

        ConvStage {
            conv1,
            act1,
            norm1,
            conv2,
            pool,
            act2,
            norm2,
        }
    }

    // Normalization statistics stay trainable only in training mode.
    fn norm(channels: usize, training: bool, device: &Device<B>) -> BatchNorm<B, 2> {
        let norm = BatchNormConfig::new(channels).init(device);
        if training { norm } else { norm.no_grad() }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(input);
        let x = self.act1.forward(x);
        let x = self.norm1.forward(x);

        let x = self.conv2.forward(x);
        let x = self.pool.forward(x);
        let x = self.act2.forward(x);
        self.norm2.forward(x)
    }
}
