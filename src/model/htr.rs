use crate::model::{blocks::ConvStage, stride::pool_strides};
use burn::{
    module::Ignored,
    nn::{BiLstm, BiLstmConfig, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};

const FILTERS: [usize; 4] = [64, 128, 256, 512];

#[derive(Config, Debug)]
pub struct HtrModelConfig {
    /// Width of the per-timestep feature vector.
    pub nb_features: usize,
    /// Number of distinct symbols; the output head adds one class for the
    /// CTC blank.
    pub vocab_size: usize,
    #[config(default = true)]
    pub training: bool,
    #[config(default = 512)]
    pub rnn_units: usize,
}

/// CNN -> BiLSTM -> per-timestep dense head.
///
/// The four convolutional stages collapse the feature axis to width 1 via the
/// stride plan; the surviving `[batch, steps, channels]` sequence feeds the
/// recurrent head.
#[derive(Module, Debug)]
pub struct HtrModel<B: Backend> {
    stages: Vec<ConvStage<B>>,
    blstm: BiLstm<B>,
    dense: Linear<B>,
    pool_heights: Ignored<Vec<usize>>,
}

impl HtrModelConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> HtrModel<B> {
        let (pool_sizes, strides) = pool_strides(self.nb_features, FILTERS.len());

        let mut stages = Vec::with_capacity(FILTERS.len());
        let mut in_channels = 1;
        for (i, &out_channels) in FILTERS.iter().enumerate() {
            stages.push(ConvStage::init(
                in_channels,
                out_channels,
                pool_sizes[i],
                strides[i],
                self.training,
                device,
            ));
            in_channels = out_channels;
        }

        let he_normal = Initializer::KaimingNormal {
            gain: 1.0,
            fan_out_only: false,
        };
        let blstm = BiLstmConfig::new(FILTERS[FILTERS.len() - 1], self.rnn_units, true)
            .with_initializer(he_normal.clone())
            .init(device);
        let dense = LinearConfig::new(2 * self.rnn_units, self.vocab_size + 1)
            .with_initializer(he_normal)
            .init(device);

        HtrModel {
            stages,
            blstm,
            dense,
            pool_heights: Ignored(pool_sizes.iter().map(|p| p[0]).collect()),
        }
    }
}

impl<B: Backend> HtrModel<B> {
    /// Raw per-timestep logits, `[batch, steps, vocab + 1]`.
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, steps, features] = input.dims();
        let mut x = input.reshape([batch, 1, steps, features]);

        for stage in &self.stages {
            x = stage.forward(x);
        }

        // Feature axis is down to 1 here; fold it away and put time first.
        let [b, channels, steps, width] = x.dims();
        let seq = x.reshape([b, channels, steps * width]).swap_dims(1, 2);

        let (seq, _state) = self.blstm.forward(seq, None);
        self.dense.forward(seq)
    }

    pub fn forward_probs(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        softmax(self.forward(input), 2)
    }

    pub fn forward_log_probs(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        log_softmax(self.forward(input), 2)
    }

    /// Number of timesteps the head emits for an input of `steps` timesteps.
    ///
    /// Valid pooling with a window of height `h` and unit vertical stride
    /// trims `h - 1` steps per stage.
    pub fn output_steps(&self, steps: usize) -> usize {
        self.pool_heights
            .0
            .iter()
            .fold(steps, |acc, h| acc.saturating_sub(h - 1).max(1))
    }

    pub fn num_classes(&self) -> usize {
        self.dense.weight.val().dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn head_emits_vocab_plus_blank_classes() {
        let device = Default::default();
        let model: HtrModel<TestBackend> = HtrModelConfig::new(16, 5).init(&device);

        let input = Tensor::<TestBackend, 3>::zeros([2, 12, 16], &device);
        let output = model.forward(input);

        // 16 = 2^4, so every pool window has height 1 and time is preserved.
        assert_eq!(output.dims(), [2, 12, 6]);
        assert_eq!(model.num_classes(), 6);
    }

    #[test]
    fn probabilities_sum_to_one_per_timestep() {
        let device = Default::default();
        let model: HtrModel<TestBackend> = HtrModelConfig::new(16, 3).init(&device);

        let input = Tensor::<TestBackend, 3>::ones([1, 8, 16], &device);
        let probs = model.forward_probs(input);
        let sums: Vec<f32> = probs
            .sum_dim(2)
            .into_data()
            .to_vec()
            .expect("contiguous probabilities");

        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn output_steps_accounts_for_pool_windows() {
        let device = Default::default();

        // 16 = 2^4: unit pool heights, no trimming.
        let model: HtrModel<TestBackend> = HtrModelConfig::new(16, 5).init(&device);
        assert_eq!(model.output_steps(40), 40);

        // 60 -> pools of height 2,1,1,1: one step trimmed.
        let model: HtrModel<TestBackend> = HtrModelConfig::new(60, 5).init(&device);
        assert_eq!(model.output_steps(40), 39);
    }
}
