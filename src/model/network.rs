use crate::{
    data::DataSource,
    environment::Environment,
    model::htr::{HtrModel, HtrModelConfig},
};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use color_eyre::{Result, eyre::WrapErr};
use log::info;
use std::path::PathBuf;

/// Checkpoint record format. Full precision: a resumed model must be
/// weight-identical to the one that was saved, and half-precision records
/// round every parameter through f16.
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// CTC decoding settings carried alongside the model.
#[derive(Config, Debug)]
pub struct DecoderConfig {
    #[config(default = false)]
    pub greedy: bool,
    #[config(default = 100)]
    pub beam_width: usize,
    #[config(default = 1)]
    pub top_paths: usize,
}

/// The assembled HTR network: model, decoder settings and the experiment
/// paths the training callbacks bind to.
pub struct HtrNetwork<B: Backend> {
    pub model: HtrModel<B>,
    pub decoder: DecoderConfig,
    pub checkpoint: PathBuf,
    pub log_dir: PathBuf,
    pub resumed: bool,
}

impl<B: Backend> HtrNetwork<B> {
    /// Build the network for `source` and warm-start it from the checkpoint
    /// file if one already exists under the output root.
    pub fn new(env: &Environment, source: &DataSource, device: &Device<B>) -> Result<Self> {
        let model = HtrModelConfig::new(source.nb_features, source.vocab_size())
            .with_training(source.training)
            .init(device);

        let checkpoint = env.checkpoint();
        let resumed = env.checkpoint_file().is_file();

        let model = if resumed {
            info!("resuming from checkpoint {:?}", env.checkpoint_file());
            model
                .load_file(checkpoint.clone(), &CheckpointRecorder::new(), device)
                .wrap_err("Failed to load checkpoint weights")?
        } else {
            model
        };

        Ok(HtrNetwork {
            model,
            decoder: DecoderConfig::new(),
            checkpoint,
            log_dir: env.log.clone(),
            resumed,
        })
    }

    /// Persist the current weights to the checkpoint path.
    pub fn save_checkpoint(&self) -> Result<()> {
        self.model
            .clone()
            .save_file(self.checkpoint.clone(), &CheckpointRecorder::new())
            .wrap_err("Failed to save checkpoint weights")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    type TestBackend = burn::backend::NdArray;

    fn scratch_env(name: &str) -> Environment {
        let root = std::env::temp_dir().join(format!("htr-nn-{name}-{}", std::process::id()));
        Environment::new(root.join("dataset"), root.join("output"))
    }

    #[test]
    fn fresh_build_does_not_resume() {
        let env = scratch_env("fresh");
        let source = DataSource::new(16, ['a', 'b'], true);

        let network = HtrNetwork::<TestBackend>::new(&env, &source, &Default::default())
            .expect("fresh build");

        assert!(!network.resumed);
        assert_eq!(network.model.num_classes(), 3);
        assert!(!network.decoder.greedy);
        assert_eq!(network.decoder.beam_width, 100);
        assert_eq!(network.decoder.top_paths, 1);
    }

    #[test]
    fn rebuild_restores_saved_weights() {
        let env = scratch_env("resume");
        let source = DataSource::new(16, ['a', 'b', 'c'], true);
        let device = Default::default();

        fs::create_dir_all(&env.output).expect("scratch output dir");

        let first =
            HtrNetwork::<TestBackend>::new(&env, &source, &device).expect("first build");
        first.save_checkpoint().expect("save checkpoint");

        let second =
            HtrNetwork::<TestBackend>::new(&env, &source, &device).expect("second build");
        assert!(second.resumed);

        let input = Tensor::<TestBackend, 3>::ones([1, 6, 16], &device);
        let a: Vec<f32> = first
            .model
            .forward(input.clone())
            .into_data()
            .to_vec()
            .expect("first output");
        let b: Vec<f32> = second
            .model
            .forward(input)
            .into_data()
            .to_vec()
            .expect("second output");

        assert_eq!(a, b);

        fs::remove_dir_all(env.output.parent().unwrap_or(&env.output)).ok();
    }
}
