use burn::backend::{Autodiff, NdArray, ndarray::NdArrayDevice};
use color_eyre::Result;
use htr_nn::{DataSource, Environment, HtrNetwork, pool_strides};
use log::info;

struct AppArgs {
    dataset_dir: String,
    output_dir: String,
    nb_features: usize,
}

impl AppArgs {
    fn from_env() -> Self {
        Self {
            dataset_dir: std::env::var("DATASET_DIR").unwrap_or_else(|_| "data/iam".into()),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".into()),
            nb_features: std::env::var("NB_FEATURES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1024),
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let args = AppArgs::from_env();
    let env = Environment::new(&args.dataset_dir, &args.output_dir);
    let source = DataSource::with_ascii_charset(args.nb_features, true);

    type Backend = Autodiff<NdArray>;
    let device = NdArrayDevice::default();

    let (pool_sizes, strides) = pool_strides(source.nb_features, 4);
    info!("feature width {} -> stride plan {:?}, pools {:?}", source.nb_features, strides, pool_sizes);

    let network = HtrNetwork::<Backend>::new(&env, &source, &device)?;

    info!(
        "network built: {} features, {} symbols + blank = {} classes",
        source.nb_features,
        source.vocab_size(),
        network.model.num_classes()
    );
    info!("checkpoint: {:?} (resumed: {})", network.checkpoint, network.resumed);
    info!("log dir: {:?}", network.log_dir);
    info!("partitions: {:?}", env.partitions);

    // Line features and labels come from the external data generator; once
    // its datasets are wired in, hand them to model::training::train.
    Ok(())
}
