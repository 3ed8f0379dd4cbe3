use std::path::{Path, PathBuf};

/// Experiment paths derived once from the dataset and output roots.
///
/// Every field is a pure function of the two roots; nothing here touches the
/// filesystem or creates directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub source: PathBuf,
    pub source_backup: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
    pub data: PathBuf,
    pub ground_truth: PathBuf,
    pub preproc: PathBuf,
    pub partitions: PathBuf,
    pub train_file: PathBuf,
    pub validation_file: PathBuf,
    pub test_file: PathBuf,
}

impl Environment {
    pub fn new(dataset_dir: impl Into<PathBuf>, output_dir: impl AsRef<Path>) -> Self {
        let source: PathBuf = dataset_dir.into();
        let source_backup = PathBuf::from(format!("{}_backup", source.display()));

        // The dataset root is nested under the output root, so an absolute
        // source is joined as if relative.
        let nested = source.strip_prefix("/").unwrap_or(&source);
        let output = output_dir.as_ref().join(nested);

        let log = output.join("log");
        let data = source.join("lines");
        let ground_truth = source.join("ground_truth");
        let preproc = source.join("lines_preproc");
        let partitions = source.join("partitions");

        let train_file = partitions.join("train.txt");
        let validation_file = partitions.join("validation.txt");
        let test_file = partitions.join("test.txt");

        Environment {
            source,
            source_backup,
            output,
            log,
            data,
            ground_truth,
            preproc,
            partitions,
            train_file,
            validation_file,
            test_file,
        }
    }

    /// Checkpoint path stem; the recorder appends its own extension.
    pub fn checkpoint(&self) -> PathBuf {
        self.output.join("checkpoint_weights")
    }

    /// The on-disk checkpoint file as written by the compact recorder.
    pub fn checkpoint_file(&self) -> PathBuf {
        self.output.join("checkpoint_weights.mpk")
    }
}
