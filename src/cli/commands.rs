use std::path::PathBuf;

use clap::{Args, Subcommand};
use mnist_mlp::{FitConfig, HIDDEN_DIM, Shuffle};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train on the MNIST IDX files and write the model as JSON
    Train(TrainArgs),

    /// Classify a 28x28 PNG with a trained model
    Predict(PredictArgs),

    /// Write one MNIST record as a PNG and print its label
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory holding the four uncompressed MNIST IDX files
    #[arg(long, default_value = "mnist")]
    pub data_dir: PathBuf,

    /// Where to write the trained parameters
    #[arg(long, default_value = "model.json")]
    pub out: PathBuf,

    /// Hidden layer width
    #[arg(long, default_value_t = HIDDEN_DIM)]
    pub hidden: usize,

    #[arg(long, default_value_t = 50)]
    pub epochs: usize,

    /// Samples per gradient step
    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 0.09)]
    pub lr: f64,

    /// Training accuracy is measured on this many leading samples
    #[arg(long, default_value_t = 10_000)]
    pub train_eval_subset: usize,

    /// Seed for initialization and shuffling; fresh entropy if omitted
    #[arg(long)]
    pub seed: Option<u64>,
}

impl TrainArgs {
    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            epochs: self.epochs,
            lr: self.lr,
            batch_size: self.batch_size,
            shuffle: match self.seed {
                Some(seed) => Shuffle::Seeded(seed),
                None => Shuffle::Rng,
            },
            train_eval_subset: self.train_eval_subset,
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Model written by `train`
    #[arg(long, default_value = "model.json")]
    pub model: PathBuf,

    /// 28x28 PNG to classify
    pub image: PathBuf,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(long, default_value = "mnist/t10k-images-idx3-ubyte")]
    pub images: PathBuf,

    #[arg(long, default_value = "mnist/t10k-labels-idx1-ubyte")]
    pub labels: PathBuf,

    /// Record to extract
    #[arg(long, default_value_t = 0)]
    pub index: usize,

    #[arg(long, default_value = "digit.png")]
    pub out: PathBuf,
}
