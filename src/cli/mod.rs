pub mod commands;

use std::path::Path;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use commands::{Commands, ExtractArgs, PredictArgs, TrainArgs};
use mnist_mlp::idx::{self, Split};
use mnist_mlp::{INPUT_DIM, Mlp, OUTPUT_DIM, pixels};

#[derive(Parser, Debug)]
#[command(
    name = "mnist-mlp",
    version,
    about = "Train a one-hidden-layer MLP on MNIST and classify handwritten digits."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Extract(args) => run_extract(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let cfg = args.fit_config();
    cfg.validate()?;

    info!(dir = %args.data_dir.display(), "loading training data");
    let train = idx::load_mnist_split(&args.data_dir, Split::Train)
        .context("failed to load training data")?;
    info!(dir = %args.data_dir.display(), "loading test data");
    let test = idx::load_mnist_split(&args.data_dir, Split::Test)
        .context("failed to load test data")?;

    ensure!(
        train.input_dim() == INPUT_DIM && test.input_dim() == INPUT_DIM,
        "expected {INPUT_DIM}-pixel images, got {} (train) and {} (test)",
        train.input_dim(),
        test.input_dim()
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut mlp = Mlp::new_with_rng(INPUT_DIM, args.hidden, OUTPUT_DIM, &mut rng)?;

    info!(
        input = INPUT_DIM,
        hidden = args.hidden,
        output = OUTPUT_DIM,
        lr = cfg.lr,
        epochs = cfg.epochs,
        batch_size = cfg.batch_size,
        "training mlp"
    );
    let report = mlp.fit(&train, Some(&test), &cfg)?;

    mlp.save_json(&args.out)
        .with_context(|| format!("failed to save model to {}", args.out.display()))?;

    if let Some(last) = report.last() {
        println!(
            "trained {} epochs: loss {:.4}, train acc {:.2}%, test acc {:.2}%",
            last.epoch,
            last.mean_loss,
            last.train_accuracy * 100.0,
            last.test_accuracy.unwrap_or_default() * 100.0
        );
    }
    println!("model saved to {}", args.out.display());
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let digit = classify(&args.model, &args.image)?;
    println!("predicted digit: {digit}");
    Ok(())
}

fn classify(model: &Path, image: &Path) -> Result<usize> {
    let mlp = Mlp::load_json(model)
        .with_context(|| format!("failed to load model {}", model.display()))?;
    ensure!(
        mlp.input_dim() == INPUT_DIM && mlp.output_dim() == OUTPUT_DIM,
        "{} is a {}-input {}-class model, expected {INPUT_DIM} inputs and {OUTPUT_DIM} classes",
        model.display(),
        mlp.input_dim(),
        mlp.output_dim()
    );
    info!(path = %model.display(), "model loaded");

    let input = pixels::load_grayscale(image)
        .with_context(|| format!("failed to read {}", image.display()))?;

    Ok(mlp.predict(&input)?)
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let label = extract(&args)?;
    println!(
        "image {} saved to {} (label {label})",
        args.index,
        args.out.display()
    );
    Ok(())
}

fn extract(args: &ExtractArgs) -> Result<u8> {
    let raw = idx::read_raw_image(&args.images, args.index).with_context(|| {
        format!(
            "failed to read image {} from {}",
            args.index,
            args.images.display()
        )
    })?;
    let label = idx::read_label(&args.labels, args.index).with_context(|| {
        format!(
            "failed to read label {} from {}",
            args.index,
            args.labels.display()
        )
    })?;

    pixels::save_grayscale(&args.out, &raw.pixels)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    Ok(label)
}
