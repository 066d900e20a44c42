//! ScaleFormer command-line tool
//!
//! Builds a ScaleFormer model from a JSON run configuration, prints its stage
//! schedule, runs it on a synthetic input and saves or loads parameter records.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{module::Module, tensor::Tensor};
use clap::{Parser, Subcommand};
use scaleformer_demos::{
    create_device, init_logging, ModelSummary, RunConfig, SelectedBackend, BACKEND_NAME,
};

#[derive(Parser)]
#[command(name = "scaleformer")]
#[command(about = "Build, inspect and run ScaleFormer segmentation models")]
struct Args {
    /// JSON run configuration; defaults to the reference model.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the stage schedule without building the model
    Info {
        /// Input height and width; defaults to the configured image size.
        #[arg(long)]
        image_size: Option<usize>,
    },
    /// Run one forward pass on a zero image and report the output shapes
    Forward {
        /// Parameter record to load instead of a fresh initialization.
        #[arg(long)]
        weights: Option<PathBuf>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        image_size: Option<usize>,
    },
    /// Initialize a model and save its parameters and run configuration
    Init {
        /// Record path (the recorder adds the `.mpk` extension).
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let run = RunConfig::load_or_default(args.config.as_deref())?;
    run.model.validate().context("Invalid model configuration")?;

    match args.command {
        Commands::Info { image_size } => {
            let image_size = image_size.unwrap_or(run.image_size);
            print!("{}", ModelSummary::new(&run.model, image_size));
        }
        Commands::Forward {
            weights,
            batch_size,
            image_size,
        } => forward(
            &run,
            weights,
            batch_size.unwrap_or(run.batch_size),
            image_size.unwrap_or(run.image_size),
        )?,
        Commands::Init { output } => init(&run, output)?,
    }

    Ok(())
}

fn forward(
    run: &RunConfig,
    weights: Option<PathBuf>,
    batch_size: usize,
    image_size: usize,
) -> Result<()> {
    let device = create_device();
    tracing::info!(backend = BACKEND_NAME, "building model");

    let builder = run.model_config();
    let model = match weights {
        Some(path) => builder
            .init_from_record::<SelectedBackend>(path, &device)
            .context("Failed to load model weights")?,
        None => builder
            .init::<SelectedBackend>(&device)
            .context("Failed to initialize model")?,
    };
    tracing::info!(num_params = model.num_params(), "model ready");

    let input = Tensor::<SelectedBackend, 4>::zeros(
        [batch_size, run.model.in_chans, image_size, image_size],
        &device,
    );
    let output = model.forward(input).context("Forward pass failed")?;

    let names = ["logits", "aux1", "aux2", "aux3"];
    for (name, map) in names.iter().zip(output.into_array()) {
        println!("{name:>6}: {:?}", map.dims());
    }

    Ok(())
}

fn init(run: &RunConfig, output: PathBuf) -> Result<()> {
    let device = create_device();
    let model = run
        .model_config()
        .init::<SelectedBackend>(&device)
        .context("Failed to initialize model")?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    model.save(&output).context("Failed to save model weights")?;

    let config_path = output.with_extension("json");
    run.save(&config_path)?;

    println!(
        "Saved {} parameters to {} (config: {})",
        model.num_params(),
        output.with_extension("mpk").display(),
        config_path.display()
    );
    Ok(())
}
