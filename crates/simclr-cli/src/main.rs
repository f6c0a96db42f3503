mod config;
mod pipeline;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use config::TrainingOverrides;
use pipeline::{InspectArgs, TrainArgs};

/// simclr: contrastive self-supervised pre-training on burn.
#[derive(Parser)]
#[command(name = "simclr", version, about)]
struct Cli {
    /// Append-only debug log file.
    #[arg(long, global = true, default_value = "training.log")]
    log_file: PathBuf,
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training and checkpoint inspection.
#[derive(Subcommand)]
enum Command {
    /// Train a projection encoder with InfoNCE on synthetic multi-view data.
    Train {
        /// Path to a SimCLR config TOML file (e.g., configs/simclr.toml).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run directory for config.json, tracker events, and checkpoints.
        #[arg(long, default_value = "runs/simclr")]
        output_dir: PathBuf,
        /// URL of the experiment tracking server. Events go to tracker.jsonl without one.
        #[arg(long)]
        tracker_url: Option<String>,
        /// Override the number of training epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the number of images per batch.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override the number of views per image.
        #[arg(long)]
        n_views: Option<usize>,
        /// Override the InfoNCE temperature.
        #[arg(long)]
        temperature: Option<f64>,
        /// Override the base learning rate.
        #[arg(long)]
        lr: Option<f64>,
        /// Train with dynamic loss scaling.
        #[arg(long)]
        fp16: bool,
        /// Override the compute device ("cpu").
        #[arg(long)]
        device: Option<String>,
        /// Override how often (in steps) metrics are sent to the tracker.
        #[arg(long)]
        log_every_n_steps: Option<usize>,
        /// Override the number of synthetic images per epoch.
        #[arg(long)]
        num_images: Option<usize>,
        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print metadata of a saved checkpoint.
    Inspect {
        /// Path to a checkpoint_NNNN directory.
        #[arg(long)]
        checkpoint: PathBuf,
    },
}

/// Console output follows `RUST_LOG` (default `info`); the log file gets DEBUG and above.
fn init_logging(log_file: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    let console = fmt::layer()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_file)?;

    match cli.command {
        Command::Train {
            config,
            output_dir,
            tracker_url,
            epochs,
            batch_size,
            n_views,
            temperature,
            lr,
            fp16,
            device,
            log_every_n_steps,
            num_images,
            seed,
        } => {
            let overrides = TrainingOverrides {
                batch_size,
                n_views,
                temperature,
                device,
                train_epochs: epochs,
                // absent flag leaves the TOML value alone
                fp16_precision: fp16.then_some(true),
                log_every_n_steps,
                lr,
                seed,
                ..Default::default()
            };
            pipeline::run_train(TrainArgs {
                config,
                output_dir,
                tracker_url,
                num_images,
                overrides,
            })
            .await
        }
        Command::Inspect { checkpoint } => pipeline::run_inspect(InspectArgs { checkpoint }),
    }
}
