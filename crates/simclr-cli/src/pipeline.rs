//! SimCLR training pipeline and checkpoint inspection.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::config::Config;
use burn::optim::AdamWConfig;
use burn::tensor::backend::AutodiffBackend;

use simclr::model::projection::{ProjectionEncoder, ProjectionEncoderConfig};
use simclr::tracking::http::HttpTracker;
use simclr::tracking::jsonl::JsonlTracker;
use simclr::tracking::Tracker;
use simclr::training::checkpoint::load_meta;
use simclr::training::data::{SyntheticDataConfig, SyntheticViewLoader, ViewLoader};
use simclr::training::loss::cross_entropy;
use simclr::training::schedule::CosineAnnealing;
use simclr::{train, RunContext, SimClrConfig, TrainOutcome};

use crate::config::{
    build_data_config, build_encoder_config, build_simclr_config, load_simclr_toml, SimClrToml, TrainingOverrides,
};

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Optional path to the TOML config file.
    pub config: Option<PathBuf>,
    /// Run directory for config.json, tracker.jsonl, and checkpoints.
    pub output_dir: PathBuf,
    /// Tracker server URL. Without one, events go to `tracker.jsonl`.
    pub tracker_url: Option<String>,
    /// Override the number of synthetic images.
    pub num_images: Option<usize>,
    /// CLI overrides for the run config.
    pub overrides: TrainingOverrides,
}

/// Arguments for the `inspect` subcommand.
#[derive(Debug)]
pub struct InspectArgs {
    /// Checkpoint directory (`checkpoint_NNNN`).
    pub checkpoint: PathBuf,
}

type CpuBackend = Autodiff<NdArray<f32>>;

/// Run SimCLR pre-training with the projection encoder on synthetic views.
pub async fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = match &args.config {
        Some(path) => load_simclr_toml(path)?,
        None => SimClrToml::default(),
    };
    let config = build_simclr_config(&toml.training, &args.overrides);
    config.validate()?;

    let data_config = build_data_config(&toml.data, &config, args.num_images)?;
    let encoder_config = build_encoder_config(&toml.model, &data_config);

    // 2. Pick the backend
    let outcome = match config.device.as_str() {
        "cpu" => {
            train_on::<CpuBackend>(
                &config,
                data_config,
                &encoder_config,
                &args.output_dir,
                args.tracker_url.as_deref(),
                Default::default(),
            )
            .await?
        }
        other => anyhow::bail!("Unsupported device '{other}': only \"cpu\" (NdArray) is available"),
    };

    // 3. Print summary
    let elapsed = start.elapsed();
    println!("\n--- SimCLR Training Summary ---");
    println!("Epochs: {}", outcome.epochs.len());
    println!("Steps: {}", outcome.global_step);
    if let Some(last) = outcome.epochs.last() {
        println!("Final mean loss: {:.4}", last.mean_loss);
        println!("Final top-1 acc: {:.2}%", last.mean_top1);
        println!("Final top-5 acc: {:.2}%", last.mean_top5);
    }
    let skipped: usize = outcome.epochs.iter().map(|e| e.skipped_steps).sum();
    if skipped > 0 {
        println!("Skipped steps (overflow): {skipped}");
    }
    println!("Checkpoint: {}", outcome.checkpoint.display());
    println!("Elapsed: {:.1}s", elapsed.as_secs_f64());

    Ok(())
}

async fn train_on<B: AutodiffBackend>(
    config: &SimClrConfig,
    data_config: SyntheticDataConfig,
    encoder_config: &ProjectionEncoderConfig,
    run_dir: &Path,
    tracker_url: Option<&str>,
    device: B::Device,
) -> anyhow::Result<TrainOutcome<ProjectionEncoder<B>>> {
    B::seed(config.seed);

    let model = encoder_config.init::<B>(&device);
    tracing::info!(
        d_input = encoder_config.d_input,
        d_hidden = encoder_config.d_hidden,
        d_out = encoder_config.d_out,
        arch = %config.arch,
        "Initialized projection encoder"
    );

    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(config.weight_decay as f32)
        .init();
    let mut scheduler = CosineAnnealing::new(
        config.lr,
        config.train_epochs.saturating_sub(config.warmup_epochs).max(1),
        0.0,
    );

    let mut loader = SyntheticViewLoader::<B>::new(data_config, &device);
    if loader.is_empty() {
        anyhow::bail!(
            "Loader has no full batches: {} images with batch size {}",
            loader.config().num_images,
            config.batch_size
        );
    }

    let tracker: Box<dyn Tracker> = match tracker_url {
        Some(url) => Box::new(HttpTracker::new(url)?),
        None => Box::new(JsonlTracker::new(run_dir.join("tracker.jsonl"))),
    };
    let mut ctx = RunContext::start(run_dir, config, tracker).await?;

    let result = train(
        config,
        model,
        &mut optimizer,
        &mut scheduler,
        &mut loader,
        &cross_entropy::<B>,
        &mut ctx,
    )
    .await;
    ctx.finish().await;

    Ok(result?)
}

/// Print the metadata of a saved checkpoint and the run config next to it.
pub fn run_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let meta = load_meta(&args.checkpoint)?;

    println!("--- Checkpoint ---");
    println!("Path: {}", args.checkpoint.display());
    println!("Epoch: {}", meta.epoch);
    println!("Arch: {}", meta.arch);
    println!("Global step: {}", meta.global_step);

    let config_path = args
        .checkpoint
        .parent()
        .map(|dir| dir.join("config.json"))
        .filter(|p| p.exists());
    if let Some(path) = config_path {
        let config = SimClrConfig::load(&path)?;
        println!("Batch size: {}", config.batch_size);
        println!("Views: {}", config.n_views);
        println!("Temperature: {}", config.temperature);
        println!("FP16: {}", config.fp16_precision);
    }

    Ok(())
}
