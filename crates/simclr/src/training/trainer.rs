//! SimCLR training driver.
//!
//! Ties together the view loader, encoder, InfoNCE pairing, criterion,
//! precision strategy, scheduler, tracker, and checkpointing. One thread
//! issues every forward, backward, and optimizer step in sequence; the only
//! awaits are tracker calls between steps.

use std::path::PathBuf;
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::SimClrConfig;
use crate::error::TrainError;
use crate::model::ContrastiveEncoder;
use crate::run::RunContext;
use crate::tracking::MetricRecord;
use crate::training::checkpoint::{save_checkpoint, CheckpointMeta};
use crate::training::data::{ViewBatch, ViewLoader};
use crate::training::loss::{info_nce_logits, PairLayout};
use crate::training::metrics::{accuracy, EpochSummary, RunningAvg, StepOutput};
use crate::training::scaler::PrecisionStrategy;
use crate::training::schedule::{should_advance, EpochScheduler};
use crate::training::watch::param_norm;

/// Everything a finished run hands back to the caller.
#[derive(Debug)]
pub struct TrainOutcome<M> {
    pub model: M,
    /// Local checkpoint directory.
    pub checkpoint: PathBuf,
    pub global_step: u64,
    /// One entry per epoch that saw at least one batch.
    pub epochs: Vec<EpochSummary>,
}

/// One optimizer step on a multi-view batch.
///
/// Flattens the views, embeds them, builds InfoNCE logits, applies the
/// criterion, and runs backward + optimizer step through `precision`.
/// Loss and accuracy come back in the returned [`StepOutput`].
#[allow(clippy::too_many_arguments)]
pub fn train_step<B, M, O, C>(
    model: M,
    batch: ViewBatch<B>,
    layout: &PairLayout,
    temperature: f64,
    criterion: &C,
    precision: &mut PrecisionStrategy,
    optimizer: &mut O,
    lr: f64,
) -> Result<(M, StepOutput), TrainError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ContrastiveEncoder<B>,
    O: Optimizer<M, B>,
    C: Fn(Tensor<B, 2>, Tensor<B, 1, Int>) -> Tensor<B, 1>,
{
    let images = batch.flatten(layout.n_views())?;
    let features = model.embed(images);
    let (logits, labels) = info_nce_logits(features, layout, temperature)?;

    let loss = criterion(logits.clone(), labels);
    let loss_val: f64 = loss.clone().into_scalar().elem();
    let acc = accuracy(logits, &[1, 5]);

    let (model, update) = precision.apply(loss, model, optimizer, lr);
    Ok((
        model,
        StepOutput {
            loss: loss_val,
            top1: acc[0],
            top5: acc[1],
            applied: update.applied,
            grad_norm: update.grad_norm,
        },
    ))
}

fn progress_bar(len: usize, epoch: usize, total: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(format!("epoch {}/{total}", epoch + 1));
    pb
}

/// Run contrastive pre-training for `config.train_epochs` epochs.
///
/// The scheduler advances once per epoch after `config.warmup_epochs`; every
/// `config.log_every_n_steps` steps a [`MetricRecord`] goes to the tracker.
/// When all epochs are done the model and optimizer are written to
/// `checkpoint_{epochs:04}` in the run directory and mirrored to the tracker.
///
/// # Arguments
/// - `config`: validated before the first step
/// - `model`: consumed and returned trained in [`TrainOutcome`]
/// - `optimizer`, `scheduler`, `loader`: collaborators, mutated in place
/// - `criterion`: loss over `(logits, labels)`, usually
///   [`crate::training::loss::cross_entropy`]
/// - `ctx`: run directory and tracker
#[allow(clippy::too_many_arguments)]
pub async fn train<B, M, O, S, L, C>(
    config: &SimClrConfig,
    mut model: M,
    optimizer: &mut O,
    scheduler: &mut S,
    loader: &mut L,
    criterion: &C,
    ctx: &mut RunContext,
) -> Result<TrainOutcome<M>, TrainError>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ContrastiveEncoder<B>,
    O: Optimizer<M, B>,
    S: EpochScheduler,
    L: ViewLoader<B>,
    C: Fn(Tensor<B, 2>, Tensor<B, 1, Int>) -> Tensor<B, 1>,
{
    config.validate()?;
    let layout = PairLayout::new(config.batch_size, config.n_views)?;
    let mut precision = PrecisionStrategy::from_flag(config.fp16_precision);

    tracing::info!(
        epochs = config.train_epochs,
        batches_per_epoch = loader.len(),
        batch_size = config.batch_size,
        n_views = config.n_views,
        device = %config.device,
        fp16 = config.fp16_precision,
        "Start SimCLR training"
    );

    let train_start = Instant::now();
    let mut global_step: u64 = 0;
    let mut epochs = Vec::with_capacity(config.train_epochs);

    for epoch in 0..config.train_epochs {
        let pb = progress_bar(loader.len(), epoch, config.train_epochs);
        let mut running = RunningAvg::new();

        for batch in loader.epoch() {
            let lr = scheduler.lr();
            let (next, step) = train_step(
                model,
                batch,
                &layout,
                config.temperature,
                criterion,
                &mut precision,
                optimizer,
                lr,
            )?;
            model = next;
            running.update(&step);

            if global_step % config.log_every_n_steps as u64 == 0 {
                let record = MetricRecord {
                    loss: step.loss,
                    top1: step.top1,
                    top5: step.top5,
                    learning_rate: lr,
                    grad_norm: step.grad_norm,
                    param_norm: param_norm(&model),
                    global_step,
                };
                ctx.log_metrics(&record).await;
                pb.set_message(format!(
                    "epoch {}/{} loss={:.4} top1={:.1}",
                    epoch + 1,
                    config.train_epochs,
                    step.loss,
                    step.top1
                ));
            }

            global_step += 1;
            pb.inc(1);
        }
        pb.finish_and_clear();

        if should_advance(epoch, config.warmup_epochs) {
            scheduler.step();
        }

        match running.summary(epoch) {
            Some(summary) => {
                tracing::debug!(
                    epoch,
                    steps = summary.steps,
                    skipped = summary.skipped_steps,
                    mean_loss = format!("{:.4}", summary.mean_loss),
                    mean_top1 = format!("{:.2}", summary.mean_top1),
                    last_loss = format!("{:.4}", summary.last.loss),
                    lr = format!("{:.2e}", scheduler.lr()),
                    "Epoch finished"
                );
                if summary.skipped_steps > 0 {
                    tracing::warn!(
                        epoch,
                        skipped = summary.skipped_steps,
                        scale = precision.scale(),
                        "Steps skipped due to gradient overflow"
                    );
                }
                epochs.push(summary);
            }
            None => tracing::warn!(epoch, "Loader produced no batches this epoch"),
        }
    }

    tracing::info!(
        global_step,
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training has finished"
    );

    let meta = CheckpointMeta {
        epoch: config.train_epochs,
        arch: config.arch.clone(),
        global_step,
    };
    let checkpoint = save_checkpoint(ctx.run_dir(), &meta, &model, optimizer)?;
    tracing::info!(path = %checkpoint.display(), "Model checkpoint and metadata saved");
    ctx.mirror_artifact(&checkpoint).await;

    Ok(TrainOutcome {
        model,
        checkpoint,
        global_step,
        epochs,
    })
}
