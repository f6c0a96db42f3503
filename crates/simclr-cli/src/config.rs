//! TOML config loading for the SimCLR CLI.
//!
//! Deserializes `configs/simclr.toml`, which has `[training]`, `[data]` and
//! `[model]` sections, then merges with CLI overrides.

use std::path::Path;

use serde::Deserialize;
use simclr::model::projection::ProjectionEncoderConfig;
use simclr::training::data::SyntheticDataConfig;
use simclr::SimClrConfig;

/// Top-level structure matching `configs/simclr.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct SimClrToml {
    #[serde(default)]
    pub training: TrainingOverrides,
    #[serde(default)]
    pub data: DataOverrides,
    #[serde(default)]
    pub model: ModelOverrides,
}

/// Optional overrides for `SimClrConfig` fields.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TrainingOverrides {
    pub batch_size: Option<usize>,
    pub n_views: Option<usize>,
    pub temperature: Option<f64>,
    pub device: Option<String>,
    pub train_epochs: Option<usize>,
    pub fp16_precision: Option<bool>,
    pub log_every_n_steps: Option<usize>,
    pub arch: Option<String>,
    pub warmup_epochs: Option<usize>,
    pub project: Option<String>,
    pub lr: Option<f64>,
    pub weight_decay: Option<f64>,
    pub seed: Option<u64>,
}

/// Optional overrides for the synthetic view loader.
#[derive(Debug, Default, Deserialize)]
pub struct DataOverrides {
    pub num_images: Option<usize>,
    /// Image shape as `[channels, height, width]`.
    pub shape: Option<[usize; 3]>,
    pub noise: Option<f32>,
}

/// Optional overrides for the projection encoder.
#[derive(Debug, Default, Deserialize)]
pub struct ModelOverrides {
    pub d_hidden: Option<usize>,
    pub d_out: Option<usize>,
}

/// Load and deserialize a `SimClrToml` from a TOML file.
pub fn load_simclr_toml(path: &Path) -> anyhow::Result<SimClrToml> {
    let contents = std::fs::read_to_string(path)?;
    let config: SimClrToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded SimCLR config");
    Ok(config)
}

/// Merge two override sets; `high` wins where both are set.
pub fn merge_overrides(low: &TrainingOverrides, high: &TrainingOverrides) -> TrainingOverrides {
    TrainingOverrides {
        batch_size: high.batch_size.or(low.batch_size),
        n_views: high.n_views.or(low.n_views),
        temperature: high.temperature.or(low.temperature),
        device: high.device.clone().or_else(|| low.device.clone()),
        train_epochs: high.train_epochs.or(low.train_epochs),
        fp16_precision: high.fp16_precision.or(low.fp16_precision),
        log_every_n_steps: high.log_every_n_steps.or(low.log_every_n_steps),
        arch: high.arch.clone().or_else(|| low.arch.clone()),
        warmup_epochs: high.warmup_epochs.or(low.warmup_epochs),
        project: high.project.clone().or_else(|| low.project.clone()),
        lr: high.lr.or(low.lr),
        weight_decay: high.weight_decay.or(low.weight_decay),
        seed: high.seed.or(low.seed),
    }
}

/// Build a `SimClrConfig` from defaults, TOML values, and CLI flags.
///
/// Priority chain: `SimClrConfig::new()` defaults < TOML < CLI.
pub fn build_simclr_config(toml: &TrainingOverrides, cli: &TrainingOverrides) -> SimClrConfig {
    let o = merge_overrides(toml, cli);
    let mut config = SimClrConfig::new();

    if let Some(v) = o.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = o.n_views {
        config.n_views = v;
    }
    if let Some(v) = o.temperature {
        config.temperature = v;
    }
    if let Some(v) = o.device {
        config.device = v;
    }
    if let Some(v) = o.train_epochs {
        config.train_epochs = v;
    }
    if let Some(v) = o.fp16_precision {
        config.fp16_precision = v;
    }
    if let Some(v) = o.log_every_n_steps {
        config.log_every_n_steps = v;
    }
    if let Some(v) = o.arch {
        config.arch = v;
    }
    if let Some(v) = o.warmup_epochs {
        config.warmup_epochs = v;
    }
    if let Some(v) = o.project {
        config.project = v;
    }
    if let Some(v) = o.lr {
        config.lr = v;
    }
    if let Some(v) = o.weight_decay {
        config.weight_decay = v;
    }
    if let Some(v) = o.seed {
        config.seed = v;
    }

    config
}

/// Synthetic loader config. Batch size, view count, and seed follow the run config
/// so the loader always serves what the loss expects.
///
/// Fails when the merged shape or noise cannot be sampled from.
pub fn build_data_config(
    overrides: &DataOverrides,
    run: &SimClrConfig,
    num_images_cli: Option<usize>,
) -> anyhow::Result<SyntheticDataConfig> {
    let mut config = SyntheticDataConfig::new()
        .with_batch_size(run.batch_size)
        .with_n_views(run.n_views)
        .with_seed(run.seed);

    if let Some(n) = overrides.num_images {
        config.num_images = n;
    }
    if let Some(shape) = overrides.shape {
        config.shape = shape;
    }
    if let Some(noise) = overrides.noise {
        config.noise = noise;
    }

    // CLI override takes highest priority
    if let Some(n) = num_images_cli {
        config.num_images = n;
    }

    config.validate()?;
    Ok(config)
}

/// Projection encoder sized for the loader's flattened images.
pub fn build_encoder_config(overrides: &ModelOverrides, data: &SyntheticDataConfig) -> ProjectionEncoderConfig {
    let d_input = data.shape.iter().product();
    let mut config = ProjectionEncoderConfig::new(d_input);
    if let Some(d) = overrides.d_hidden {
        config.d_hidden = d;
    }
    if let Some(d) = overrides.d_out {
        config.d_out = d;
    }
    config
}
