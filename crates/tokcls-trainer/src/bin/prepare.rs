//! Encode and cache every split of a token-classification corpus.
//!
//! Under a distributed launcher every rank runs this binary; rank 0 writes
//! the caches and the others wait for it at a file barrier.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokcls_core::{
    DatasetConfig, FileBarrierCoordinator, HfSubwordTokenizer, LabelVocabulary,
    ProcessCoordinator, SingleProcess, DEFAULT_PAD_LABEL,
};
use tokcls_trainer::{prepare_splits, SplitFiles};
use tracing::info;

/// CLI arguments
#[derive(Parser)]
#[command(name = "prepare")]
#[command(about = "Encode token-classification splits into cached features")]
#[command(version)]
struct Cli {
    /// Training sentences, one per line
    #[arg(long)]
    train_text: PathBuf,

    /// Training labels, one per word
    #[arg(long)]
    train_labels: PathBuf,

    /// Evaluation sentences (repeatable, paired with --eval-labels)
    #[arg(long)]
    eval_text: Vec<PathBuf>,

    /// Evaluation labels (repeatable, paired with --eval-text)
    #[arg(long)]
    eval_labels: Vec<PathBuf>,

    /// Hugging Face tokenizer.json
    #[arg(short, long, env = "TOKCLS_TOKENIZER")]
    tokenizer: PathBuf,

    /// Existing label vocabulary (one label per line) instead of deriving it
    #[arg(long)]
    label_ids: Option<PathBuf>,

    /// Upper bound on record length, markers included
    #[arg(short, long, default_value_t = 128)]
    max_seq_length: usize,

    /// Keep only the first N lines of each split (-1 keeps all)
    #[arg(short, long, default_value_t = -1, allow_hyphen_values = true)]
    num_samples: i64,

    /// Label of non-entity words
    #[arg(long, default_value = DEFAULT_PAD_LABEL)]
    pad_label: String,

    /// Exclude continuation subtokens from the loss
    #[arg(long)]
    ignore_extra_tokens: bool,

    /// Exclude sentence markers from the loss
    #[arg(long)]
    ignore_start_end: bool,

    /// Re-encode even when a cache entry exists
    #[arg(long)]
    overwrite_cache: bool,

    /// Directory shared by every rank for the barrier markers, unique per run
    #[arg(long, env = "TOKCLS_RENDEZVOUS_DIR")]
    rendezvous_dir: Option<PathBuf>,
}

fn coordinator(cli: &Cli) -> Result<Box<dyn ProcessCoordinator>> {
    let launched = std::env::var_os("RANK").is_some() && std::env::var_os("WORLD_SIZE").is_some();
    if !launched {
        return Ok(Box::new(SingleProcess));
    }

    let dir = match (&cli.rendezvous_dir, FileBarrierCoordinator::run_id()) {
        (Some(dir), _) => dir.clone(),
        (None, Some(run_id)) => cli
            .train_text
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(".tokcls-rendezvous")
            .join(run_id),
        (None, None) => bail!(
            "RANK/WORLD_SIZE are set but no job id was found; pass --rendezvous-dir with a directory unique to this run"
        ),
    };
    let Some(c) = FileBarrierCoordinator::from_env(&dir)? else {
        return Ok(Box::new(SingleProcess));
    };
    info!(
        "rank {} of {}, rendezvous at {}",
        c.rank(),
        c.world_size(),
        dir.display()
    );
    Ok(Box::new(c))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if cli.eval_text.len() != cli.eval_labels.len() {
        bail!(
            "{} --eval-text but {} --eval-labels",
            cli.eval_text.len(),
            cli.eval_labels.len()
        );
    }

    let tokenizer = HfSubwordTokenizer::from_file(&cli.tokenizer)
        .with_context(|| format!("failed to load {}", cli.tokenizer.display()))?;
    let label_vocabulary = cli
        .label_ids
        .as_ref()
        .map(LabelVocabulary::load)
        .transpose()
        .context("failed to load label vocabulary")?;

    let config = DatasetConfig::new(cli.max_seq_length)
        .with_num_samples(cli.num_samples)
        .with_pad_label(cli.pad_label.clone())
        .with_ignore_extra_tokens(cli.ignore_extra_tokens)
        .with_ignore_start_end(cli.ignore_start_end)
        .with_overwrite_cache(cli.overwrite_cache);

    let train = SplitFiles::new(&cli.train_text, &cli.train_labels);
    let eval: Vec<SplitFiles> = cli
        .eval_text
        .iter()
        .zip(&cli.eval_labels)
        .map(|(text, labels)| SplitFiles::new(text, labels))
        .collect();

    let coordinator = coordinator(&cli)?;
    let splits = prepare_splits(
        &train,
        &eval,
        &tokenizer,
        label_vocabulary.as_ref(),
        &config,
        coordinator.as_ref(),
    )?;

    info!(
        "prepared training split and {} evaluation split(s), label ids in {}",
        splits.eval.len(),
        splits.label_ids_file.display()
    );
    Ok(())
}
