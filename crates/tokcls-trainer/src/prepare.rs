//! Preparing every split of a corpus with one label vocabulary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokcls_core::{
    Dataset, DatasetConfig, LabelVocabulary, ProcessCoordinator, SubwordTokenizer,
    TokenClassificationDataset,
};
use tracing::info;

/// File name of the label vocabulary written next to the training text.
pub const LABEL_IDS_FILE: &str = "label_ids.csv";

/// Text and label file of one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFiles {
    pub text: PathBuf,
    pub labels: PathBuf,
}

impl SplitFiles {
    pub fn new(text: impl Into<PathBuf>, labels: impl Into<PathBuf>) -> Self {
        Self {
            text: text.into(),
            labels: labels.into(),
        }
    }
}

/// Every prepared split plus where the vocabulary was written.
#[derive(Debug)]
pub struct PreparedSplits {
    pub train: TokenClassificationDataset,
    pub eval: Vec<TokenClassificationDataset>,
    pub label_ids_file: PathBuf,
}

/// Build the training split, persist its label vocabulary, then build every
/// evaluation split against that vocabulary.
///
/// Pass `label_vocabulary` to pin the ids instead of deriving them from the
/// training labels.
pub fn prepare_splits<T, C>(
    train: &SplitFiles,
    eval: &[SplitFiles],
    tokenizer: &T,
    label_vocabulary: Option<&LabelVocabulary>,
    config: &DatasetConfig,
    coordinator: &C,
) -> Result<PreparedSplits>
where
    T: SubwordTokenizer + ?Sized,
    C: ProcessCoordinator + ?Sized,
{
    let train_set = TokenClassificationDataset::new(
        &train.text,
        &train.labels,
        tokenizer,
        label_vocabulary,
        config,
        coordinator,
    )
    .with_context(|| format!("failed to prepare {}", train.text.display()))?;
    info!(
        "{}: {} records of length {}",
        train.text.display(),
        train_set.len(),
        train_set.max_seq_length()
    );

    let vocabulary = train_set.label_vocabulary();
    let label_ids_file = label_ids_path(&train.text);
    if coordinator.is_primary() {
        vocabulary
            .save(&label_ids_file)
            .with_context(|| format!("failed to write {}", label_ids_file.display()))?;
        info!("{} labels written to {}", vocabulary.len(), label_ids_file.display());
    }

    let eval_sets = eval
        .iter()
        .map(|split| {
            let set = TokenClassificationDataset::new(
                &split.text,
                &split.labels,
                tokenizer,
                Some(vocabulary),
                config,
                coordinator,
            )
            .with_context(|| format!("failed to prepare {}", split.text.display()))?;
            info!(
                "{}: {} records of length {}",
                split.text.display(),
                set.len(),
                set.max_seq_length()
            );
            Ok(set)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PreparedSplits {
        train: train_set,
        eval: eval_sets,
        label_ids_file,
    })
}

fn label_ids_path(train_text: &Path) -> PathBuf {
    train_text
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(LABEL_IDS_FILE)
}
