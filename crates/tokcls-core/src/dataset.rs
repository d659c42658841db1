//! # Token Classification Datasets
//!
//! [`TokenClassificationDataset`] reads a text file (one sentence per line)
//! and a parallel label file (one label per word), encodes them through the
//! feature cache and serves fixed-length records.
//! [`TokenClassificationInferDataset`] encodes raw queries for inference and
//! never touches the cache.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::cache::{CacheHeader, FeatureCache};
use crate::config::{DatasetConfig, EncoderConfig};
use crate::coordinator::ProcessCoordinator;
use crate::error::{Result, TokClsError};
use crate::features::{EncodedFeatures, FeatureEncoder};
use crate::labels::LabelVocabulary;
use crate::tokenizer::SubwordTokenizer;
use crate::types::{ElementType, NeuralType, OutputTypes};

/// Indexable, length-bounded collection of records.
pub trait Dataset {
    type Item;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at `index`, or `None` past the end.
    fn get(&self, index: usize) -> Option<Self::Item>;

    /// Names and types of the record fields, in record order.
    fn output_types(&self) -> OutputTypes;
}

const CHANNEL: NeuralType = NeuralType::batch_time(ElementType::Channel);
const MASK: NeuralType = NeuralType::batch_time(ElementType::Mask);
const LABELS: NeuralType = NeuralType::batch_time(ElementType::Labels);

const TRAIN_OUTPUT_TYPES: OutputTypes = &[
    ("input_ids", CHANNEL),
    ("segment_ids", CHANNEL),
    ("input_mask", CHANNEL),
    ("loss_mask", MASK),
    ("subtokens_mask", MASK),
    ("labels", LABELS),
];

const INFER_OUTPUT_TYPES: OutputTypes = &[
    ("input_ids", CHANNEL),
    ("segment_ids", CHANNEL),
    ("input_mask", CHANNEL),
    ("loss_mask", MASK),
    ("subtokens_mask", MASK),
];

/// One labeled record. Every field has the dataset's record length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClassificationItem {
    pub input_ids: Vec<u32>,
    pub segment_ids: Vec<u8>,
    pub input_mask: Vec<i64>,
    pub loss_mask: Vec<u8>,
    pub subtokens_mask: Vec<u8>,
    pub labels: Vec<u32>,
}

/// One unlabeled record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClassificationInferItem {
    pub input_ids: Vec<u32>,
    pub segment_ids: Vec<u8>,
    pub input_mask: Vec<i64>,
    pub loss_mask: Vec<u8>,
    pub subtokens_mask: Vec<u8>,
}

/// Labeled dataset for training and evaluation.
#[derive(Debug, Clone)]
pub struct TokenClassificationDataset {
    features: EncodedFeatures,
    labels: Vec<Vec<u32>>,
    vocabulary: LabelVocabulary,
}

impl TokenClassificationDataset {
    /// Build (or restore from cache) the dataset for `text_file`/`label_file`.
    ///
    /// `label_vocabulary` must be given for splits that depend on a training
    /// split; when `None` it is derived from `label_file`.
    pub fn new<T, C>(
        text_file: &Path,
        label_file: &Path,
        tokenizer: &T,
        label_vocabulary: Option<&LabelVocabulary>,
        config: &DatasetConfig,
        coordinator: &C,
    ) -> Result<Self>
    where
        T: SubwordTokenizer + ?Sized,
        C: ProcessCoordinator + ?Sized,
    {
        if text_file.extension().and_then(|e| e.to_str()) != Some("txt") {
            return Err(TokClsError::InvalidExtension {
                path: text_file.to_path_buf(),
            });
        }
        config.validate()?;
        if let Some(vocab) = label_vocabulary {
            check_pad_label(vocab, &config.encoder.pad_label)?;
        }

        let cache = FeatureCache::for_text_file(text_file, tokenizer, config.encoder.max_seq_length)?;
        let (features, header) = cache.get_or_build(coordinator, config.overwrite_cache, |key| {
            let (features, vocabulary) =
                encode_files(text_file, label_file, tokenizer, label_vocabulary, config)?;
            let header = CacheHeader {
                fingerprint: key.fingerprint(),
                max_seq_length: features.max_seq_length,
                truncated: features.truncated,
                labels: Some(vocabulary),
                encoder: config.encoder.clone(),
                num_samples: config.num_samples,
            };
            Ok((features, header))
        })?;

        if header.encoder != config.encoder || header.num_samples != config.num_samples {
            warn!(
                "{} was encoded with {:?} (num_samples {}), current settings are {:?} (num_samples {}); set overwrite_cache to re-encode",
                cache.path().display(),
                header.encoder,
                header.num_samples,
                config.encoder,
                config.num_samples
            );
        }

        let vocabulary = header.labels.ok_or_else(|| TokClsError::CorruptCache {
            path: cache.path().to_path_buf(),
            reason: "no label vocabulary".to_string(),
        })?;
        if let Some(expected) = label_vocabulary {
            if *expected != vocabulary {
                return Err(TokClsError::InvalidLabelVocabulary(format!(
                    "{} was encoded with a different label vocabulary, set overwrite_cache to re-encode",
                    cache.path().display()
                )));
            }
        }

        Self::from_features(features, vocabulary).map_err(|reason| TokClsError::CorruptCache {
            path: cache.path().to_path_buf(),
            reason,
        })
    }

    fn from_features(
        mut features: EncodedFeatures,
        vocabulary: LabelVocabulary,
    ) -> std::result::Result<Self, String> {
        let labels = features
            .labels
            .take()
            .ok_or_else(|| "no labels tensor".to_string())?;
        if labels.len() != features.len() {
            return Err(format!(
                "{} label rows for {} records",
                labels.len(),
                features.len()
            ));
        }
        Ok(Self {
            features,
            labels,
            vocabulary,
        })
    }

    /// Vocabulary the labels were encoded with; reuse it for dependent splits.
    pub fn label_vocabulary(&self) -> &LabelVocabulary {
        &self.vocabulary
    }

    /// Record length.
    pub fn max_seq_length(&self) -> usize {
        self.features.max_seq_length
    }

    /// Number of sentences cut to fit the record length.
    pub fn truncated(&self) -> usize {
        self.features.truncated
    }
}

impl Dataset for TokenClassificationDataset {
    type Item = TokenClassificationItem;

    fn len(&self) -> usize {
        self.features.len()
    }

    fn get(&self, index: usize) -> Option<Self::Item> {
        let f = &self.features;
        Some(TokenClassificationItem {
            input_ids: f.input_ids.get(index)?.clone(),
            segment_ids: f.segment_ids[index].clone(),
            input_mask: f.input_mask[index].clone(),
            loss_mask: f.loss_mask[index].clone(),
            subtokens_mask: f.subtokens_mask[index].clone(),
            labels: self.labels[index].clone(),
        })
    }

    fn output_types(&self) -> OutputTypes {
        TRAIN_OUTPUT_TYPES
    }
}

/// Unlabeled dataset built from in-memory queries.
#[derive(Debug, Clone)]
pub struct TokenClassificationInferDataset {
    features: EncodedFeatures,
}

impl TokenClassificationInferDataset {
    pub fn new<T, S>(queries: &[S], max_seq_length: usize, tokenizer: &T) -> Result<Self>
    where
        T: SubwordTokenizer + ?Sized,
        S: AsRef<str>,
    {
        let encoder = FeatureEncoder::new(EncoderConfig::new(max_seq_length))?;
        let features = encoder.encode(tokenizer, queries, None)?;
        Ok(Self { features })
    }

    pub fn max_seq_length(&self) -> usize {
        self.features.max_seq_length
    }
}

impl Dataset for TokenClassificationInferDataset {
    type Item = TokenClassificationInferItem;

    fn len(&self) -> usize {
        self.features.len()
    }

    fn get(&self, index: usize) -> Option<Self::Item> {
        let f = &self.features;
        Some(TokenClassificationInferItem {
            input_ids: f.input_ids.get(index)?.clone(),
            segment_ids: f.segment_ids[index].clone(),
            input_mask: f.input_mask[index].clone(),
            loss_mask: f.loss_mask[index].clone(),
            subtokens_mask: f.subtokens_mask[index].clone(),
        })
    }

    fn output_types(&self) -> OutputTypes {
        INFER_OUTPUT_TYPES
    }
}

fn check_pad_label(vocab: &LabelVocabulary, pad_label: &str) -> Result<()> {
    if vocab.pad_label() != pad_label {
        return Err(TokClsError::InvalidLabelVocabulary(format!(
            "pad label {pad_label:?} must map to 0, but 0 is {:?}",
            vocab.pad_label()
        )));
    }
    Ok(())
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader.lines().collect::<std::io::Result<_>>()?)
}

/// Load, validate, cap and encode a text/label file pair.
fn encode_files<T>(
    text_file: &Path,
    label_file: &Path,
    tokenizer: &T,
    label_vocabulary: Option<&LabelVocabulary>,
    config: &DatasetConfig,
) -> Result<(EncodedFeatures, LabelVocabulary)>
where
    T: SubwordTokenizer + ?Sized,
{
    let mut text_lines = read_lines(text_file)?;
    let mut label_lines: Vec<Vec<String>> = read_lines(label_file)?
        .iter()
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .collect();

    if text_lines.len() != label_lines.len() {
        return Err(TokClsError::LineCountMismatch {
            text_lines: text_lines.len(),
            label_lines: label_lines.len(),
        });
    }
    for (i, (text, labels)) in text_lines.iter().zip(&label_lines).enumerate() {
        let words = text.split_whitespace().count();
        if words != labels.len() {
            return Err(TokClsError::WordCountMismatch {
                line: i + 1,
                words,
                labels: labels.len(),
            });
        }
    }

    if let Some(limit) = config.sample_limit()? {
        text_lines.truncate(limit);
        label_lines.truncate(limit);
    }
    info!(
        "encoding {} sentences from {}",
        text_lines.len(),
        text_file.display()
    );

    let vocabulary = match label_vocabulary {
        Some(vocab) => vocab.clone(),
        None => LabelVocabulary::from_labels(
            &config.encoder.pad_label,
            label_lines.iter().flatten().map(String::as_str),
        ),
    };
    let label_ids = vocabulary.encode_lines(&label_lines, 1)?;

    let encoder = FeatureEncoder::new(config.encoder.clone())?;
    let features = encoder.encode(tokenizer, &text_lines, Some(label_ids.as_slice()))?;
    Ok((features, vocabulary))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::coordinator::{SingleProcess, ThreadCoordinator};
    use crate::tokenizer::testing::ChunkTokenizer;

    struct Files {
        dir: tempfile::TempDir,
    }

    impl Files {
        fn new(text: &str, labels: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("train.txt"), text).unwrap();
            fs::write(dir.path().join("train_labels.txt"), labels).unwrap();
            Self { dir }
        }

        fn text(&self) -> std::path::PathBuf {
            self.dir.path().join("train.txt")
        }

        fn labels(&self) -> std::path::PathBuf {
            self.dir.path().join("train_labels.txt")
        }

        fn cache_files(&self) -> usize {
            fs::read_dir(self.dir.path())
                .unwrap()
                .filter(|e| {
                    e.as_ref()
                        .unwrap()
                        .file_name()
                        .to_string_lossy()
                        .starts_with("cached_")
                })
                .count()
        }
    }

    const TEXT: &str = "John lives in Paris\nMary works at Google\nhello\nBerlin is big\nok then\n";
    const LABELS: &str = "B-PER O O B-LOC\nB-PER O O B-ORG\nO\nB-LOC O O\nO O\n";

    fn tokenizer() -> ChunkTokenizer {
        ChunkTokenizer::new(32)
            .with_token("John", 5)
            .with_token("lives", 6)
            .with_token("in", 7)
            .with_token("Paris", 8)
    }

    fn build(files: &Files, vocab: Option<&LabelVocabulary>, config: &DatasetConfig) -> Result<TokenClassificationDataset> {
        TokenClassificationDataset::new(
            &files.text(),
            &files.labels(),
            &tokenizer(),
            vocab,
            config,
            &SingleProcess,
        )
    }

    #[test]
    fn test_train_dataset_records() {
        let files = Files::new(TEXT, LABELS);
        let dataset = build(&files, None, &DatasetConfig::new(10)).unwrap();

        assert_eq!(dataset.len(), 5);
        assert_eq!(dataset.max_seq_length(), 6);
        assert_eq!(files.cache_files(), 1);

        let vocab = dataset.label_vocabulary();
        assert_eq!(vocab.labels(), &["O", "B-LOC", "B-ORG", "B-PER"]);

        let item = dataset.get(0).unwrap();
        assert_eq!(item.input_ids, vec![101, 5, 6, 7, 8, 102]);
        assert_eq!(item.input_mask, vec![1, 1, 1, 1, 1, 1]);
        assert_eq!(item.subtokens_mask, vec![0, 1, 1, 1, 1, 0]);
        assert_eq!(item.labels, vec![0, 3, 0, 0, 1, 0]);
        assert_eq!(item.segment_ids, vec![0; 6]);

        let short = dataset.get(2).unwrap();
        assert_eq!(short.input_mask, vec![1, 1, 1, 0, 0, 0]);
        assert_eq!(short.labels, vec![0; 6]);

        assert!(dataset.get(5).is_none());
    }

    #[test]
    fn test_output_types() {
        let files = Files::new(TEXT, LABELS);
        let dataset = build(&files, None, &DatasetConfig::new(10)).unwrap();
        let names: Vec<_> = dataset.output_types().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            ["input_ids", "segment_ids", "input_mask", "loss_mask", "subtokens_mask", "labels"]
        );
        assert_eq!(dataset.output_types()[3].1.element, ElementType::Mask);
        assert_eq!(dataset.output_types()[5].1.element, ElementType::Labels);

        let infer = TokenClassificationInferDataset::new(&["John"], 8, &tokenizer()).unwrap();
        assert_eq!(infer.output_types().len(), 5);
        assert!(infer.output_types().iter().all(|(name, _)| *name != "labels"));
    }

    #[test]
    fn test_sample_cap_preserves_order() {
        let files = Files::new(TEXT, LABELS);
        let config = DatasetConfig::new(10).with_num_samples(2);
        let dataset = build(&files, None, &config).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0).unwrap().input_ids[1], 5);
        assert_eq!(dataset.get(1).unwrap().labels, vec![0, 3, 0, 0, 2, 0]);
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_zero_samples_is_rejected() {
        let files = Files::new(TEXT, LABELS);
        let config = DatasetConfig::new(10).with_num_samples(0);
        assert!(matches!(
            build(&files, None, &config),
            Err(TokClsError::InvalidSampleCount(0))
        ));
        assert_eq!(files.cache_files(), 0);
    }

    #[test]
    fn test_line_count_mismatch_before_encoding() {
        let files = Files::new("a b\nc\nd\n", "O O\nO\n");
        let err = build(&files, None, &DatasetConfig::new(10)).unwrap_err();
        assert!(matches!(
            err,
            TokClsError::LineCountMismatch {
                text_lines: 3,
                label_lines: 2
            }
        ));
        assert_eq!(files.cache_files(), 0);
    }

    #[test]
    fn test_word_count_mismatch() {
        let files = Files::new("a b\nc d e\n", "O O\nO O\n");
        let err = build(&files, None, &DatasetConfig::new(10)).unwrap_err();
        assert!(matches!(err, TokClsError::WordCountMismatch { line: 2, .. }));
    }

    #[test]
    fn test_text_file_must_be_txt() {
        let dir = tempfile::tempdir().unwrap();
        let err = TokenClassificationDataset::new(
            &dir.path().join("train.tsv"),
            &dir.path().join("labels.txt"),
            &tokenizer(),
            None,
            &DatasetConfig::new(10),
            &SingleProcess,
        )
        .unwrap_err();
        assert!(matches!(err, TokClsError::InvalidExtension { .. }));
    }

    #[test]
    fn test_dependent_split_reuses_vocabulary() {
        let train = Files::new(TEXT, LABELS);
        let train_set = build(&train, None, &DatasetConfig::new(10)).unwrap();
        let vocab = train_set.label_vocabulary().clone();

        // the dev split lacks B-ORG, ids must still line up with training
        let dev = Files::new("Paris\n", "B-LOC\n");
        let dev_set = build(&dev, Some(&vocab), &DatasetConfig::new(10)).unwrap();
        assert_eq!(dev_set.label_vocabulary(), &vocab);
        assert_eq!(dev_set.get(0).unwrap().labels, vec![0, 1, 0]);

        let bad = Files::new("Tokyo\n", "B-GPE\n");
        assert!(matches!(
            build(&bad, Some(&vocab), &DatasetConfig::new(10)),
            Err(TokClsError::UnknownLabel { line: 1, .. })
        ));
    }

    #[test]
    fn test_cached_split_with_other_vocabulary_is_rejected() {
        let dev = Files::new("Paris\n", "B-LOC\n");
        let first = LabelVocabulary::from_labels("O", ["B-LOC", "B-PER"]);
        build(&dev, Some(&first), &DatasetConfig::new(10)).unwrap();

        let second = LabelVocabulary::from_labels("O", ["B-LOC", "B-ORG", "B-PER"]);
        assert!(matches!(
            build(&dev, Some(&second), &DatasetConfig::new(10)),
            Err(TokClsError::InvalidLabelVocabulary(_))
        ));

        let config = DatasetConfig::new(10).with_overwrite_cache(true);
        let dev_set = build(&dev, Some(&second), &config).unwrap();
        assert_eq!(dev_set.label_vocabulary(), &second);
    }

    #[test]
    fn test_pad_label_must_own_id_zero() {
        let files = Files::new(TEXT, LABELS);
        let vocab = LabelVocabulary::from_labels("O", ["B-PER"]);
        let config = DatasetConfig::new(10).with_pad_label("X");
        assert!(matches!(
            build(&files, Some(&vocab), &config),
            Err(TokClsError::InvalidLabelVocabulary(_))
        ));
    }

    #[test]
    fn test_second_run_is_a_cache_hit() {
        let files = Files::new(TEXT, LABELS);
        let first = build(&files, None, &DatasetConfig::new(10)).unwrap();
        let cache_path = fs::read_dir(files.dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("cached_"))
            .unwrap();
        let bytes = fs::read(&cache_path).unwrap();

        // a changed source file is not noticed without overwrite_cache
        fs::write(files.text(), "x\n").unwrap();
        fs::write(files.labels(), "O\n").unwrap();
        let second = build(&files, None, &DatasetConfig::new(10)).unwrap();
        assert_eq!(fs::read(&cache_path).unwrap(), bytes);
        assert_eq!(second.len(), first.len());

        let third = build(&files, None, &DatasetConfig::new(10).with_overwrite_cache(true)).unwrap();
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_overwrite_is_idempotent() {
        let files = Files::new(TEXT, LABELS);
        let first = build(&files, None, &DatasetConfig::new(10)).unwrap();
        let second = build(&files, None, &DatasetConfig::new(10).with_overwrite_cache(true)).unwrap();

        assert_eq!(first.len(), second.len());
        for i in 0..first.len() {
            assert_eq!(first.get(i), second.get(i));
        }
        assert_eq!(first.label_vocabulary(), second.label_vocabulary());
    }

    #[test]
    fn test_workers_share_one_cache_entry() {
        let files = Files::new(TEXT, LABELS);
        let config = DatasetConfig::new(10);

        let datasets: Vec<TokenClassificationDataset> = std::thread::scope(|scope| {
            let handles: Vec<_> = ThreadCoordinator::group(4)
                .into_iter()
                .map(|coordinator| {
                    let (text, labels, config) = (files.text(), files.labels(), &config);
                    scope.spawn(move || {
                        TokenClassificationDataset::new(
                            &text,
                            &labels,
                            &tokenizer(),
                            None,
                            config,
                            &coordinator,
                        )
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(files.cache_files(), 1);
        for dataset in &datasets[1..] {
            assert_eq!(dataset.len(), datasets[0].len());
            assert_eq!(dataset.get(4), datasets[0].get(4));
        }
    }

    #[test]
    fn test_infer_dataset() {
        let queries = ["John lives in Paris", "Paris"];
        let dataset = TokenClassificationInferDataset::new(&queries, 16, &tokenizer()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.max_seq_length(), 6);
        let item = dataset.get(1).unwrap();
        assert_eq!(item.input_ids, vec![101, 8, 102, 0, 0, 0]);
        assert_eq!(item.input_mask, vec![1, 1, 1, 0, 0, 0]);
        assert_eq!(item.loss_mask, vec![1, 1, 1, 0, 0, 0]);
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_infer_query_longer_than_max_length() {
        let dataset =
            TokenClassificationInferDataset::new(&["John lives in Paris"], 5, &tokenizer()).unwrap();

        assert_eq!(dataset.max_seq_length(), 5);
        let item = dataset.get(0).unwrap();
        assert_eq!(item.input_ids, vec![101, 6, 7, 8, 102]);
        assert_eq!(item.subtokens_mask, vec![0, 1, 1, 1, 0]);
    }
}
