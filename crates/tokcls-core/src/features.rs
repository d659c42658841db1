//! # Feature Encoder
//!
//! Turns whitespace-tokenized sentences (and optionally their per-word label
//! ids) into fixed-length records:
//!
//! ```text
//! [CLS] jo ##hn lives in paris [SEP] [PAD] ...
//! input_mask      1  1   1    1   1    1     1     0
//! subtokens_mask  0  1   0    1   1    1     0     0
//! loss_mask       1  1   1    1   1    1     1     0   (default flags)
//! labels          O  B   B    O   O    B     O     O
//! ```
//!
//! Continuation subtokens copy the label of their word; whether they count
//! towards the loss is decided by `loss_mask` alone.

use tracing::{info, warn};

use crate::config::EncoderConfig;
use crate::error::{Result, TokClsError};
use crate::labels::LabelVocabulary;
use crate::tokenizer::SubwordTokenizer;

/// Number of records echoed to the log after encoding.
const LOGGED_EXAMPLES: usize = 5;

/// Column-oriented output of [`FeatureEncoder::encode`]: one row per
/// sentence, every row `max_seq_length` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFeatures {
    pub input_ids: Vec<Vec<u32>>,
    pub segment_ids: Vec<Vec<u8>>,
    pub input_mask: Vec<Vec<i64>>,
    pub loss_mask: Vec<Vec<u8>>,
    pub subtokens_mask: Vec<Vec<u8>>,
    /// Present only when label ids were supplied.
    pub labels: Option<Vec<Vec<u32>>>,
    /// Effective row length.
    pub max_seq_length: usize,
    /// Number of rows that were cut to fit.
    pub truncated: usize,
}

impl EncodedFeatures {
    /// Number of encoded sentences.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Summary of the un-truncated subtoken sequence lengths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthStats {
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub median: f64,
    pub p75: f64,
    pub p99: f64,
}

impl LengthStats {
    /// Returns `None` for an empty slice.
    pub fn from_lengths(lengths: &[usize]) -> Option<Self> {
        let mut sorted = lengths.to_vec();
        sorted.sort_unstable();
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let mean = sorted.iter().sum::<usize>() as f64 / sorted.len() as f64;

        Some(Self {
            min,
            max,
            mean,
            median: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
            p99: percentile(&sorted, 99.0),
        })
    }
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn percentile(sorted: &[usize], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let (a, b) = (sorted[lo] as f64, sorted[hi] as f64);
    a + (b - a) * (rank - lo as f64)
}

/// One sentence before truncation and padding.
struct Subtokens {
    tokens: Vec<String>,
    loss_mask: Vec<u8>,
    subtokens_mask: Vec<u8>,
    /// Present only for labeled sentences.
    labels: Option<Vec<u32>>,
}

/// Encodes sentences with a [`SubwordTokenizer`].
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    config: EncoderConfig,
}

impl FeatureEncoder {
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode `sentences`. When `labels` is given it must hold one id row
    /// per sentence with one id per whitespace-separated word.
    pub fn encode<T, S>(
        &self,
        tokenizer: &T,
        sentences: &[S],
        labels: Option<&[Vec<u32>]>,
    ) -> Result<EncodedFeatures>
    where
        T: SubwordTokenizer + ?Sized,
        S: AsRef<str>,
    {
        if sentences.is_empty() {
            return Err(TokClsError::EmptyInput);
        }
        if let Some(labels) = labels {
            if labels.len() != sentences.len() {
                return Err(TokClsError::LineCountMismatch {
                    text_lines: sentences.len(),
                    label_lines: labels.len(),
                });
            }
        }

        let mut rows = Vec::with_capacity(sentences.len());
        for (i, sentence) in sentences.iter().enumerate() {
            let word_labels = labels.map(|l| l[i].as_slice());
            rows.push(self.split_sentence(tokenizer, sentence.as_ref(), word_labels, i + 1)?);
        }

        let lengths: Vec<usize> = rows.iter().map(|r| r.tokens.len()).collect();
        let longest = lengths.iter().copied().max().unwrap_or(0);
        let max_len = self.config.max_seq_length.min(longest);
        info!("Max length: {}", max_len);
        if let Some(stats) = LengthStats::from_lengths(&lengths) {
            info!(
                "Subtoken lengths: min {} max {} mean {:.2} median {:.1} p75 {:.1} p99 {:.1}",
                stats.min, stats.max, stats.mean, stats.median, stats.p75, stats.p99
            );
        }

        let boundary_loss = u8::from(!self.config.ignore_start_end);
        let pad_id = LabelVocabulary::PAD_ID;
        let n = rows.len();
        let mut features = EncodedFeatures {
            input_ids: Vec::with_capacity(n),
            segment_ids: Vec::with_capacity(n),
            input_mask: Vec::with_capacity(n),
            loss_mask: Vec::with_capacity(n),
            subtokens_mask: Vec::with_capacity(n),
            labels: labels.map(|_| Vec::with_capacity(n)),
            max_seq_length: max_len,
            truncated: 0,
        };
        let mut examples = Vec::with_capacity(LOGGED_EXAMPLES);

        for mut row in rows {
            let mut input_mask = vec![1i64; row.tokens.len()];

            if row.tokens.len() > max_len {
                keep_tail(&mut row.tokens, tokenizer.cls_token().to_string(), max_len);
                keep_tail(&mut input_mask, 1, max_len);
                keep_tail(&mut row.loss_mask, boundary_loss, max_len);
                keep_tail(&mut row.subtokens_mask, 0, max_len);
                if let Some(labels) = row.labels.as_mut() {
                    keep_tail(labels, pad_id, max_len);
                }
                features.truncated += 1;
            }

            let mut input_ids = tokenizer.tokens_to_ids(&row.tokens)?;
            input_ids.resize(max_len, 0);
            input_mask.resize(max_len, 0);
            row.loss_mask.resize(max_len, 0);
            row.subtokens_mask.resize(max_len, 0);

            if examples.len() < LOGGED_EXAMPLES {
                examples.push(row.tokens);
            }
            features.input_ids.push(input_ids);
            features.segment_ids.push(vec![0; max_len]);
            features.input_mask.push(input_mask);
            features.loss_mask.push(row.loss_mask);
            features.subtokens_mask.push(row.subtokens_mask);
            if let (Some(all_labels), Some(mut labels)) = (features.labels.as_mut(), row.labels) {
                labels.resize(max_len, pad_id);
                all_labels.push(labels);
            }
        }

        warn!("{} are longer than {}", features.truncated, max_len);
        log_examples(&features, &examples);

        Ok(features)
    }

    fn split_sentence<T>(
        &self,
        tokenizer: &T,
        sentence: &str,
        word_labels: Option<&[u32]>,
        line: usize,
    ) -> Result<Subtokens>
    where
        T: SubwordTokenizer + ?Sized,
    {
        let words: Vec<&str> = sentence.split_whitespace().collect();
        if let Some(word_labels) = word_labels {
            if word_labels.len() != words.len() {
                return Err(TokClsError::WordCountMismatch {
                    line,
                    words: words.len(),
                    labels: word_labels.len(),
                });
            }
        }

        let boundary_loss = u8::from(!self.config.ignore_start_end);
        let extra_loss = u8::from(!self.config.ignore_extra_tokens);
        let pad_id = LabelVocabulary::PAD_ID;

        let mut row = Subtokens {
            tokens: vec![tokenizer.cls_token().to_string()],
            loss_mask: vec![boundary_loss],
            subtokens_mask: vec![0],
            labels: word_labels.map(|_| vec![pad_id]),
        };

        for (j, word) in words.iter().enumerate() {
            let pieces = tokenizer.text_to_tokens(word)?;
            if pieces.is_empty() {
                return Err(TokClsError::Tokenizer(format!(
                    "line {line}: word {word:?} produced no subtokens"
                )));
            }
            let extra = pieces.len() - 1;

            row.tokens.extend(pieces);
            row.loss_mask.push(1);
            row.loss_mask.extend(std::iter::repeat(extra_loss).take(extra));
            row.subtokens_mask.push(1);
            row.subtokens_mask.extend(std::iter::repeat(0).take(extra));
            if let (Some(word_labels), Some(labels)) = (word_labels, row.labels.as_mut()) {
                labels.extend(std::iter::repeat(word_labels[j]).take(extra + 1));
            }
        }

        row.tokens.push(tokenizer.sep_token().to_string());
        row.loss_mask.push(boundary_loss);
        row.subtokens_mask.push(0);
        if let Some(labels) = row.labels.as_mut() {
            labels.push(pad_id);
        }

        Ok(row)
    }
}

/// Keep `head` followed by the last `max_len - 1` elements.
fn keep_tail<T>(values: &mut Vec<T>, head: T, max_len: usize) {
    let tail = values.split_off(values.len() - (max_len - 1));
    values.clear();
    values.push(head);
    values.extend(tail);
}

fn join<T: ToString>(values: &[T]) -> String {
    values.iter().map(T::to_string).collect::<Vec<_>>().join(" ")
}

fn log_examples(features: &EncodedFeatures, examples: &[Vec<String>]) {
    for (i, subtokens) in examples.iter().enumerate() {
        info!("*** Example ***");
        info!("i: {}", i);
        info!("subtokens: {}", subtokens.join(" "));
        info!("loss_mask: {}", join(&features.loss_mask[i]));
        info!("input_mask: {}", join(&features.input_mask[i]));
        info!("subtokens_mask: {}", join(&features.subtokens_mask[i]));
        if let Some(labels) = &features.labels {
            info!("labels: {}", join(&labels[i]));
        }
    }
}
