use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while preparing token-classification features.
#[derive(Debug, Error)]
pub enum TokClsError {
    /// The text source does not carry a `.txt` extension.
    #[error("{path:?} should have extension .txt")]
    InvalidExtension {
        /// The rejected text file.
        path: PathBuf,
    },

    /// A sample cap of exactly zero was requested.
    #[error("num_samples has to be positive or -1 for all samples, got {0}")]
    InvalidSampleCount(i64),

    /// The maximum sequence length cannot hold both boundary markers.
    #[error("max_seq_length must be at least 2, got {0}")]
    InvalidMaxSeqLength(usize),

    /// The text and label files have a different number of lines.
    #[error("labels file should contain labels for every sentence: {text_lines} text lines, {label_lines} label lines")]
    LineCountMismatch {
        /// Lines in the text file.
        text_lines: usize,
        /// Lines in the label file.
        label_lines: usize,
    },

    /// A sentence and its label line disagree on the number of words.
    #[error("line {line}: {words} words but {labels} labels")]
    WordCountMismatch {
        /// One-based line number.
        line: usize,
        /// Whitespace-separated words in the sentence.
        words: usize,
        /// Labels on the matching label line.
        labels: usize,
    },

    /// A label is not part of the supplied label vocabulary.
    #[error("line {line}: label {label:?} is not in the label vocabulary")]
    UnknownLabel {
        /// The label that has no id.
        label: String,
        /// One-based line number in the label file.
        line: usize,
    },

    /// The label vocabulary violates its invariants.
    #[error("invalid label vocabulary: {0}")]
    InvalidLabelVocabulary(String),

    /// There is nothing to encode.
    #[error("no sentences to encode")]
    EmptyInput,

    /// The subword tokenizer failed.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// The feature cache file is unreadable or inconsistent.
    #[error("feature cache {path:?}: {reason}")]
    CorruptCache {
        /// The cache entry that failed to load.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Process coordination failed.
    #[error("coordination error: {0}")]
    Coordination(String),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    CandleError(String),

    #[error(transparent)]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<candle_core::Error> for TokClsError {
    fn from(err: candle_core::Error) -> Self {
        TokClsError::CandleError(err.to_string())
    }
}

/// Result type alias for tokcls operations.
pub type Result<T> = std::result::Result<T, TokClsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = TokClsError::InvalidExtension {
            path: PathBuf::from("data/train.csv"),
        };
        assert!(err.to_string().contains("train.csv"));

        let err = TokClsError::LineCountMismatch {
            text_lines: 3,
            label_lines: 2,
        };
        assert!(err.to_string().contains("3 text lines"));

        let err = TokClsError::UnknownLabel {
            label: "B-ORG".into(),
            line: 7,
        };
        assert_eq!(
            err.to_string(),
            "line 7: label \"B-ORG\" is not in the label vocabulary"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TokClsError>();
    }
}
