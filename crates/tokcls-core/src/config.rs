//! Construction parameters for the token classification datasets.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TokClsError};
use crate::labels::DEFAULT_PAD_LABEL;

/// Options controlling how sentences are turned into fixed-length records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Upper bound on the record length, boundary markers included.
    pub max_seq_length: usize,
    /// Label used for padding and boundary markers; always id 0.
    pub pad_label: String,
    /// Exclude continuation subtokens from the loss.
    pub ignore_extra_tokens: bool,
    /// Exclude the sentence boundary markers from the loss.
    pub ignore_start_end: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_seq_length: 128,
            pad_label: DEFAULT_PAD_LABEL.to_string(),
            ignore_extra_tokens: false,
            ignore_start_end: false,
        }
    }
}

impl EncoderConfig {
    pub fn new(max_seq_length: usize) -> Self {
        Self {
            max_seq_length,
            ..Self::default()
        }
    }

    pub fn with_pad_label(mut self, pad_label: impl Into<String>) -> Self {
        self.pad_label = pad_label.into();
        self
    }

    pub fn with_ignore_extra_tokens(mut self, ignore: bool) -> Self {
        self.ignore_extra_tokens = ignore;
        self
    }

    pub fn with_ignore_start_end(mut self, ignore: bool) -> Self {
        self.ignore_start_end = ignore;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_seq_length < 2 {
            return Err(TokClsError::InvalidMaxSeqLength(self.max_seq_length));
        }
        Ok(())
    }
}

/// Configuration of a labeled (training or evaluation) dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    #[serde(flatten)]
    pub encoder: EncoderConfig,
    /// Number of leading samples to keep; negative keeps every sample.
    pub num_samples: i64,
    /// Recompute features even if a cache entry exists.
    pub overwrite_cache: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            num_samples: -1,
            overwrite_cache: false,
        }
    }
}

impl DatasetConfig {
    pub fn new(max_seq_length: usize) -> Self {
        Self {
            encoder: EncoderConfig::new(max_seq_length),
            ..Self::default()
        }
    }

    pub fn with_num_samples(mut self, num_samples: i64) -> Self {
        self.num_samples = num_samples;
        self
    }

    pub fn with_pad_label(mut self, pad_label: impl Into<String>) -> Self {
        self.encoder.pad_label = pad_label.into();
        self
    }

    pub fn with_ignore_extra_tokens(mut self, ignore: bool) -> Self {
        self.encoder.ignore_extra_tokens = ignore;
        self
    }

    pub fn with_ignore_start_end(mut self, ignore: bool) -> Self {
        self.encoder.ignore_start_end = ignore;
        self
    }

    pub fn with_overwrite_cache(mut self, overwrite: bool) -> Self {
        self.overwrite_cache = overwrite;
        self
    }

    /// The sample cap, or `None` to keep every sample.
    pub fn sample_limit(&self) -> Result<Option<usize>> {
        match self.num_samples {
            0 => Err(TokClsError::InvalidSampleCount(0)),
            n if n < 0 => Ok(None),
            n => Ok(Some(n as usize)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.encoder.validate()?;
        self.sample_limit()?;
        Ok(())
    }
}
