//! # TokCls Core
//!
//! Feature preparation for subword token-classification models (NER,
//! punctuation, part-of-speech). Turns word-level sentences and labels into
//! fixed-length `input_ids`/`segment_ids`/`input_mask`/`loss_mask`/
//! `subtokens_mask`/`labels` records, caches them on disk once per job and
//! serves them through indexable datasets.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use tokcls_core::{
//!     Dataset, DatasetConfig, HfSubwordTokenizer, SingleProcess, TokenClassificationDataset,
//! };
//!
//! let tokenizer = HfSubwordTokenizer::from_file("tokenizer.json").unwrap();
//! let config = DatasetConfig::new(128);
//! let train = TokenClassificationDataset::new(
//!     Path::new("data/text_train.txt"),
//!     Path::new("data/labels_train.txt"),
//!     &tokenizer,
//!     None,
//!     &config,
//!     &SingleProcess,
//! )
//! .unwrap();
//!
//! let record = train.get(0).unwrap();
//! assert_eq!(record.input_ids.len(), train.max_seq_length());
//! ```
pub mod batch;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod features;
pub mod labels;
pub mod tokenizer;
pub mod types;

// Re-export primary API
pub use batch::{Collate, TokenClassificationBatch, TokenClassificationInferBatch};
pub use cache::{CacheHeader, CacheKey, FeatureCache};
pub use config::{DatasetConfig, EncoderConfig};
pub use coordinator::{FileBarrierCoordinator, ProcessCoordinator, SingleProcess, ThreadCoordinator};
pub use dataset::{
    Dataset, TokenClassificationDataset, TokenClassificationInferDataset,
    TokenClassificationInferItem, TokenClassificationItem,
};
pub use error::{Result, TokClsError};
pub use features::{EncodedFeatures, FeatureEncoder, LengthStats};
pub use labels::{DEFAULT_PAD_LABEL, LabelVocabulary};
pub use tokenizer::{HfSubwordTokenizer, SubwordTokenizer};
pub use types::{AxisKind, ElementType, NeuralType, OutputTypes};
