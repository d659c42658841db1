//! # Feature Cache
//!
//! Encoded features are written once per fingerprint next to the source text
//! file and read back by every worker. The fingerprint is
//! `cached_<filename>_<tokenizer type>_<max_seq_length>_<vocab size>`; other
//! encoding options are not part of it, so changing them requires
//! `overwrite_cache`.
//!
//! The blob is a safetensors file with one `(N, L)` tensor per field and a
//! JSON [`CacheHeader`] stored under the `tokcls` metadata key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor, WithDType};
use safetensors::tensor::SafeTensors;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EncoderConfig;
use crate::coordinator::ProcessCoordinator;
use crate::error::{Result, TokClsError};
use crate::features::EncodedFeatures;
use crate::labels::LabelVocabulary;
use crate::tokenizer::SubwordTokenizer;

const HEADER_KEY: &str = "tokcls";
const EXTENSION: &str = "safetensors";

/// Identity of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub filename: String,
    pub tokenizer_type: String,
    pub max_seq_length: usize,
    pub vocab_size: usize,
}

impl CacheKey {
    pub fn new<T>(text_file: &Path, tokenizer: &T, max_seq_length: usize) -> Result<Self>
    where
        T: SubwordTokenizer + ?Sized,
    {
        let filename = text_file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| TokClsError::InvalidExtension {
                path: text_file.to_path_buf(),
            })?
            .to_string();

        Ok(Self {
            filename,
            tokenizer_type: tokenizer.type_name().to_string(),
            max_seq_length,
            vocab_size: tokenizer.vocab_size(),
        })
    }

    pub fn fingerprint(&self) -> String {
        format!(
            "cached_{}_{}_{}_{}",
            self.filename, self.tokenizer_type, self.max_seq_length, self.vocab_size
        )
    }
}

/// Everything about a cache entry that is not a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeader {
    pub fingerprint: String,
    /// Effective record length.
    pub max_seq_length: usize,
    pub truncated: usize,
    /// Vocabulary the `labels` tensor was encoded with.
    pub labels: Option<LabelVocabulary>,
    /// Options the entry was encoded with.
    pub encoder: EncoderConfig,
    pub num_samples: i64,
}

/// A cache entry on disk.
#[derive(Debug, Clone)]
pub struct FeatureCache {
    key: CacheKey,
    path: PathBuf,
}

impl FeatureCache {
    /// Cache entry colocated with `text_file`.
    pub fn for_text_file<T>(text_file: &Path, tokenizer: &T, max_seq_length: usize) -> Result<Self>
    where
        T: SubwordTokenizer + ?Sized,
    {
        let key = CacheKey::new(text_file, tokenizer, max_seq_length)?;
        let dir = text_file.parent().unwrap_or_else(|| Path::new(""));
        Ok(Self::in_dir(key, dir))
    }

    pub fn in_dir(key: CacheKey, dir: &Path) -> Self {
        let path = dir.join(format!("{}.{EXTENSION}", key.fingerprint()));
        Self { key, path }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write-once/read-many protocol: the primary builds and saves the entry
    /// if it is missing (or `overwrite` is set), every worker then meets at
    /// the barrier, and every worker, the primary included, loads the entry
    /// from disk.
    pub fn get_or_build<C, F>(
        &self,
        coordinator: &C,
        overwrite: bool,
        build: F,
    ) -> Result<(EncodedFeatures, CacheHeader)>
    where
        C: ProcessCoordinator + ?Sized,
        F: FnOnce(&CacheKey) -> Result<(EncodedFeatures, CacheHeader)>,
    {
        if coordinator.is_primary() && (overwrite || !self.exists()) {
            let (features, header) = build(&self.key)?;
            self.save(&features, &header)?;
            info!("features saved to {}", self.path.display());
        }

        coordinator.barrier()?;

        let restored = self.load()?;
        info!("features restored from {}", self.path.display());
        Ok(restored)
    }

    /// Serialize `features` and atomically replace the entry.
    pub fn save(&self, features: &EncodedFeatures, header: &CacheHeader) -> Result<()> {
        let width = features.max_seq_length;
        let mut tensors = vec![
            ("input_ids", matrix(&features.input_ids, width)?),
            ("segment_ids", matrix(&features.segment_ids, width)?),
            ("input_mask", matrix(&features.input_mask, width)?),
            ("loss_mask", matrix(&features.loss_mask, width)?),
            ("subtokens_mask", matrix(&features.subtokens_mask, width)?),
        ];
        if let Some(labels) = &features.labels {
            tensors.push(("labels", matrix(labels, width)?));
        }

        let metadata = HashMap::from([(HEADER_KEY.to_string(), serde_json::to_string(header)?)]);

        let tmp = self.path.with_extension(format!("{EXTENSION}.tmp"));
        safetensors::tensor::serialize_to_file(tensors, &Some(metadata), &tmp)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Read the entry back.
    pub fn load(&self) -> Result<(EncodedFeatures, CacheHeader)> {
        let bytes = fs::read(&self.path)?;

        let (_, metadata) = SafeTensors::read_metadata(&bytes)?;
        let header_json = metadata
            .metadata()
            .as_ref()
            .and_then(|m| m.get(HEADER_KEY))
            .ok_or_else(|| self.corrupt(format!("missing {HEADER_KEY:?} metadata")))?;
        let header: CacheHeader = serde_json::from_str(header_json)?;

        let tensors = candle_core::safetensors::load_buffer(&bytes, &Device::Cpu)?;
        let records = tensors
            .get("input_ids")
            .ok_or_else(|| self.corrupt("missing tensor \"input_ids\"".to_string()))?
            .dims()
            .first()
            .copied()
            .unwrap_or(0);
        let expected = [records, header.max_seq_length];
        let check = |name: &str, t: &Tensor| -> Result<()> {
            if t.dims() != expected.as_slice() {
                return Err(self.corrupt(format!(
                    "tensor {name:?} has shape {:?}, expected {expected:?}",
                    t.dims()
                )));
            }
            Ok(())
        };
        let rows = |name: &str| -> Result<&Tensor> {
            let t = tensors
                .get(name)
                .ok_or_else(|| self.corrupt(format!("missing tensor {name:?}")))?;
            check(name, t)?;
            Ok(t)
        };

        let features = EncodedFeatures {
            input_ids: rows("input_ids")?.to_vec2()?,
            segment_ids: rows("segment_ids")?.to_vec2()?,
            input_mask: rows("input_mask")?.to_vec2()?,
            loss_mask: rows("loss_mask")?.to_vec2()?,
            subtokens_mask: rows("subtokens_mask")?.to_vec2()?,
            labels: match tensors.get("labels") {
                Some(t) => {
                    check("labels", t)?;
                    Some(t.to_vec2()?)
                }
                None => None,
            },
            max_seq_length: header.max_seq_length,
            truncated: header.truncated,
        };

        Ok((features, header))
    }

    fn corrupt(&self, reason: String) -> TokClsError {
        TokClsError::CorruptCache {
            path: self.path.clone(),
            reason,
        }
    }
}

fn matrix<T: WithDType>(rows: &[Vec<T>], width: usize) -> Result<Tensor> {
    let flat: Vec<T> = rows.iter().flatten().copied().collect();
    Ok(Tensor::from_vec(flat, (rows.len(), width), &Device::Cpu)?)
}
