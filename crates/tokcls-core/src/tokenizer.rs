//! # Subword Tokenizer Capability
//!
//! The feature encoder never tokenizes by itself. It consumes a
//! [`SubwordTokenizer`], which splits a word into subword pieces, maps pieces
//! to vocabulary ids, and names the sentence boundary markers.
//! [`HfSubwordTokenizer`] adapts a Hugging Face `tokenizer.json`.

use std::path::Path;
use std::str::FromStr;

use tokenizers::models::ModelWrapper;
use tokenizers::Tokenizer as HfTokenizer;

use crate::error::{Result, TokClsError};

/// Capabilities the feature encoder needs from a subword tokenizer.
pub trait SubwordTokenizer {
    /// Split a single word (or any text) into subword pieces.
    fn text_to_tokens(&self, text: &str) -> Result<Vec<String>>;

    /// Map subword pieces to vocabulary ids.
    fn tokens_to_ids(&self, tokens: &[String]) -> Result<Vec<u32>>;

    /// Sentence-start marker.
    fn cls_token(&self) -> &str;

    /// Sentence-end marker.
    fn sep_token(&self) -> &str;

    /// Number of entries in the vocabulary.
    fn vocab_size(&self) -> usize;

    /// Identity of the concrete tokenizer, part of the feature cache key.
    fn type_name(&self) -> &str;
}

/// [`SubwordTokenizer`] backed by the `tokenizers` crate.
pub struct HfSubwordTokenizer {
    inner: HfTokenizer,
    type_name: String,
    cls_token: String,
    sep_token: String,
    unk_token: String,
}

impl HfSubwordTokenizer {
    /// Wrap an already loaded tokenizer with BERT-style markers.
    pub fn new(inner: HfTokenizer) -> Self {
        let type_name = model_type_name(inner.get_model()).to_string();
        Self {
            inner,
            type_name,
            cls_token: "[CLS]".to_string(),
            sep_token: "[SEP]".to_string(),
            unk_token: "[UNK]".to_string(),
        }
    }

    /// Load a `tokenizer.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner =
            HfTokenizer::from_file(path).map_err(|e| TokClsError::Tokenizer(e.to_string()))?;
        Ok(Self::new(inner))
    }

    /// Parse a serialized `tokenizer.json` document.
    pub fn from_json(json: &str) -> Result<Self> {
        let inner = HfTokenizer::from_str(json).map_err(|e| TokClsError::Tokenizer(e.to_string()))?;
        Ok(Self::new(inner))
    }

    /// Override the sentence boundary markers (e.g. `<s>` / `</s>`).
    pub fn with_markers(mut self, cls_token: impl Into<String>, sep_token: impl Into<String>) -> Self {
        self.cls_token = cls_token.into();
        self.sep_token = sep_token.into();
        self
    }

    /// Override the token used for pieces missing from the vocabulary.
    pub fn with_unk_token(mut self, unk_token: impl Into<String>) -> Self {
        self.unk_token = unk_token.into();
        self
    }
}

impl SubwordTokenizer for HfSubwordTokenizer {
    fn text_to_tokens(&self, text: &str) -> Result<Vec<String>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokClsError::Tokenizer(format!("failed to tokenize {text:?}: {e}")))?;
        Ok(encoding.get_tokens().to_vec())
    }

    fn tokens_to_ids(&self, tokens: &[String]) -> Result<Vec<u32>> {
        tokens
            .iter()
            .map(|token| {
                self.inner
                    .token_to_id(token)
                    .or_else(|| self.inner.token_to_id(&self.unk_token))
                    .ok_or_else(|| {
                        TokClsError::Tokenizer(format!(
                            "token {token:?} and unknown token {:?} are both missing from the vocabulary",
                            self.unk_token
                        ))
                    })
            })
            .collect()
    }

    fn cls_token(&self) -> &str {
        &self.cls_token
    }

    fn sep_token(&self) -> &str {
        &self.sep_token
    }

    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }
}

fn model_type_name(model: &ModelWrapper) -> &'static str {
    match model {
        ModelWrapper::WordPiece(_) => "WordPiece",
        ModelWrapper::BPE(_) => "BPE",
        ModelWrapper::WordLevel(_) => "WordLevel",
        ModelWrapper::Unigram(_) => "Unigram",
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const WORDPIECE_JSON: &str = r###"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordPiece",
            "unk_token": "[UNK]",
            "continuing_subword_prefix": "##",
            "max_input_chars_per_word": 100,
            "vocab": {
                "[PAD]": 0,
                "[UNK]": 1,
                "[CLS]": 2,
                "[SEP]": 3,
                "paris": 4,
                "lives": 5,
                "in": 6,
                "jo": 7,
                "##hn": 8
            }
        }
    }"###;

    #[test]
    fn test_wordpiece_split_and_ids() {
        let tokenizer = HfSubwordTokenizer::from_json(WORDPIECE_JSON).unwrap();
        let tokens = tokenizer.text_to_tokens("john").unwrap();
        assert_eq!(tokens, vec!["jo".to_string(), "##hn".to_string()]);

        let ids = tokenizer.tokens_to_ids(&tokens).unwrap();
        assert_eq!(ids, vec![7, 8]);
    }

    #[test]
    fn test_unknown_piece_maps_to_unk() {
        let tokenizer = HfSubwordTokenizer::from_json(WORDPIECE_JSON).unwrap();
        let ids = tokenizer.tokens_to_ids(&["berlin".to_string()]).unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_missing_unk_is_an_error() {
        let tokenizer = HfSubwordTokenizer::from_json(WORDPIECE_JSON)
            .unwrap()
            .with_unk_token("<unk>");
        let err = tokenizer.tokens_to_ids(&["berlin".to_string()]).unwrap_err();
        assert!(matches!(err, TokClsError::Tokenizer(_)));
    }

    #[test]
    fn test_identity_and_markers() {
        let tokenizer = HfSubwordTokenizer::from_json(WORDPIECE_JSON).unwrap();
        assert_eq!(tokenizer.type_name(), "WordPiece");
        assert_eq!(tokenizer.vocab_size(), 9);
        assert_eq!(tokenizer.cls_token(), "[CLS]");

        let tokenizer = tokenizer.with_markers("<s>", "</s>");
        assert_eq!(tokenizer.sep_token(), "</s>");
    }

    #[test]
    fn test_invalid_json() {
        assert!(HfSubwordTokenizer::from_json("{").is_err());
    }

    #[test]
    fn test_chunk_tokenizer_pieces() {
        let tokenizer = testing::ChunkTokenizer::new(3);
        let tokens = tokenizer.text_to_tokens("Germany").unwrap();
        assert_eq!(tokens, vec!["Ger", "##man", "##y"]);
    }
}
