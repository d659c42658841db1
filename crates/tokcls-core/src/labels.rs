//! # Label Vocabulary
//!
//! Maps label strings (e.g. `B-PER`, `O`) to the integer ids used in the
//! `labels` field. The pad label always owns id 0; the remaining labels are
//! numbered in alphabetical order when the vocabulary is derived from data.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TokClsError};

/// Default neutral label used for padding and boundary markers.
pub const DEFAULT_PAD_LABEL: &str = "O";

/// Bidirectional label ↔ id mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u32>", into = "BTreeMap<String, u32>")]
pub struct LabelVocabulary {
    /// Labels indexed by id.
    labels: Vec<String>,
    ids: HashMap<String, u32>,
}

impl LabelVocabulary {
    /// Id of the pad label.
    pub const PAD_ID: u32 = 0;

    /// Derive a vocabulary from the labels seen in a training split.
    ///
    /// `pad_label` gets id 0 even if it never occurs.
    pub fn from_labels<'a, I>(pad_label: &str, labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = labels.into_iter().filter(|l| *l != pad_label).collect();

        let mut ordered = Vec::with_capacity(distinct.len() + 1);
        ordered.push(pad_label.to_string());
        ordered.extend(distinct.into_iter().map(str::to_string));

        Self::from_ordered(ordered)
    }

    /// Build from an explicit mapping, e.g. the one fixed by a training split.
    pub fn from_map(pad_label: &str, map: &BTreeMap<String, u32>) -> Result<Self> {
        match map.get(pad_label) {
            Some(&0) => {}
            Some(&id) => {
                return Err(TokClsError::InvalidLabelVocabulary(format!(
                    "pad label {pad_label:?} must map to 0, found {id}"
                )));
            }
            None => {
                return Err(TokClsError::InvalidLabelVocabulary(format!(
                    "pad label {pad_label:?} is missing"
                )));
            }
        }
        let vocab = Self::try_from(map.clone())?;
        Ok(vocab)
    }

    fn from_ordered(labels: Vec<String>) -> Self {
        let ids = labels
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id as u32))
            .collect();
        Self { labels, ids }
    }

    /// Look up the id of a label.
    pub fn id(&self, label: &str) -> Option<u32> {
        self.ids.get(label).copied()
    }

    /// Look up the label of an id.
    pub fn label(&self, id: u32) -> Option<&str> {
        self.labels.get(id as usize).map(String::as_str)
    }

    /// The label owning id 0.
    pub fn pad_label(&self) -> &str {
        &self.labels[0]
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in id order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Map label lines to id lines. `first_line` is the one-based line
    /// number of `lines[0]`, used in error messages.
    pub fn encode_lines(&self, lines: &[Vec<String>], first_line: usize) -> Result<Vec<Vec<u32>>> {
        lines
            .iter()
            .enumerate()
            .map(|(offset, line)| {
                line.iter()
                    .map(|label| {
                        self.id(label).ok_or_else(|| TokClsError::UnknownLabel {
                            label: label.clone(),
                            line: first_line + offset,
                        })
                    })
                    .collect::<Result<Vec<u32>>>()
            })
            .collect()
    }

    /// Write the vocabulary as one label per line, line index = id.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut contents = self.labels.join("\n");
        contents.push('\n');
        fs::write(path, contents)?;
        Ok(())
    }

    /// Read a vocabulary written by [`LabelVocabulary::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let labels: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if labels.is_empty() {
            return Err(TokClsError::InvalidLabelVocabulary("empty label file".into()));
        }
        let distinct: BTreeSet<&String> = labels.iter().collect();
        if distinct.len() != labels.len() {
            return Err(TokClsError::InvalidLabelVocabulary("duplicate labels".into()));
        }
        Ok(Self::from_ordered(labels))
    }
}

impl TryFrom<BTreeMap<String, u32>> for LabelVocabulary {
    type Error = TokClsError;

    fn try_from(map: BTreeMap<String, u32>) -> Result<Self> {
        let mut labels = vec![None; map.len()];
        for (label, id) in map {
            let slot = labels.get_mut(id as usize).ok_or_else(|| {
                TokClsError::InvalidLabelVocabulary(format!(
                    "ids must be contiguous from 0, {label:?} has id {id}"
                ))
            })?;
            if slot.is_some() {
                return Err(TokClsError::InvalidLabelVocabulary(format!("id {id} is assigned twice")));
            }
            *slot = Some(label);
        }
        let labels = labels.into_iter().flatten().collect::<Vec<_>>();
        if labels.is_empty() {
            return Err(TokClsError::InvalidLabelVocabulary("no labels".into()));
        }
        Ok(Self::from_ordered(labels))
    }
}

impl From<LabelVocabulary> for BTreeMap<String, u32> {
    fn from(vocab: LabelVocabulary) -> Self {
        vocab.ids.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_labels_pad_first_then_alphabetical() {
        let vocab = LabelVocabulary::from_labels("O", ["B-PER", "O", "B-LOC", "I-PER", "B-PER"]);
        assert_eq!(vocab.labels(), &["O", "B-LOC", "B-PER", "I-PER"]);
        assert_eq!(vocab.id("O"), Some(0));
        assert_eq!(vocab.id("B-PER"), Some(2));
        assert_eq!(vocab.label(3), Some("I-PER"));
        assert_eq!(vocab.pad_label(), "O");
    }

    #[test]
    fn test_pad_label_added_when_absent() {
        let vocab = LabelVocabulary::from_labels("O", ["B-LOC"]);
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.id("O"), Some(LabelVocabulary::PAD_ID));
    }

    #[test]
    fn test_from_map_requires_pad_zero() {
        let map: BTreeMap<String, u32> = [("O".to_string(), 1), ("B-LOC".to_string(), 0)].into();
        assert!(matches!(
            LabelVocabulary::from_map("O", &map),
            Err(TokClsError::InvalidLabelVocabulary(_))
        ));

        let map: BTreeMap<String, u32> = [("O".to_string(), 0), ("B-LOC".to_string(), 1)].into();
        let vocab = LabelVocabulary::from_map("O", &map).unwrap();
        assert_eq!(vocab.id("B-LOC"), Some(1));
    }

    #[test]
    fn test_from_map_rejects_gaps() {
        let map: BTreeMap<String, u32> = [("O".to_string(), 0), ("B-LOC".to_string(), 5)].into();
        assert!(LabelVocabulary::from_map("O", &map).is_err());
    }

    #[test]
    fn test_encode_lines_reports_unknown_label() {
        let vocab = LabelVocabulary::from_labels("O", ["B-PER"]);
        let lines = vec![
            vec!["B-PER".to_string(), "O".to_string()],
            vec!["B-ORG".to_string()],
        ];
        let err = vocab.encode_lines(&lines, 1).unwrap_err();
        assert!(matches!(err, TokClsError::UnknownLabel { line: 2, .. }));

        let ids = vocab.encode_lines(&lines[..1], 1).unwrap();
        assert_eq!(ids, vec![vec![1, 0]]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("label_ids.csv");

        let vocab = LabelVocabulary::from_labels("O", ["B-PER", "B-LOC"]);
        vocab.save(&path).unwrap();

        let restored = LabelVocabulary::load(&path).unwrap();
        assert_eq!(restored, vocab);
    }

    #[test]
    fn test_serde_as_map() {
        let vocab = LabelVocabulary::from_labels("O", ["B-PER"]);
        let json = serde_json::to_string(&vocab).unwrap();
        assert_eq!(json, r#"{"B-PER":1,"O":0}"#);

        let restored: LabelVocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, vocab);
    }
}
