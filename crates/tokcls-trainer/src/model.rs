//! Contract between a speech-recognition model and the training loop.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// A trained ASR model the training loop can validate and run.
pub trait AsrModel {
    /// Transcribe one audio file to text.
    fn transcribe(&self, audio: &Path) -> Result<String>;
}

/// What one validation step reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationStepOutput {
    pub val_loss: f64,
    /// Word-level edit errors accumulated over the step.
    pub wer_num: u64,
    /// Reference words in the step.
    pub wer_denom: u64,
}

/// Aggregate of a validation epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub val_loss: f64,
    pub wer: f64,
    pub log: BTreeMap<String, f64>,
}

/// Mean loss over steps and corpus-level WER (summed errors over summed words).
pub fn validation_summary(outputs: &[ValidationStepOutput]) -> Result<ValidationSummary> {
    if outputs.is_empty() {
        bail!("no validation steps to summarize");
    }

    let val_loss = outputs.iter().map(|o| o.val_loss).sum::<f64>() / outputs.len() as f64;
    let wer_num: u64 = outputs.iter().map(|o| o.wer_num).sum();
    let wer_denom: u64 = outputs.iter().map(|o| o.wer_denom).sum();
    if wer_denom == 0 {
        bail!("validation steps contain no reference words");
    }
    let wer = wer_num as f64 / wer_denom as f64;

    let log = BTreeMap::from([
        ("validation_loss".to_string(), val_loss),
        ("validation_wer".to_string(), wer),
    ]);
    Ok(ValidationSummary { val_loss, wer, log })
}
