//! # TokCls Trainer
//!
//! Training-side plumbing around `tokcls-core`: preparing every split of a
//! token-classification corpus with a shared label vocabulary, batching
//! datasets into tensors, and the contract an ASR model exposes to the
//! training loop.

pub mod loader;
pub mod model;
pub mod prepare;

pub use loader::DataLoader;
pub use model::{validation_summary, AsrModel, ValidationStepOutput, ValidationSummary};
pub use prepare::{prepare_splits, PreparedSplits, SplitFiles};
