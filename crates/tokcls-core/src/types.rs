//! Field metadata declared by datasets so a consumer can wire losses and
//! metrics without hard-coding what each output means.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic meaning of a tensor axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisKind {
    /// `B`
    Batch,
    /// `T`
    Time,
}

/// Categorical type of the values carried by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// Plain model input channel (ids, segment ids, attention mask).
    Channel,
    /// Boolean mask consumed by losses or post-processing.
    Mask,
    /// Target class ids.
    Labels,
}

/// Shape and element semantics of one dataset output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NeuralType {
    pub axes: &'static [AxisKind],
    pub element: ElementType,
}

impl NeuralType {
    const BATCH_TIME: &'static [AxisKind] = &[AxisKind::Batch, AxisKind::Time];

    /// `(B, T)` field of the given element type.
    pub const fn batch_time(element: ElementType) -> Self {
        Self {
            axes: Self::BATCH_TIME,
            element,
        }
    }
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisKind::Batch => write!(f, "B"),
            AxisKind::Time => write!(f, "T"),
        }
    }
}

impl fmt::Display for NeuralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axes: Vec<String> = self.axes.iter().map(ToString::to_string).collect();
        write!(f, "({}) {:?}", axes.join(", "), self.element)
    }
}

/// Ordered `(field name, type)` declarations.
pub type OutputTypes = &'static [(&'static str, NeuralType)];
