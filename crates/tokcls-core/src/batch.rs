//! Stacking records into `(B, T)` tensors.

use candle_core::{Device, Tensor, WithDType};

use crate::dataset::{TokenClassificationInferItem, TokenClassificationItem};
use crate::error::{Result, TokClsError};

/// Records that can be stacked into a batch.
pub trait Collate: Sized {
    type Batch;

    fn collate(items: &[Self], device: &Device) -> Result<Self::Batch>;
}

/// Labeled batch. `input_mask` is `i64`, ids and labels `u32`, other masks `u8`.
#[derive(Debug, Clone)]
pub struct TokenClassificationBatch {
    pub input_ids: Tensor,
    pub segment_ids: Tensor,
    pub input_mask: Tensor,
    pub loss_mask: Tensor,
    pub subtokens_mask: Tensor,
    pub labels: Tensor,
}

/// Unlabeled batch.
#[derive(Debug, Clone)]
pub struct TokenClassificationInferBatch {
    pub input_ids: Tensor,
    pub segment_ids: Tensor,
    pub input_mask: Tensor,
    pub loss_mask: Tensor,
    pub subtokens_mask: Tensor,
}

fn stack<'a, T, I>(rows: I, batch: usize, device: &Device) -> Result<Tensor>
where
    T: WithDType,
    I: Iterator<Item = &'a [T]>,
{
    let mut width = None;
    let mut flat = Vec::new();
    for row in rows {
        match width {
            None => width = Some(row.len()),
            Some(w) if w != row.len() => {
                return Err(TokClsError::CandleError(format!(
                    "ragged batch: rows of length {w} and {}",
                    row.len()
                )));
            }
            Some(_) => {}
        }
        flat.extend_from_slice(row);
    }
    let width = width.ok_or(TokClsError::EmptyInput)?;
    Ok(Tensor::from_vec(flat, (batch, width), device)?)
}

impl Collate for TokenClassificationItem {
    type Batch = TokenClassificationBatch;

    fn collate(items: &[Self], device: &Device) -> Result<Self::Batch> {
        let n = items.len();
        Ok(TokenClassificationBatch {
            input_ids: stack(items.iter().map(|i| i.input_ids.as_slice()), n, device)?,
            segment_ids: stack(items.iter().map(|i| i.segment_ids.as_slice()), n, device)?,
            input_mask: stack(items.iter().map(|i| i.input_mask.as_slice()), n, device)?,
            loss_mask: stack(items.iter().map(|i| i.loss_mask.as_slice()), n, device)?,
            subtokens_mask: stack(items.iter().map(|i| i.subtokens_mask.as_slice()), n, device)?,
            labels: stack(items.iter().map(|i| i.labels.as_slice()), n, device)?,
        })
    }
}

impl Collate for TokenClassificationInferItem {
    type Batch = TokenClassificationInferBatch;

    fn collate(items: &[Self], device: &Device) -> Result<Self::Batch> {
        let n = items.len();
        Ok(TokenClassificationInferBatch {
            input_ids: stack(items.iter().map(|i| i.input_ids.as_slice()), n, device)?,
            segment_ids: stack(items.iter().map(|i| i.segment_ids.as_slice()), n, device)?,
            input_mask: stack(items.iter().map(|i| i.input_mask.as_slice()), n, device)?,
            loss_mask: stack(items.iter().map(|i| i.loss_mask.as_slice()), n, device)?,
            subtokens_mask: stack(items.iter().map(|i| i.subtokens_mask.as_slice()), n, device)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use candle_core::DType;

    use super::*;

    fn item(ids: &[u32]) -> TokenClassificationItem {
        let len = ids.len();
        TokenClassificationItem {
            input_ids: ids.to_vec(),
            segment_ids: vec![0; len],
            input_mask: vec![1; len],
            loss_mask: vec![1; len],
            subtokens_mask: vec![0; len],
            labels: vec![2; len],
        }
    }

    #[test]
    fn test_collate_shapes_and_dtypes() {
        let batch = TokenClassificationItem::collate(&[item(&[1, 2, 3]), item(&[4, 5, 6])], &Device::Cpu)
            .unwrap();

        assert_eq!(batch.input_ids.dims(), &[2, 3]);
        assert_eq!(batch.input_ids.dtype(), DType::U32);
        assert_eq!(batch.input_mask.dtype(), DType::I64);
        assert_eq!(batch.loss_mask.dtype(), DType::U8);
        assert_eq!(batch.labels.dtype(), DType::U32);
        assert_eq!(
            batch.input_ids.to_vec2::<u32>().unwrap(),
            vec![vec![1, 2, 3], vec![4, 5, 6]]
        );
    }

    #[test]
    fn test_ragged_batch_is_rejected() {
        let result = TokenClassificationItem::collate(&[item(&[1, 2]), item(&[3])], &Device::Cpu);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let result = TokenClassificationItem::collate(&[], &Device::Cpu);
        assert!(matches!(result, Err(TokClsError::EmptyInput)));
    }
}
