//! Mini-batch iteration over a [`Dataset`].

use anyhow::{ensure, Result};
use candle_core::Device;
use oorandom::Rand32;
use tokcls_core::{Collate, Dataset};

/// Batches a dataset into collated tensors.
pub struct DataLoader<'a, D> {
    dataset: &'a D,
    batch_size: usize,
    drop_last: bool,
    seed: Option<u64>,
    device: Device,
}

impl<'a, D> DataLoader<'a, D>
where
    D: Dataset,
    D::Item: Collate,
{
    pub fn new(dataset: &'a D, batch_size: usize) -> Result<Self> {
        ensure!(batch_size > 0, "batch size must be positive");
        Ok(Self {
            dataset,
            batch_size,
            drop_last: false,
            seed: None,
            device: Device::Cpu,
        })
    }

    /// Discard the final batch when it is smaller than `batch_size`.
    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Shuffle records every epoch, reproducibly for a given seed.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        let len = self.dataset.len();
        if self.drop_last {
            len / self.batch_size
        } else {
            len.div_ceil(self.batch_size)
        }
    }

    /// Record order for `epoch`.
    pub fn order(&self, epoch: u64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.seed {
            let mut rng = Rand32::new(seed.wrapping_add(epoch));
            for i in (1..indices.len()).rev() {
                let j = rng.rand_range(0..(i as u32 + 1)) as usize;
                indices.swap(i, j);
            }
        }
        indices
    }

    /// Collated batches for one pass over the dataset.
    pub fn epoch(&self, epoch: u64) -> impl Iterator<Item = Result<<D::Item as Collate>::Batch>> + '_ {
        let order = self.order(epoch);
        let num_batches = self.num_batches();
        (0..num_batches).map(move |b| {
            let start = b * self.batch_size;
            let end = (start + self.batch_size).min(order.len());
            let items = order[start..end]
                .iter()
                .map(|&i| {
                    self.dataset
                        .get(i)
                        .ok_or_else(|| anyhow::anyhow!("record {i} is out of range"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(<D::Item as Collate>::collate(&items, &self.device)?)
        })
    }
}
