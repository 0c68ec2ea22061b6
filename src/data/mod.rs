/// Data pipeline: store, datasets, batch loaders and the input fetcher
pub mod cursor;
pub mod datasets;
pub mod factory;
pub mod fetcher;
pub mod loader;
pub mod npz_store;
pub mod pairing;

pub use cursor::{Cursor, CursorState};
pub use datasets::{DomainDataset, ReferenceDataset};
pub use factory::{
    eval_loader, per_class_eval_loaders, train_loader, train_reference_loader,
    train_source_loader, TrainLoader, TrainSplit,
};
pub use fetcher::{FetchedInputs, InputFetcher, Mode, TestInputs, TrainInputs, ValInputs};
pub use loader::{BatchLoader, EpochIter};
pub use npz_store::{RawSignals, SignalStore};
pub use pairing::pair_same_class;

use candle_core::{Device, Result, Tensor};
use ndarray::Array2;

/// One window with its class label and domain index
#[derive(Debug, Clone)]
pub struct SignalSample {
    pub window: Array2<f32>, // [channels, length]
    pub label: i64,
    pub domain: i64,
}

/// Anchor window, a different window of the same class, and their shared label
#[derive(Debug, Clone)]
pub struct PairSample {
    pub anchor: Array2<f32>,
    pub reference: Array2<f32>,
    pub label: i64,
}

/// Batched `SignalSample`s: x `[B, C, L]` f32, y and k `[B]` i64
#[derive(Debug, Clone)]
pub struct SignalBatch {
    pub x: Tensor,
    pub y: Tensor,
    pub k: Tensor,
}

/// Batched `PairSample`s: x and x2 `[B, C, L]` f32, y `[B]` i64
#[derive(Debug, Clone)]
pub struct PairBatch {
    pub x: Tensor,
    pub x2: Tensor,
    pub y: Tensor,
}

/// Stack samples along a new leading batch dimension (host memory)
pub trait Collate: Sized + Send + 'static {
    type Batch: Send + 'static;

    fn collate(samples: Vec<Self>, window_shape: (usize, usize)) -> Result<Self::Batch>;
}

/// Indexable collection of samples
pub trait Dataset: Send + Sync + 'static {
    type Item: Collate;

    /// Number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at `idx`; panics when `idx >= len()`
    fn get(&self, idx: usize) -> Self::Item;

    /// `(channels, length)` of one window
    fn window_shape(&self) -> (usize, usize);

    /// Human-readable name for diagnostics
    fn name(&self) -> &str {
        "dataset"
    }
}

/// Batch type produced by a loader over `D`
pub type BatchOf<D> = <<D as Dataset>::Item as Collate>::Batch;

fn stack_windows<'a, I>(windows: I, batch: usize, (c, l): (usize, usize)) -> Result<Tensor>
where
    I: Iterator<Item = &'a Array2<f32>>,
{
    let mut data = Vec::with_capacity(batch * c * l);
    for w in windows {
        data.extend(w.iter().copied());
    }
    Tensor::from_vec(data, (batch, c, l), &Device::Cpu)
}

fn stack_indices(values: Vec<i64>) -> Result<Tensor> {
    let n = values.len();
    Tensor::from_vec(values, n, &Device::Cpu)
}

impl Collate for SignalSample {
    type Batch = SignalBatch;

    fn collate(samples: Vec<Self>, window_shape: (usize, usize)) -> Result<SignalBatch> {
        let n = samples.len();
        let x = stack_windows(samples.iter().map(|s| &s.window), n, window_shape)?;
        let y = stack_indices(samples.iter().map(|s| s.label).collect())?;
        let k = stack_indices(samples.iter().map(|s| s.domain).collect())?;
        Ok(SignalBatch { x, y, k })
    }
}

impl Collate for PairSample {
    type Batch = PairBatch;

    fn collate(samples: Vec<Self>, window_shape: (usize, usize)) -> Result<PairBatch> {
        let n = samples.len();
        let x = stack_windows(samples.iter().map(|s| &s.anchor), n, window_shape)?;
        let x2 = stack_windows(samples.iter().map(|s| &s.reference), n, window_shape)?;
        let y = stack_indices(samples.iter().map(|s| s.label).collect())?;
        Ok(PairBatch { x, x2, y })
    }
}
