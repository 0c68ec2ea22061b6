/// Shuffling batch loader with optional background prefetching
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::{BatchOf, Collate, Dataset};
use crate::LoaderConfig;

/// Wraps a dataset and produces one pass of host-resident batches at a time.
///
/// Every call to [`iter_epoch`](BatchLoader::iter_epoch) reshuffles (when
/// enabled) and returns an independent, forward-only pass iterator.
pub struct BatchLoader<D: Dataset> {
    dataset: Arc<D>,
    config: LoaderConfig,
    indices: Vec<usize>,
    rng: StdRng,
}

impl<D: Dataset> BatchLoader<D> {
    /// Create new batch loader
    pub fn new(dataset: D, config: LoaderConfig) -> crate::Result<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let indices: Vec<usize> = (0..dataset.len()).collect();

        Ok(Self {
            dataset: Arc::new(dataset),
            config,
            indices,
            rng,
        })
    }

    /// Number of batches per pass
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.config.drop_last {
            n / self.config.batch_size
        } else {
            n.div_ceil(self.config.batch_size)
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn reshuffle(&mut self) {
        if self.config.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    /// Start a new pass over the dataset
    pub fn iter_epoch(&mut self) -> EpochIter<D> {
        self.reshuffle();

        let batches: Vec<Vec<usize>> = self
            .indices
            .chunks(self.config.batch_size)
            .take(self.num_batches())
            .map(|c| c.to_vec())
            .collect();
        let remaining = batches.len();

        let inner = if self.config.num_workers == 0 {
            EpochInner::Sequential {
                dataset: Arc::clone(&self.dataset),
                batches: batches.into_iter(),
            }
        } else {
            self.spawn_workers(batches)
        };

        EpochIter { inner, remaining }
    }

    fn spawn_workers(&self, batches: Vec<Vec<usize>>) -> EpochInner<D> {
        let workers = self.config.num_workers;
        let capacity = self.config.prefetch_factor * workers;

        let (tx, rx) = mpsc::sync_channel::<candle_core::Result<BatchOf<D>>>(capacity);
        let queue = Arc::new(Mutex::new(batches.into_iter()));

        let handles = (0..workers)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let tx = tx.clone();
                let dataset = Arc::clone(&self.dataset);

                thread::spawn(move || loop {
                    let next = match queue.lock() {
                        Ok(mut q) => q.next(),
                        Err(_) => break,
                    };
                    let Some(indices) = next else { break };

                    // Receiver gone: the pass was abandoned
                    if tx.send(load_batch(&*dataset, &indices)).is_err() {
                        break;
                    }
                })
            })
            .collect();

        EpochInner::Prefetch {
            rx: Some(rx),
            handles,
        }
    }
}

fn load_batch<D: Dataset>(dataset: &D, indices: &[usize]) -> candle_core::Result<BatchOf<D>> {
    let samples = indices.iter().map(|&i| dataset.get(i)).collect();
    D::Item::collate(samples, dataset.window_shape())
}

enum EpochInner<D: Dataset> {
    Sequential {
        dataset: Arc<D>,
        batches: std::vec::IntoIter<Vec<usize>>,
    },
    Prefetch {
        rx: Option<Receiver<candle_core::Result<BatchOf<D>>>>,
        handles: Vec<JoinHandle<()>>,
    },
}

/// One pass of batches. Prefetch workers are stopped and joined on drop.
pub struct EpochIter<D: Dataset> {
    inner: EpochInner<D>,
    remaining: usize,
}

impl<D: Dataset> Iterator for EpochIter<D> {
    type Item = crate::Result<BatchOf<D>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let batch = match &mut self.inner {
            EpochInner::Sequential { dataset, batches } => {
                let indices = batches.next()?;
                load_batch(&**dataset, &indices).map_err(crate::DataError::from)
            }
            EpochInner::Prefetch { rx, .. } => match rx.as_ref().map(|rx| rx.recv()) {
                Some(Ok(batch)) => batch.map_err(crate::DataError::from),
                _ => {
                    self.remaining = 0;
                    return Some(Err(crate::DataError::Worker(
                        "workers stopped before the pass was complete".to_string(),
                    )));
                }
            },
        };

        self.remaining -= 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<D: Dataset> Drop for EpochIter<D> {
    fn drop(&mut self) {
        if let EpochInner::Prefetch { rx, handles } = &mut self.inner {
            // Disconnect first so blocked senders return
            drop(rx.take());
            for handle in handles.drain(..) {
                if handle.join().is_err() {
                    log::warn!("Prefetch worker panicked");
                }
            }
        }
    }
}
