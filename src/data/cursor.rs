/// Endless per-stream cursor over a batch loader
use super::loader::{BatchLoader, EpochIter};
use super::{BatchOf, Dataset};

/// Where a cursor stands in its current pass
pub enum CursorState<D: Dataset> {
    /// No pass started yet
    Uninitialized,
    /// Mid-pass
    Active(EpochIter<D>),
    /// Pass finished; the next advance starts a fresh, reshuffled one
    Exhausted,
}

/// Turns a finite, restartable loader into an infinite batch stream.
///
/// Each cursor owns its loader and pass state exclusively, so two cursors
/// restart on unrelated schedules.
pub struct Cursor<D: Dataset> {
    loader: BatchLoader<D>,
    state: CursorState<D>,
    passes: usize,
    position: usize,
}

impl<D: Dataset> Cursor<D> {
    /// Wrap a loader. Fails when the loader yields no batches per pass.
    pub fn new(loader: BatchLoader<D>) -> crate::Result<Self> {
        if loader.num_batches() == 0 {
            return Err(crate::DataError::EmptyLoader(format!(
                "'{}' has {} sample(s) for batch_size {} (drop_last={})",
                loader.dataset().name(),
                loader.len(),
                loader.config().batch_size,
                loader.config().drop_last
            )));
        }

        Ok(Self {
            loader,
            state: CursorState::Uninitialized,
            passes: 0,
            position: 0,
        })
    }

    /// Next batch, starting a new pass when there is none or the current one is spent
    pub fn advance(&mut self) -> crate::Result<BatchOf<D>> {
        let mut fresh = false;

        loop {
            match &mut self.state {
                CursorState::Active(pass) => match pass.next() {
                    Some(batch) => {
                        self.position += 1;
                        return batch;
                    }
                    None if fresh => {
                        return Err(crate::DataError::EmptyLoader(format!(
                            "'{}' produced an empty pass",
                            self.loader.dataset().name()
                        )));
                    }
                    None => self.state = CursorState::Exhausted,
                },
                CursorState::Uninitialized | CursorState::Exhausted => {
                    self.state = CursorState::Active(self.loader.iter_epoch());
                    self.passes += 1;
                    self.position = 0;
                    fresh = true;

                    log::debug!(
                        "Starting pass {} over '{}' ({} batches)",
                        self.passes,
                        self.loader.dataset().name(),
                        self.loader.num_batches()
                    );
                }
            }
        }
    }

    /// Passes started so far
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Batches taken from the current pass
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn state(&self) -> &CursorState<D> {
        &self.state
    }
}
