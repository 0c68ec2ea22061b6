/// Loader entry points for training and evaluation
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::str::FromStr;

use super::datasets::{DomainDataset, ReferenceDataset};
use super::loader::BatchLoader;
use super::npz_store::SignalStore;
use crate::{DatasetProfile, LoaderConfig};

/// Which training dataset a train loader wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainSplit {
    Source,
    Reference,
}

impl FromStr for TrainSplit {
    type Err = crate::DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(TrainSplit::Source),
            "reference" => Ok(TrainSplit::Reference),
            other => Err(crate::DataError::UnsupportedMode(format!(
                "train loader '{}'. Must be 'source' or 'reference'",
                other
            ))),
        }
    }
}

/// A train loader over either training dataset
pub enum TrainLoader {
    Source(BatchLoader<DomainDataset>),
    Reference(BatchLoader<ReferenceDataset>),
}

impl TrainLoader {
    pub fn split(&self) -> TrainSplit {
        match self {
            TrainLoader::Source(_) => TrainSplit::Source,
            TrainLoader::Reference(_) => TrainSplit::Reference,
        }
    }

    /// Number of batches per pass
    pub fn num_batches(&self) -> usize {
        match self {
            TrainLoader::Source(l) => l.num_batches(),
            TrainLoader::Reference(l) => l.num_batches(),
        }
    }

    pub fn into_source(self) -> crate::Result<BatchLoader<DomainDataset>> {
        match self {
            TrainLoader::Source(l) => Ok(l),
            TrainLoader::Reference(_) => Err(crate::DataError::Config(
                "expected a source loader, got a reference loader".to_string(),
            )),
        }
    }

    pub fn into_reference(self) -> crate::Result<BatchLoader<ReferenceDataset>> {
        match self {
            TrainLoader::Reference(l) => Ok(l),
            TrainLoader::Source(_) => Err(crate::DataError::Config(
                "expected a reference loader, got a source loader".to_string(),
            )),
        }
    }
}

/// Build a train loader by name (`"source"` or `"reference"`)
pub fn train_loader(
    profile: &DatasetProfile,
    which: &str,
    config: &LoaderConfig,
) -> crate::Result<TrainLoader> {
    match which.parse()? {
        TrainSplit::Source => train_source_loader(profile, config).map(TrainLoader::Source),
        TrainSplit::Reference => {
            train_reference_loader(profile, config).map(TrainLoader::Reference)
        }
    }
}

/// Shuffling loader over the training-domain windows
pub fn train_source_loader(
    profile: &DatasetProfile,
    config: &LoaderConfig,
) -> crate::Result<BatchLoader<DomainDataset>> {
    profile.validate()?;

    let loader = BatchLoader::new(DomainDataset::source(profile)?, config.clone())?;
    log::info!("Number of source batches: {}", loader.num_batches());

    Ok(loader)
}

const PAIRING_SEED_OFFSET: u64 = 0x9E37_79B9_7F4A_7C15;
const REFERENCE_SHUFFLE_SEED_OFFSET: u64 = 0xD1B5_4A32_D192_ED03;

/// Shuffling loader over freshly drawn same-class reference pairs.
///
/// With `config.seed` set, pairing and shuffling each get their own seed
/// derived from it, and neither matches the source loader's shuffle seed.
/// Otherwise both draw from entropy.
pub fn train_reference_loader(
    profile: &DatasetProfile,
    config: &LoaderConfig,
) -> crate::Result<BatchLoader<ReferenceDataset>> {
    profile.validate()?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(PAIRING_SEED_OFFSET)),
        None => StdRng::from_entropy(),
    };
    let shuffle_config = LoaderConfig {
        seed: config
            .seed
            .map(|seed| seed.wrapping_add(REFERENCE_SHUFFLE_SEED_OFFSET)),
        ..config.clone()
    };

    let loader = BatchLoader::new(ReferenceDataset::new(profile, &mut rng)?, shuffle_config)?;
    log::info!("Number of reference batches: {}", loader.num_batches());

    Ok(loader)
}

/// Shuffling loader over held-out windows, optionally limited to one class
pub fn eval_loader(
    profile: &DatasetProfile,
    config: &LoaderConfig,
    class_filter: Option<i64>,
) -> crate::Result<BatchLoader<DomainDataset>> {
    profile.validate()?;
    BatchLoader::new(DomainDataset::evaluation(profile, class_filter)?, config.clone())
}

/// One evaluation loader per class, in label order.
///
/// The archive and mask are read once and shared by every subset.
pub fn per_class_eval_loaders(
    profile: &DatasetProfile,
    config: &LoaderConfig,
) -> crate::Result<Vec<BatchLoader<DomainDataset>>> {
    profile.validate()?;

    let raw = SignalStore::load(&profile.data_path)?;
    let mask = SignalStore::load_mask(&profile.mask_path)?;

    (0..profile.num_classes() as i64)
        .map(|class| {
            let dataset = DomainDataset::evaluation_from(&raw, &mask, profile, Some(class))?;
            log::debug!(
                "Eval subset '{}': {} samples",
                profile.class_name(class),
                dataset.signals().len()
            );
            BatchLoader::new(dataset, config.clone())
        })
        .collect()
}
