/// Source, evaluation and reference-pair datasets over a domain split
use ndarray::Array1;
use rand::Rng;

use super::npz_store::{RawSignals, SignalStore};
use super::pairing::pair_same_class;
use super::{Dataset, PairSample, SignalSample};
use crate::DatasetProfile;

/// Windows from one side of the domain split, with labels and domain indices.
///
/// Built either as the training (source) side, `domain < threshold`, or as the
/// held-out evaluation side, `domain >= threshold` minus excluded samples.
#[derive(Debug, Clone)]
pub struct DomainDataset {
    signals: RawSignals,
    name: String,
}

impl DomainDataset {
    /// Training-domain windows loaded from the profile's archive
    pub fn source(profile: &DatasetProfile) -> crate::Result<Self> {
        let raw = SignalStore::load(&profile.data_path)?;
        Ok(Self::source_from(&raw, profile))
    }

    /// Training-domain windows from already-loaded signals
    pub fn source_from(raw: &RawSignals, profile: &DatasetProfile) -> Self {
        let threshold = profile.domain_threshold;
        let signals = raw.filter(|_, k, _| k < threshold);

        log_summary("train", &signals, profile);

        Self {
            signals,
            name: format!("{}-source", profile.name),
        }
    }

    /// Held-out windows loaded from the profile's archive and exclusion mask,
    /// optionally restricted to one class
    pub fn evaluation(profile: &DatasetProfile, class_filter: Option<i64>) -> crate::Result<Self> {
        let raw = SignalStore::load(&profile.data_path)?;
        let mask = SignalStore::load_mask(&profile.mask_path)?;
        Self::evaluation_from(&raw, &mask, profile, class_filter)
    }

    /// Held-out windows from already-loaded signals and mask
    pub fn evaluation_from(
        raw: &RawSignals,
        mask: &Array1<bool>,
        profile: &DatasetProfile,
        class_filter: Option<i64>,
    ) -> crate::Result<Self> {
        if mask.len() != raw.len() {
            return Err(crate::DataError::Config(format!(
                "Selection mask has {} entries but dataset has {} samples",
                mask.len(),
                raw.len()
            )));
        }

        let threshold = profile.domain_threshold;
        let signals = raw.filter(|y, k, i| {
            !mask[i] && k >= threshold && class_filter.map_or(true, |c| y == c)
        });

        let name = match class_filter {
            Some(c) => format!("{}-eval-{}", profile.name, profile.class_name(c)),
            None => {
                log_summary("eval", &signals, profile);
                format!("{}-eval", profile.name)
            }
        };

        Ok(Self { signals, name })
    }

    /// Samples per class label in `0..num_classes`
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        class_counts(self.signals.labels(), num_classes)
    }

    pub fn signals(&self) -> &RawSignals {
        &self.signals
    }
}

impl Dataset for DomainDataset {
    type Item = SignalSample;

    fn len(&self) -> usize {
        self.signals.len()
    }

    fn get(&self, idx: usize) -> SignalSample {
        SignalSample {
            window: self.signals.window(idx).to_owned(),
            label: self.signals.labels()[idx],
            domain: self.signals.domains()[idx],
        }
    }

    fn window_shape(&self) -> (usize, usize) {
        self.signals.window_shape()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Same-class pairs over the training-domain windows, fixed at construction
#[derive(Debug, Clone)]
pub struct ReferenceDataset {
    signals: RawSignals,
    pairs: Vec<(usize, usize)>,
    name: String,
}

impl ReferenceDataset {
    /// Load the profile's archive and pair its training-domain windows.
    ///
    /// Fails with `EmptyPairing` when a class has a single training sample.
    pub fn new<R: Rng + ?Sized>(profile: &DatasetProfile, rng: &mut R) -> crate::Result<Self> {
        let raw = SignalStore::load(&profile.data_path)?;
        Self::from_signals(&raw, profile, rng)
    }

    /// Pair the training-domain windows of already-loaded signals.
    ///
    /// Every training label must lie in the profile's class vocabulary, so the
    /// pair set always has one entry per source sample.
    pub fn from_signals<R: Rng + ?Sized>(
        raw: &RawSignals,
        profile: &DatasetProfile,
        rng: &mut R,
    ) -> crate::Result<Self> {
        let threshold = profile.domain_threshold;
        let signals = raw.filter(|_, k, _| k < threshold);

        let labels = signals.labels().to_vec();
        let pairs = pair_same_class(&labels, profile.num_classes(), rng)?;

        log::debug!("Built {} reference pairs for '{}'", pairs.len(), profile.name);

        Ok(Self {
            signals,
            pairs,
            name: format!("{}-reference", profile.name),
        })
    }

    /// `(anchor, partner)` row indices into the training windows
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Training windows the pair indices refer to
    pub fn signals(&self) -> &RawSignals {
        &self.signals
    }
}

impl Dataset for ReferenceDataset {
    type Item = PairSample;

    fn len(&self) -> usize {
        self.pairs.len()
    }

    fn get(&self, idx: usize) -> PairSample {
        let (anchor, partner) = self.pairs[idx];
        PairSample {
            anchor: self.signals.window(anchor).to_owned(),
            reference: self.signals.window(partner).to_owned(),
            label: self.signals.labels()[anchor],
        }
    }

    fn window_shape(&self) -> (usize, usize) {
        self.signals.window_shape()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn class_counts(labels: &Array1<i64>, num_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; num_classes];
    for &y in labels {
        if let Some(slot) = usize::try_from(y).ok().and_then(|i| counts.get_mut(i)) {
            *slot += 1;
        }
    }
    counts
}

fn log_summary(split: &str, signals: &RawSignals, profile: &DatasetProfile) {
    log::info!(
        "{} {} windows: shape {:?}",
        profile.name,
        split,
        signals.windows().shape()
    );

    for (class, count) in class_counts(signals.labels(), profile.num_classes())
        .into_iter()
        .enumerate()
    {
        log::info!("  - Number of {} samples: {}", profile.class_names[class], count);
    }
}
