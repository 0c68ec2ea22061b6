/// Mode-aware, endless input fetcher
///
/// Pulls batches from a primary loader (and, in train mode, a reference-pair
/// loader), adds latent vectors, and places everything on one device.
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::cursor::Cursor;
use super::datasets::{DomainDataset, ReferenceDataset};
use super::loader::BatchLoader;
use crate::FetcherConfig;

/// What the fetcher assembles per call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Source batch + reference pair batch + two latent draws
    Train,
    /// Two independent batches from the same loader
    Val,
    /// A single batch
    Test,
}

impl FromStr for Mode {
    type Err = crate::DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "val" => Ok(Mode::Val),
            "test" => Ok(Mode::Test),
            other => Err(crate::DataError::UnsupportedMode(format!(
                "fetch mode '{}'. Must be 'train', 'val' or 'test'",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Train => "train",
            Mode::Val => "val",
            Mode::Test => "test",
        };
        f.write_str(name)
    }
}

/// Train-mode inputs
#[derive(Debug, Clone)]
pub struct TrainInputs {
    pub x_src: Tensor,
    pub y_src: Tensor,
    pub k_src: Tensor,
    pub y_ref: Tensor,
    pub x_ref: Tensor,
    pub x_ref2: Tensor,
    pub z_trg: Tensor,
    pub z_trg2: Tensor,
}

/// Validation inputs: a source batch and a second, independent batch
#[derive(Debug, Clone)]
pub struct ValInputs {
    pub x_src: Tensor,
    pub y_src: Tensor,
    pub k_src: Tensor,
    pub x_ref: Tensor,
    pub y_ref: Tensor,
    pub k_ref: Tensor,
}

/// Test inputs
#[derive(Debug, Clone)]
pub struct TestInputs {
    pub x: Tensor,
    pub y: Tensor,
    pub k: Tensor,
}

/// One fetched, device-resident batch structure
#[derive(Debug, Clone)]
pub enum FetchedInputs {
    Train(TrainInputs),
    Val(ValInputs),
    Test(TestInputs),
}

const TRAIN_FIELDS: &[&str] = &[
    "x_src", "y_src", "k_src", "y_ref", "x_ref", "x_ref2", "z_trg", "z_trg2",
];
const VAL_FIELDS: &[&str] = &["x_src", "y_src", "k_src", "x_ref", "y_ref", "k_ref"];
const TEST_FIELDS: &[&str] = &["x", "y", "k"];

impl FetchedInputs {
    pub fn mode(&self) -> Mode {
        match self {
            FetchedInputs::Train(_) => Mode::Train,
            FetchedInputs::Val(_) => Mode::Val,
            FetchedInputs::Test(_) => Mode::Test,
        }
    }

    /// Field names present for this variant
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            FetchedInputs::Train(_) => TRAIN_FIELDS,
            FetchedInputs::Val(_) => VAL_FIELDS,
            FetchedInputs::Test(_) => TEST_FIELDS,
        }
    }

    /// Tensors in `field_names()` order
    pub fn tensors(&self) -> Vec<&Tensor> {
        match self {
            FetchedInputs::Train(t) => vec![
                &t.x_src, &t.y_src, &t.k_src, &t.y_ref, &t.x_ref, &t.x_ref2, &t.z_trg, &t.z_trg2,
            ],
            FetchedInputs::Val(v) => vec![&v.x_src, &v.y_src, &v.k_src, &v.x_ref, &v.y_ref, &v.k_ref],
            FetchedInputs::Test(t) => vec![&t.x, &t.y, &t.k],
        }
    }

    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.field_names()
            .iter()
            .position(|&f| f == name)
            .map(|i| self.tensors()[i])
    }

    /// Name-keyed map of every field
    pub fn into_named(self) -> HashMap<String, Tensor> {
        let names = self.field_names();
        names
            .iter()
            .map(|n| n.to_string())
            .zip(self.tensors().into_iter().cloned())
            .collect()
    }

    fn into_device(self, device: &Device) -> candle_core::Result<Self> {
        Ok(match self {
            FetchedInputs::Train(t) => FetchedInputs::Train(TrainInputs {
                x_src: t.x_src.to_device(device)?,
                y_src: t.y_src.to_device(device)?,
                k_src: t.k_src.to_device(device)?,
                y_ref: t.y_ref.to_device(device)?,
                x_ref: t.x_ref.to_device(device)?,
                x_ref2: t.x_ref2.to_device(device)?,
                z_trg: t.z_trg.to_device(device)?,
                z_trg2: t.z_trg2.to_device(device)?,
            }),
            FetchedInputs::Val(v) => FetchedInputs::Val(ValInputs {
                x_src: v.x_src.to_device(device)?,
                y_src: v.y_src.to_device(device)?,
                k_src: v.k_src.to_device(device)?,
                x_ref: v.x_ref.to_device(device)?,
                y_ref: v.y_ref.to_device(device)?,
                k_ref: v.k_ref.to_device(device)?,
            }),
            FetchedInputs::Test(t) => FetchedInputs::Test(TestInputs {
                x: t.x.to_device(device)?,
                y: t.y.to_device(device)?,
                k: t.k.to_device(device)?,
            }),
        })
    }
}

/// Per-mode assembly, fixed when the fetcher is built
enum FetchStrategy {
    Train { reference: Cursor<ReferenceDataset> },
    Val,
    Test,
}

/// Endless batch source for a training driver.
///
/// `fetch` never reports end-of-stream: both the primary and the reference
/// stream restart with a reshuffled pass whenever they run out, each on its
/// own schedule.
pub struct InputFetcher {
    primary: Cursor<DomainDataset>,
    strategy: FetchStrategy,
    latent_dim: usize,
    rng: StdRng,
    device: Device,
}

impl InputFetcher {
    /// Create a fetcher.
    ///
    /// Train mode requires `loader_ref`; the other modes ignore it.
    pub fn new(
        loader: BatchLoader<DomainDataset>,
        loader_ref: Option<BatchLoader<ReferenceDataset>>,
        mode: Mode,
        config: FetcherConfig,
        device: Device,
    ) -> crate::Result<Self> {
        config.validate()?;

        let strategy = match (mode, loader_ref) {
            (Mode::Train, Some(reference)) => FetchStrategy::Train {
                reference: Cursor::new(reference)?,
            },
            (Mode::Train, None) => {
                return Err(crate::DataError::Config(
                    "train mode needs a reference loader".to_string(),
                ))
            }
            (Mode::Val, reference) => {
                if reference.is_some() {
                    log::warn!("Reference loader is unused in val mode");
                }
                FetchStrategy::Val
            }
            (Mode::Test, reference) => {
                if reference.is_some() {
                    log::warn!("Reference loader is unused in test mode");
                }
                FetchStrategy::Test
            }
        };

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        log::info!(
            "Input fetcher: mode={}, latent_dim={}, device={}",
            mode,
            config.latent_dim,
            crate::utils::device_label(&device)
        );

        Ok(Self {
            primary: Cursor::new(loader)?,
            strategy,
            latent_dim: config.latent_dim,
            rng,
            device,
        })
    }

    /// Same as [`new`](InputFetcher::new) with the mode given by name
    pub fn with_mode_name(
        loader: BatchLoader<DomainDataset>,
        loader_ref: Option<BatchLoader<ReferenceDataset>>,
        mode: &str,
        config: FetcherConfig,
        device: Device,
    ) -> crate::Result<Self> {
        let mode = mode.parse()?;
        Self::new(loader, loader_ref, mode, config, device)
    }

    /// Replace the latent-vector random source
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn mode(&self) -> Mode {
        match self.strategy {
            FetchStrategy::Train { .. } => Mode::Train,
            FetchStrategy::Val => Mode::Val,
            FetchStrategy::Test => Mode::Test,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Passes started on the primary stream
    pub fn primary_passes(&self) -> usize {
        self.primary.passes()
    }

    /// Passes started on the reference stream (train mode only)
    pub fn reference_passes(&self) -> Option<usize> {
        match &self.strategy {
            FetchStrategy::Train { reference } => Some(reference.passes()),
            _ => None,
        }
    }

    /// Assemble the next batch structure on the configured device
    pub fn fetch(&mut self) -> crate::Result<FetchedInputs> {
        let src = self.primary.advance()?;

        let inputs = match &mut self.strategy {
            FetchStrategy::Train { reference } => {
                let pair = reference.advance()?;
                let batch_size = src.x.dim(0)?;
                let z_trg = standard_normal(&mut self.rng, batch_size, self.latent_dim, &self.device)?;
                let z_trg2 = standard_normal(&mut self.rng, batch_size, self.latent_dim, &self.device)?;

                FetchedInputs::Train(TrainInputs {
                    x_src: src.x,
                    y_src: src.y,
                    k_src: src.k,
                    y_ref: pair.y,
                    x_ref: pair.x,
                    x_ref2: pair.x2,
                    z_trg,
                    z_trg2,
                })
            }
            FetchStrategy::Val => {
                let other = self.primary.advance()?;

                FetchedInputs::Val(ValInputs {
                    x_src: src.x,
                    y_src: src.y,
                    k_src: src.k,
                    x_ref: other.x,
                    y_ref: other.y,
                    k_ref: other.k,
                })
            }
            FetchStrategy::Test => FetchedInputs::Test(TestInputs {
                x: src.x,
                y: src.y,
                k: src.k,
            }),
        };

        // Latents are already resident; moving them again is a no-op
        Ok(inputs.into_device(&self.device)?)
    }
}

impl Iterator for InputFetcher {
    type Item = crate::Result<FetchedInputs>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.fetch())
    }
}

/// `[rows, cols]` of independent N(0, 1) draws, placed on `device`
fn standard_normal<R: Rng + ?Sized>(
    rng: &mut R,
    rows: usize,
    cols: usize,
    device: &Device,
) -> candle_core::Result<Tensor> {
    let data: Vec<f32> = (0..rows * cols).map(|_| rng.sample(StandardNormal)).collect();
    Tensor::from_vec(data, (rows, cols), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawSignals;
    use crate::{DatasetProfile, LoaderConfig};
    use candle_core::DType;
    use ndarray::{Array, Array1};
    use std::path::PathBuf;

    fn profile() -> DatasetProfile {
        DatasetProfile {
            name: "toy".to_string(),
            class_names: vec!["a".to_string(), "b".to_string()],
            domain_threshold: 10,
            data_path: PathBuf::new(),
            mask_path: PathBuf::new(),
        }
    }

    // 12 training windows (domains 0..9 cycling) with 3 channels of length 4
    fn raw() -> RawSignals {
        let n = 12;
        let windows = Array::from_shape_fn((n, 3, 4), |(i, c, l)| (i * 100 + c * 10 + l) as f32);
        let labels: Array1<i64> = (0..n as i64).map(|i| i % 2).collect();
        let domains: Array1<i64> = (0..n as i64).map(|i| i % 10).collect();
        RawSignals::new(windows, labels, domains).unwrap()
    }

    fn config(batch_size: usize) -> LoaderConfig {
        LoaderConfig {
            batch_size,
            num_workers: 0,
            drop_last: false,
            seed: Some(5),
            ..LoaderConfig::default()
        }
    }

    fn source_loader(batch_size: usize) -> BatchLoader<DomainDataset> {
        BatchLoader::new(DomainDataset::source_from(&raw(), &profile()), config(batch_size)).unwrap()
    }

    fn reference_loader(batch_size: usize) -> BatchLoader<ReferenceDataset> {
        let mut rng = StdRng::seed_from_u64(2);
        let dataset = ReferenceDataset::from_signals(&raw(), &profile(), &mut rng).unwrap();
        BatchLoader::new(dataset, config(batch_size)).unwrap()
    }

    fn fetcher_config() -> FetcherConfig {
        FetcherConfig {
            latent_dim: 16,
            seed: Some(3),
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("train".parse::<Mode>().unwrap(), Mode::Train);
        assert_eq!("val".parse::<Mode>().unwrap(), Mode::Val);
        assert_eq!("test".parse::<Mode>().unwrap(), Mode::Test);
        assert_eq!(Mode::Val.to_string(), "val");
        assert!(matches!(
            "eval".parse::<Mode>(),
            Err(crate::DataError::UnsupportedMode(_))
        ));
    }

    #[test]
    fn test_train_fields_and_latents() -> crate::Result<()> {
        let mut fetcher = InputFetcher::new(
            source_loader(8),
            Some(reference_loader(8)),
            Mode::Train,
            fetcher_config(),
            Device::Cpu,
        )?;

        let inputs = fetcher.fetch()?;
        assert_eq!(inputs.mode(), Mode::Train);
        assert_eq!(
            inputs.field_names(),
            &["x_src", "y_src", "k_src", "y_ref", "x_ref", "x_ref2", "z_trg", "z_trg2"]
        );

        let FetchedInputs::Train(t) = &inputs else {
            panic!("expected train inputs");
        };
        assert_eq!(t.x_src.dims(), &[8, 3, 4]);
        assert_eq!(t.x_ref2.dims(), &[8, 3, 4]);
        assert_eq!(t.z_trg.dims(), &[8, 16]);
        assert_eq!(t.z_trg2.dims(), &[8, 16]);
        assert_eq!(t.z_trg.dtype(), DType::F32);

        assert!(t.z_trg.device().same_device(fetcher.device()));
        assert!(t.x_src.device().same_device(fetcher.device()));

        let diff = (&t.z_trg - &t.z_trg2)?.abs()?.sum_all()?.to_scalar::<f32>()?;
        assert!(diff > 0.0);

        // Pair windows share the reference label; labels equal row index parity
        let y_ref = t.y_ref.to_vec1::<i64>()?;
        let x_ref = t.x_ref.to_vec3::<f32>()?;
        let x_ref2 = t.x_ref2.to_vec3::<f32>()?;
        for i in 0..8 {
            let anchor_row = (x_ref[i][0][0] / 100.0) as i64;
            let partner_row = (x_ref2[i][0][0] / 100.0) as i64;
            assert_ne!(anchor_row, partner_row);
            assert_eq!(anchor_row % 2, y_ref[i]);
            assert_eq!(partner_row % 2, y_ref[i]);
        }

        Ok(())
    }

    #[test]
    fn test_train_latent_follows_short_batch() -> crate::Result<()> {
        // 12 samples, batch 8: second source batch holds 4
        let mut fetcher = InputFetcher::new(
            source_loader(8),
            Some(reference_loader(5)),
            Mode::Train,
            fetcher_config(),
            Device::Cpu,
        )?;

        fetcher.fetch()?;
        let inputs = fetcher.fetch()?;
        assert_eq!(inputs.get("x_src").unwrap().dim(0)?, 4);
        assert_eq!(inputs.get("z_trg").unwrap().dims(), &[4, 16]);
        assert_eq!(inputs.get("x_ref").unwrap().dim(0)?, 5);

        Ok(())
    }

    #[test]
    fn test_streams_restart_independently() -> crate::Result<()> {
        // Source: 2 batches per pass; reference: 3 batches per pass
        let mut fetcher = InputFetcher::new(
            source_loader(6),
            Some(reference_loader(4)),
            Mode::Train,
            fetcher_config(),
            Device::Cpu,
        )?;

        for _ in 0..6 {
            fetcher.fetch()?;
        }
        assert_eq!(fetcher.primary_passes(), 3);
        assert_eq!(fetcher.reference_passes(), Some(2));

        fetcher.fetch()?;
        assert_eq!(fetcher.primary_passes(), 4);
        assert_eq!(fetcher.reference_passes(), Some(3));

        Ok(())
    }

    #[test]
    fn test_train_without_reference_rejected() {
        let result = InputFetcher::new(source_loader(4), None, Mode::Train, fetcher_config(), Device::Cpu);
        assert!(matches!(result, Err(crate::DataError::Config(_))));
    }

    #[test]
    fn test_val_draws_two_batches_from_primary() -> crate::Result<()> {
        let mut fetcher = InputFetcher::new(source_loader(4), None, Mode::Val, fetcher_config(), Device::Cpu)?;

        let inputs = fetcher.fetch()?;
        assert_eq!(
            inputs.field_names(),
            &["x_src", "y_src", "k_src", "x_ref", "y_ref", "k_ref"]
        );

        // Both draws come from the same pass, so they never overlap
        let FetchedInputs::Val(v) = inputs else {
            panic!("expected val inputs");
        };
        let src = v.x_src.to_vec3::<f32>()?;
        let other = v.x_ref.to_vec3::<f32>()?;
        for a in &src {
            for b in &other {
                assert_ne!(a[0][0], b[0][0]);
            }
        }
        assert_eq!(fetcher.primary_passes(), 1);

        // Third and fourth draws wrap into a new pass
        fetcher.fetch()?;
        assert_eq!(fetcher.primary_passes(), 2);

        Ok(())
    }

    #[test]
    fn test_test_mode_plain_fields() -> crate::Result<()> {
        let fetcher = InputFetcher::new(source_loader(5), None, Mode::Test, fetcher_config(), Device::Cpu)?;

        for inputs in fetcher.take(7) {
            let named = inputs?.into_named();
            let mut keys: Vec<&str> = named.keys().map(|k| k.as_str()).collect();
            keys.sort_unstable();
            assert_eq!(keys, vec!["k", "x", "y"]);
        }

        Ok(())
    }

    #[test]
    fn test_unknown_mode_name_rejected() {
        let result = InputFetcher::with_mode_name(
            source_loader(4),
            None,
            "inference",
            fetcher_config(),
            Device::Cpu,
        );
        assert!(matches!(result, Err(crate::DataError::UnsupportedMode(_))));
    }

    #[test]
    fn test_latents_created_on_requested_device() -> crate::Result<()> {
        let mut rng = StdRng::seed_from_u64(9);
        let z = standard_normal(&mut rng, 3, 5, &Device::Cpu)?;

        assert_eq!(z.dims(), &[3, 5]);
        assert!(z.device().same_device(&Device::Cpu));

        Ok(())
    }

    #[test]
    fn test_seeded_latents_reproducible() -> crate::Result<()> {
        let draw = || -> crate::Result<Vec<Vec<f32>>> {
            let mut fetcher = InputFetcher::new(
                source_loader(4),
                Some(reference_loader(4)),
                Mode::Train,
                fetcher_config(),
                Device::Cpu,
            )?
            .with_rng(StdRng::seed_from_u64(77));
            let inputs = fetcher.fetch()?;
            Ok(inputs.get("z_trg").unwrap().to_vec2::<f32>()?)
        };

        assert_eq!(draw()?, draw()?);

        Ok(())
    }
}
