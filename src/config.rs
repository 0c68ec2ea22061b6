/// Configuration for datasets, loaders and the batch fetcher
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Dataset-specific constants: class vocabulary, domain split and file locations.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DatasetProfile {
    /// Short dataset name used in diagnostics
    pub name: String,

    /// Class names, indexed by label
    pub class_names: Vec<String>,

    /// Domains with index below this value are training domains
    pub domain_threshold: i64,

    /// `.npz` archive holding `x`, `y` and `k`
    pub data_path: PathBuf,

    /// `.npy` exclusion mask parallel to the full dataset
    pub mask_path: PathBuf,
}

impl DatasetProfile {
    /// Bearing-fault vibration dataset, 5 fault classes over 3-channel windows of 256 samples.
    pub fn cwru() -> Self {
        Self {
            name: "cwru".to_string(),
            class_names: ["IR", "Ball", "OR_centred", "OR_orthogonal", "OR_opposite"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            domain_threshold: 4,
            data_path: PathBuf::from("data/cwru_256_3ch_5cl.npz"),
            mask_path: PathBuf::from("data/cwru_256_3ch_5cl_fs.npy"),
        }
    }

    /// Human-activity accelerometer dataset, 4 activity classes, one domain per subject.
    pub fn har() -> Self {
        Self {
            name: "har".to_string(),
            class_names: ["Walking", "Upstairs", "Downstairs", "Running"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            domain_threshold: 5,
            data_path: PathBuf::from("data/har_128_3ch_4cl.npz"),
            mask_path: PathBuf::from("data/har_128_3ch_4cl_fs.npy"),
        }
    }

    /// Look up a built-in profile by name.
    pub fn by_name(name: &str) -> crate::Result<Self> {
        match name {
            "cwru" => Ok(Self::cwru()),
            "har" => Ok(Self::har()),
            other => Err(crate::DataError::Config(format!(
                "Unknown dataset profile: {}. Must be 'cwru' or 'har'",
                other
            ))),
        }
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Display name for a label, falling back to the numeric value
    pub fn class_name(&self, label: i64) -> String {
        usize::try_from(label)
            .ok()
            .and_then(|i| self.class_names.get(i))
            .cloned()
            .unwrap_or_else(|| format!("class {}", label))
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.class_names.is_empty() {
            return Err(crate::DataError::Config(format!(
                "profile '{}' has an empty class vocabulary",
                self.name
            )));
        }

        Ok(())
    }
}

impl Default for DatasetProfile {
    fn default() -> Self {
        Self::cwru()
    }
}

/// Batching harness configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoaderConfig {
    /// Samples per batch
    pub batch_size: usize,

    /// Background prefetch threads (0 = load on the calling thread)
    pub num_workers: usize,

    /// Drop the final undersized batch of each pass
    pub drop_last: bool,

    /// Reshuffle sample order at the start of every pass
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,

    /// Batches buffered per worker
    #[serde(default = "default_prefetch_factor")]
    pub prefetch_factor: usize,

    /// Seed for shuffling (and pairing); `None` draws from entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_shuffle() -> bool {
    true
}

fn default_prefetch_factor() -> usize {
    2
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            num_workers: 4,
            drop_last: false,
            shuffle: true,
            prefetch_factor: 2,
            seed: None,
        }
    }
}

impl LoaderConfig {
    /// Defaults used for evaluation loaders
    pub fn eval() -> Self {
        Self {
            batch_size: 32,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.batch_size == 0 {
            return Err(crate::DataError::Config(
                "batch_size must be > 0".to_string(),
            ));
        }

        if self.prefetch_factor == 0 {
            return Err(crate::DataError::Config(
                "prefetch_factor must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Batch fetcher configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FetcherConfig {
    /// Width of the latent vectors drawn in train mode
    pub latent_dim: usize,

    /// Seed for latent sampling; `None` draws from entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            latent_dim: 16,
            seed: None,
        }
    }
}

impl FetcherConfig {
    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.latent_dim == 0 {
            return Err(crate::DataError::Config(
                "latent_dim must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Full pipeline configuration, usually read from JSON
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DataConfig {
    pub profile: DatasetProfile,
    #[serde(default)]
    pub train_loader: LoaderConfig,
    #[serde(default = "LoaderConfig::eval")]
    pub eval_loader: LoaderConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            profile: DatasetProfile::default(),
            train_loader: LoaderConfig::default(),
            eval_loader: LoaderConfig::eval(),
            fetcher: FetcherConfig::default(),
        }
    }
}

impl DataConfig {
    /// Read and validate a JSON config file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;

        log::info!("Loaded data config from: {:?}", path.as_ref());

        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> crate::Result<()> {
        self.profile.validate()?;
        self.train_loader.validate()?;
        self.eval_loader.validate()?;
        self.fetcher.validate()
    }
}
