//! Cross-domain sensor-signal data pipeline
//!
//! Loads pre-segmented vibration / accelerometer windows, splits them into
//! training and held-out domains, builds same-class reference pairs, and
//! streams device-resident batches for domain-adaptation training.
//!
//! # Pipeline
//!
//! - **Store**: `.npz` archive of `(x, y, k)` plus an exclusion mask
//! - **Datasets**: source / evaluation windows and same-class reference pairs
//! - **Loaders**: shuffling, optionally prefetching batch harness
//! - **Fetcher**: endless, mode-aware batch assembly on a candle device
//!
//! # Example
//!
//! ```ignore
//! use crossdomain_signals::{DatasetProfile, LoaderConfig, FetcherConfig, Mode};
//! use crossdomain_signals::data::{train_source_loader, train_reference_loader, InputFetcher};
//!
//! let profile = DatasetProfile::cwru();
//! let config = LoaderConfig::default();
//! let source = train_source_loader(&profile, &config)?;
//! let reference = train_reference_loader(&profile, &config)?;
//! let device = crossdomain_signals::utils::select_device()?;
//! let mut fetcher = InputFetcher::new(source, Some(reference), Mode::Train, FetcherConfig::default(), device)?;
//! let inputs = fetcher.fetch()?;
//! ```

pub mod config;
pub mod data;
pub mod utils;

// Re-export commonly used items
pub use config::{DataConfig, DatasetProfile, FetcherConfig, LoaderConfig};
pub use data::{FetchedInputs, InputFetcher, Mode};

/// Library error types
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("Class {class} has {members} training sample(s); pairing needs at least 2")]
    EmptyPairing { class: usize, members: usize },

    #[error("Loader yields no batches: {0}")]
    EmptyLoader(String),

    #[error("Prefetch worker error: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DataError>;
