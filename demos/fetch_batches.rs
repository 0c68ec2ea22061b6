/// Pull training batches the way a domain-adaptation training loop would
use crossdomain_signals::data::{eval_loader, train_reference_loader, train_source_loader, InputFetcher};
use crossdomain_signals::utils::{device_label, select_device};
use crossdomain_signals::{DataConfig, FetchedInputs, Mode};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("=== Cross-domain signal batches ===");

    // First argument: JSON config path; default is the bearing-fault profile
    let config = match std::env::args().nth(1) {
        Some(path) => DataConfig::from_json_file(path)?,
        None => DataConfig::default(),
    };
    let steps: usize = match std::env::args().nth(2) {
        Some(n) => n.parse()?,
        None => 10,
    };

    // Device setup - CUDA when available, otherwise CPU
    let device = select_device()?;
    log::info!("Using device: {}", device_label(&device));

    log::info!("Dataset profile: {} ({} classes)", config.profile.name, config.profile.num_classes());
    log::info!("  - Archive: {:?}", config.profile.data_path);
    log::info!("  - Domain threshold: {}", config.profile.domain_threshold);

    let source = train_source_loader(&config.profile, &config.train_loader)?;
    let reference = train_reference_loader(&config.profile, &config.train_loader)?;

    let mut fetcher = InputFetcher::new(
        source,
        Some(reference),
        Mode::Train,
        config.fetcher.clone(),
        device.clone(),
    )?;

    for step in 0..steps {
        let inputs = fetcher.fetch()?;
        if let FetchedInputs::Train(t) = &inputs {
            log::info!(
                "Step {}: x_src {:?}, x_ref {:?}, z_trg {:?}",
                step,
                t.x_src.dims(),
                t.x_ref.dims(),
                t.z_trg.dims()
            );
        }
    }

    log::info!(
        "Passes started: source={}, reference={:?}",
        fetcher.primary_passes(),
        fetcher.reference_passes()
    );

    // Held-out side, one validation draw
    let eval = eval_loader(&config.profile, &config.eval_loader, None)?;
    let mut validator = InputFetcher::new(eval, None, Mode::Val, config.fetcher.clone(), device)?;
    let inputs = validator.fetch()?;
    for (name, tensor) in inputs.field_names().iter().zip(inputs.tensors()) {
        log::info!("  - {}: {:?}", name, tensor.dims());
    }

    Ok(())
}
