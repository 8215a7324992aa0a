pub mod capture;
pub mod info;
pub mod parse;
pub mod ports;
pub mod read;
pub mod watch;

use crate::cli::SourceArgs;
use crate::exit_codes;
use vitals_rs::{EngineConfig, SourceConfig, VitalsEngine, VitalsError};

/// Build an engine from the environment plus command-line overrides.
///
/// On failure the error has already been printed; the exit code is returned.
pub(crate) fn build_engine(
    source: &SourceArgs,
    acquire_timeout_ms: Option<u64>,
    capture_window_ms: Option<u64>,
) -> Result<(VitalsEngine, SourceConfig), i32> {
    let mut config = EngineConfig::from_env().map_err(|e| fail(&e.into()))?;

    if let Some(ms) = acquire_timeout_ms {
        config.acquire_timeout_ms = ms;
    }
    if let Some(ms) = capture_window_ms {
        config.capture_window_ms = ms;
    }

    let source_config = source.to_source_config(&config.serial.port);
    if let SourceConfig::Serial(serial) = &source_config {
        config.serial = serial.clone();
    }

    config.validate().map_err(|e| fail(&e.into()))?;

    Ok((VitalsEngine::new(config), source_config))
}

pub(crate) async fn connect(engine: &VitalsEngine, source_config: SourceConfig) -> Result<(), i32> {
    engine.connect(source_config).await.map_err(|e| fail(&e))
}

/// Print an engine error and map it to an exit code.
pub(crate) fn fail(err: &VitalsError) -> i32 {
    eprintln!("Error: {}", err);
    exit_codes::for_error(err)
}
