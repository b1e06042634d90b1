pub mod allocate;
pub mod assemble;
pub mod config_cmd;

use std::path::{Path, PathBuf};
use storyweave_config::{ConfigError, EngineConfig, LoggingConfig};

/// The effective configuration and where it came from.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub path: PathBuf,
    /// False when `path` did not exist and defaults were used.
    pub from_file: bool,
}

impl LoadedConfig {
    /// Report the config source. Call once tracing is installed.
    pub fn log_source(&self) {
        if self.from_file {
            tracing::debug!("Loaded config from {}", self.path.display());
        } else {
            tracing::info!("No config file found at {}, using defaults", self.path.display());
        }
    }
}

/// Load the config from `path` if given, else from the default location.
/// Environment overrides apply either way.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let path = path.map_or_else(EngineConfig::default_path, Path::to_path_buf);
    let from_file = path.exists();
    let mut config = EngineConfig::load_from(&path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(LoadedConfig {
        config,
        path,
        from_file,
    })
}

/// Install the global tracing subscriber. Logs go to stderr so command
/// output on stdout stays machine-readable.
pub fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let filter = if verbose { "debug" } else { logging.level.as_str() };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
