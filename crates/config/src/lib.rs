//! Configuration loading and validation for Storyweave.
//!
//! Loads configuration from `~/.storyweave/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use storyweave_core::{
    AgentRole, AllocationMode, MemoryLayer, OverflowStrategy, ProcessingConfig,
};

/// The root configuration structure.
///
/// Maps directly to `~/.storyweave/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Layer token allocator settings
    #[serde(default)]
    pub allocator: AllocatorConfig,

    /// Default prompt assembly settings
    #[serde(default)]
    pub assembly: AssemblyConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the layer token allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Total token pool across all layers.
    #[serde(default = "default_pool_tokens")]
    pub max_tokens: usize,

    /// Tokens held back from every allocation.
    #[serde(default = "default_buffer_tokens")]
    pub buffer_tokens: usize,

    #[serde(default)]
    pub allocation_mode: AllocationMode,

    #[serde(default)]
    pub overflow_strategy: OverflowStrategy,

    /// Optional per-layer caps keyed by layer name (`working`, `episodic`,
    /// `semantic`, `long_term`). Enforced in static mode.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layer_limits: BTreeMap<String, usize>,
}

fn default_pool_tokens() -> usize {
    8192
}
fn default_buffer_tokens() -> usize {
    512
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_pool_tokens(),
            buffer_tokens: default_buffer_tokens(),
            allocation_mode: AllocationMode::default(),
            overflow_strategy: OverflowStrategy::default(),
            layer_limits: BTreeMap::new(),
        }
    }
}

impl AllocatorConfig {
    pub fn new(max_tokens: usize, buffer_tokens: usize) -> Self {
        Self {
            max_tokens,
            buffer_tokens,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: AllocationMode) -> Self {
        self.allocation_mode = mode;
        self
    }

    pub fn with_strategy(mut self, strategy: OverflowStrategy) -> Self {
        self.overflow_strategy = strategy;
        self
    }

    pub fn with_layer_limit(mut self, layer: MemoryLayer, tokens: usize) -> Self {
        self.layer_limits.insert(layer.as_str().to_string(), tokens);
        self
    }

    /// Allocatable tokens: `max_tokens - buffer_tokens`.
    pub fn available(&self) -> usize {
        self.max_tokens.saturating_sub(self.buffer_tokens)
    }

    /// Parsed per-layer caps.
    pub fn layer_caps(&self) -> Result<BTreeMap<MemoryLayer, usize>, ConfigError> {
        self.layer_limits
            .iter()
            .map(|(name, tokens)| {
                name.parse::<MemoryLayer>()
                    .map(|layer| (layer, *tokens))
                    .map_err(|e| ConfigError::ValidationError(format!("allocator.layer_limits: {e}")))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "allocator.max_tokens must be > 0".into(),
            ));
        }

        if self.buffer_tokens >= self.max_tokens {
            return Err(ConfigError::ValidationError(format!(
                "allocator.buffer_tokens ({}) must be less than max_tokens ({})",
                self.buffer_tokens, self.max_tokens
            )));
        }

        if self.overflow_strategy.requires_dynamic()
            && self.allocation_mode != AllocationMode::Dynamic
        {
            return Err(ConfigError::ValidationError(format!(
                "allocator.overflow_strategy '{}' requires allocation_mode = \"dynamic\"",
                self.overflow_strategy
            )));
        }

        let available = self.available();
        for (layer, cap) in self.layer_caps()? {
            if cap > available {
                return Err(ConfigError::ValidationError(format!(
                    "allocator.layer_limits.{layer} ({cap}) exceeds available tokens ({available})"
                )));
            }
        }

        Ok(())
    }
}

/// Defaults applied to every assembled prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Prompt token ceiling. `0` in the file means unbounded.
    #[serde(default = "default_prompt_tokens", with = "zero_is_unbounded")]
    pub max_tokens: Option<usize>,

    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: f64,

    #[serde(default = "default_true")]
    pub prioritize_recent: bool,
}

fn default_prompt_tokens() -> Option<usize> {
    Some(4096)
}
/// TOML has no null, so an unbounded prompt is written as `max_tokens = 0`.
mod zero_is_unbounded {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.unwrap_or(0) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
        let raw = usize::deserialize(deserializer)?;
        Ok((raw > 0).then_some(raw))
    }
}

fn default_summarization_threshold() -> f64 {
    0.8
}
fn default_true() -> bool {
    true
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_prompt_tokens(),
            summarization_threshold: default_summarization_threshold(),
            prioritize_recent: true,
        }
    }
}

impl AssemblyConfig {
    /// A [`ProcessingConfig`] for `agent` seeded with these defaults.
    pub fn processing_config(&self, agent: AgentRole) -> ProcessingConfig {
        let mut config = ProcessingConfig::for_agent(agent)
            .with_summarization_threshold(self.summarization_threshold)
            .prioritize_recent(self.prioritize_recent);
        config.max_tokens = self.max_tokens;
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == Some(0) {
            return Err(ConfigError::ValidationError(
                "assembly.max_tokens must be > 0 when set".into(),
            ));
        }
        let t = self.summarization_threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            return Err(ConfigError::ValidationError(
                "assembly.summarization_threshold must be within (0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `storyweave_context=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default path (~/.storyweave/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `STORYWEAVE_MAX_TOKENS`
    /// - `STORYWEAVE_BUFFER_TOKENS`
    /// - `STORYWEAVE_OVERFLOW_STRATEGY`
    /// - `STORYWEAVE_LOG`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::default_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment) and
    /// re-validate.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("STORYWEAVE_MAX_TOKENS") {
            self.allocator.max_tokens = parse_env("STORYWEAVE_MAX_TOKENS", &value)?;
        }
        if let Some(value) = lookup("STORYWEAVE_BUFFER_TOKENS") {
            self.allocator.buffer_tokens = parse_env("STORYWEAVE_BUFFER_TOKENS", &value)?;
        }
        if let Some(value) = lookup("STORYWEAVE_OVERFLOW_STRATEGY") {
            self.allocator.overflow_strategy = parse_env("STORYWEAVE_OVERFLOW_STRATEGY", &value)?;
        }
        if let Some(value) = lookup("STORYWEAVE_LOG") {
            self.logging.level = value;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".storyweave")
    }

    /// Default config file location: `~/.storyweave/config.toml`.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.allocator.validate()?;
        self.assembly.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.level must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        Self::default().to_toml().unwrap_or_default()
    }
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::EnvError {
        var,
        reason: e.to_string(),
    })
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid value in {var}: {reason}")]
    EnvError { var: &'static str, reason: String },

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
