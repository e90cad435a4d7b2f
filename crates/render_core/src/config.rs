//! Renderer configuration
//!
//! The validation toggle is decided once at startup, either from process
//! launch arguments or from a TOML file, and stays fixed for the lifetime of
//! the Vulkan context.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default staging buffer size (16 MiB)
pub const DEFAULT_STAGING_SIZE: u64 = 16 * 1024 * 1024;

/// Launch arguments that enable validation layers
const VALIDATION_ARGS: [&str; 2] = ["-vkdebug", "-gldebug"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Renderer bring-up configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub app_name: String,
    /// Engine name reported to the driver
    pub engine_name: String,
    /// Enable validation layers and the debug messenger
    pub validation: bool,
    /// Staging buffer size in bytes
    pub staging_size: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            engine_name: "render_core".to_owned(),
            validation: false,
            staging_size: DEFAULT_STAGING_SIZE,
        }
    }
}

impl RendererConfig {
    /// Build a configuration from process launch arguments.
    ///
    /// Validation is enabled when any recognized debug flag is present.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let validation = args
            .into_iter()
            .any(|arg| VALIDATION_ARGS.contains(&arg.as_ref()));
        Self {
            validation,
            ..Self::default()
        }
    }

    /// Load a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_off_by_default() {
        let config = RendererConfig::from_args(["game", "-windowed"]);
        assert!(!config.validation);
        assert_eq!(config.staging_size, DEFAULT_STAGING_SIZE);
    }

    #[test]
    fn debug_args_enable_validation() {
        assert!(RendererConfig::from_args(["game", "-vkdebug"]).validation);
        assert!(RendererConfig::from_args(["-gldebug"]).validation);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: RendererConfig =
            toml::from_str("app_name = \"demo\"\nvalidation = true\n").unwrap();
        assert_eq!(config.app_name, "demo");
        assert!(config.validation);
        assert_eq!(config.staging_size, DEFAULT_STAGING_SIZE);
    }
}
