//! Logging utilities

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system, defaulting to info-level output
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
