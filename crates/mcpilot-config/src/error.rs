//! Configuration error types.

use std::path::PathBuf;

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse JSON.
    #[error("failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: String,
        source: serde_json::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse TOML config '{path}': {source}")]
    ParseToml {
        path: String,
        source: toml::de::Error,
    },

    /// The file extension is neither `.json` nor `.toml`.
    #[error("unsupported config format for '{path}' (expected .json or .toml)")]
    UnsupportedFormat { path: String },

    /// No config file exists in any of the searched locations.
    #[error("no config file found (searched {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
