//! Shared error types for Waypoint.

use thiserror::Error;

/// Top-level error type for configuration and process setup.
#[derive(Error, Debug)]
pub enum WaypointError {
    /// A configuration value is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration could not be rendered.
    #[error("Config render error: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for Waypoint results.
pub type WaypointResult<T> = Result<T, WaypointError>;
