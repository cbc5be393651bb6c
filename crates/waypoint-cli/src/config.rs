//! Configuration loading from `~/.waypoint/config.toml` with defaults.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use waypoint_types::config::NodeConfig;

/// Load node configuration from a TOML file, falling back to defaults when
/// the file is missing or invalid.
pub fn load_config(path: Option<&Path>) -> NodeConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return NodeConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match NodeConfig::from_toml(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                NodeConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            NodeConfig::default()
        }
    }
}

/// Default config path: `~/.waypoint/config.toml`.
pub fn default_config_path() -> PathBuf {
    waypoint_home().join("config.toml")
}

/// Waypoint home directory, falling back to the current directory.
pub fn waypoint_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".waypoint"))
        .unwrap_or_else(|| PathBuf::from(".waypoint"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::config::DEFAULT_PROTOCOL_ID;

    #[test]
    fn test_load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "peer_id = \"cli-node\"\n[bootstrap]\npeer_id = \"b\"\naddresses = [\"127.0.0.1:1\"]\n",
        )
        .unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.peer_id.as_str(), "cli-node");
        assert_eq!(config.bootstrap.peer_id.as_str(), "b");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml")));
        assert_eq!(config.protocol_id, DEFAULT_PROTOCOL_ID);
    }

    #[test]
    fn test_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "lookup_ttl_secs = 0\n").unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.lookup_ttl_secs, NodeConfig::default().lookup_ttl_secs);
    }

    #[test]
    fn test_default_path_ends_in_config_toml() {
        assert!(default_config_path().ends_with(".waypoint/config.toml"));
    }
}
