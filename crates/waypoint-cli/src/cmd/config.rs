//! `waypoint config`: show the effective configuration.

use crate::config::load_config;
use std::path::PathBuf;

pub fn cmd_config_show(config: Option<PathBuf>) {
    let cfg = load_config(config.as_deref());
    match cfg.to_toml() {
        Ok(text) => print!("{text}"),
        Err(e) => {
            eprintln!("Failed to render config: {e}");
            std::process::exit(1);
        }
    }
}
