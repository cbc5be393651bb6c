//! Clap CLI definitions for Waypoint.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  waypoint serve                      Run a node and announce it to the bootstrap peer
  waypoint find 4F1C...               Resolve a peer id through the bootstrap peer
  waypoint config                     Print the effective configuration

\x1b[1;36mLogging:\x1b[0m
  RUST_LOG=debug waypoint serve       Show every message sent and received";

/// Waypoint: peer discovery through a bootstrap relay.
#[derive(Parser)]
#[command(name = "waypoint", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file (default: ~/.waypoint/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a discovery node until interrupted.
    Serve {
        /// Override the configured listen address.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Resolve a peer id through the bootstrap peer and print its record.
    Find {
        /// The peer id to look up.
        peer_id: String,
        /// Give up after this many seconds.
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
        /// Address the bootstrap replies to. Defaults to an ephemeral port on
        /// the configured listen host.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Print the effective configuration as TOML.
    Config,
}
