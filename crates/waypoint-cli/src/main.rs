//! Waypoint CLI: run a discovery node or resolve peers through the bootstrap.

mod cli;
mod cmd;
mod config;

use clap::Parser;
use cli::{Cli, Commands};

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    match cli.command {
        Commands::Serve { listen } => cmd::node::cmd_serve(cli.config, listen),
        Commands::Find {
            peer_id,
            timeout_secs,
            listen,
        } => cmd::node::cmd_find(cli.config, peer_id, timeout_secs, listen),
        Commands::Config => cmd::config::cmd_config_show(cli.config),
    }
}
