//! Command implementations.

pub mod config;
pub mod node;

/// Build a multi-threaded runtime for one command, exiting on failure.
pub(crate) fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to start async runtime: {e}");
        std::process::exit(1);
    })
}
