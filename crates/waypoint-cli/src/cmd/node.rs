//! `waypoint serve` and `waypoint find`: run a node over TCP.

use super::runtime;
use crate::config::load_config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use waypoint_types::config::NodeConfig;
use waypoint_wire::{
    DiscoveryNode, LookupError, MemoryPeerStore, NodeOptions, PeerId, PeerRecord, PeerStore,
    TcpTransport,
};

/// Bind the TCP transport and start a discovery node from `cfg`.
async fn boot_node(cfg: &NodeConfig) -> Result<Arc<DiscoveryNode>, String> {
    let store: Arc<dyn PeerStore> = Arc::new(MemoryPeerStore::new());
    let transport = TcpTransport::bind(cfg.listen_addr, Arc::clone(&store))
        .await
        .map_err(|e| format!("Failed to bind {}: {e}", cfg.listen_addr))?;

    let local = cfg.local_record(transport.local_addr());
    let mut options = NodeOptions::from_config(cfg, local.clone());
    if cfg.is_bootstrap() {
        // The bootstrap pins its own record, so it must carry the bound addresses.
        options.bootstrap = local;
    }
    Ok(DiscoveryNode::start(options, transport, store).await)
}

fn apply_listen_override(cfg: &mut NodeConfig, listen: Option<SocketAddr>) {
    if let Some(addr) = listen {
        cfg.listen_addr = addr;
    }
}

pub fn cmd_serve(config: Option<PathBuf>, listen: Option<SocketAddr>) {
    let mut cfg = load_config(config.as_deref());
    apply_listen_override(&mut cfg, listen);

    let rt = runtime();
    rt.block_on(async {
        let node = match boot_node(&cfg).await {
            Ok(node) => node,
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        };
        info!(
            peer = %node.local().id,
            addresses = ?node.local().addresses,
            bootstrap = node.is_bootstrap(),
            "Waypoint node running (Ctrl+C to stop)"
        );

        if let Some(interval) = cfg.announce_interval().filter(|_| !node.is_bootstrap()) {
            let announcer = Arc::clone(&node);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // The first tick fires immediately and start() already announced.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    announcer.announce().await;
                }
            });
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
        }
        info!("Shutting down");
    });
}

/// `find` binds an ephemeral port on the configured host unless `--listen`
/// says otherwise, so it can run next to `serve` on the same machine.
fn find_listen_addr(cfg: &NodeConfig, listen: Option<SocketAddr>) -> SocketAddr {
    listen.unwrap_or_else(|| SocketAddr::new(cfg.listen_addr.ip(), 0))
}

fn is_loopback_address(address: &str) -> bool {
    match address.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().is_loopback(),
        Err(_) => address
            .rsplit_once(':')
            .map_or(address, |(host, _)| host)
            .eq_ignore_ascii_case("localhost"),
    }
}

/// True when every local address is loopback but the bootstrap is not, so a
/// reply from the bootstrap cannot reach this node.
fn unreachable_from_bootstrap(local: &PeerRecord, bootstrap: &PeerRecord) -> bool {
    !local.addresses.is_empty()
        && local.addresses.iter().all(|a| is_loopback_address(a))
        && !bootstrap.addresses.iter().any(|a| is_loopback_address(a))
}

pub fn cmd_find(
    config: Option<PathBuf>,
    peer_id: String,
    timeout_secs: u64,
    listen: Option<SocketAddr>,
) {
    let mut cfg = load_config(config.as_deref());
    cfg.listen_addr = find_listen_addr(&cfg, listen);
    let timeout = Duration::from_secs(timeout_secs.max(1));

    let rt = runtime();
    let result = rt.block_on(async {
        let node = boot_node(&cfg).await?;
        if unreachable_from_bootstrap(node.local(), node.bootstrap()) {
            warn!(
                addresses = ?node.local().addresses,
                bootstrap = ?node.bootstrap().addresses,
                "Advertising only loopback addresses to a remote bootstrap; \
                 the reply cannot reach this node (set --listen or advertised_addresses)"
            );
        }
        node.find_peer(PeerId::new(peer_id.clone()))
            .await
            .wait_timeout(timeout)
            .await
            .map_err(|e| match e {
                LookupError::TimedOut(_) => {
                    format!("No answer for {peer_id} within {}s", timeout.as_secs())
                }
                LookupError::Abandoned => format!("Lookup for {peer_id} was abandoned"),
            })
    });

    match result {
        Ok(record) => println!(
            "{}",
            serde_json::to_string_pretty(&record).unwrap_or_default()
        ),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
