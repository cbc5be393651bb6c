//! Node configuration, deserialized from `config.toml`.
//!
//! Every field has a default so that an empty file (or no file at all) yields
//! a node that announces itself to the public bootstrap peer.

use crate::error::{WaypointError, WaypointResult};
use crate::peer::{PeerId, PeerRecord};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Protocol identifier used for transport-level multiplexing.
pub const DEFAULT_PROTOCOL_ID: &str = "/fake-dht/v0";

/// Identity of the well-known bootstrap peer.
pub const DEFAULT_BOOTSTRAP_PEER_ID: &str = "5611C2D2-9C06-4376-972F-C538385D79D5";

/// Address of the well-known bootstrap peer.
pub const DEFAULT_BOOTSTRAP_ADDRESS: &str = "bootstrap.nimona.io:60800";

/// Default listen address for the TCP transport.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:60800";

/// Configuration of a single discovery node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's identity. Generated when absent.
    pub peer_id: PeerId,
    /// Address the TCP listener binds to.
    pub listen_addr: SocketAddr,
    /// Addresses advertised to other peers. Empty means "the bound address".
    pub advertised_addresses: Vec<String>,
    /// Protocol identifier for stream multiplexing.
    pub protocol_id: String,
    /// How long an unanswered lookup stays pending before it is expired.
    pub lookup_ttl_secs: u64,
    /// How often expired lookups are swept. 0 disables the sweeper.
    pub sweep_interval_secs: u64,
    /// How often `serve` re-announces to the bootstrap peer. 0 disables it.
    pub announce_interval_secs: u64,
    /// The bootstrap peer every lookup is relayed through.
    pub bootstrap: BootstrapConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peer_id: PeerId::random(),
            listen_addr: DEFAULT_LISTEN_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 60800))),
            advertised_addresses: Vec::new(),
            protocol_id: DEFAULT_PROTOCOL_ID.to_string(),
            lookup_ttl_secs: 300,
            sweep_interval_secs: 60,
            announce_interval_secs: 0,
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> WaypointResult<Self> {
        let config: NodeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> WaypointResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> WaypointResult<()> {
        if self.peer_id.is_empty() {
            return Err(WaypointError::Config("peer_id must not be empty".into()));
        }
        if self.bootstrap.peer_id.is_empty() {
            return Err(WaypointError::Config(
                "bootstrap.peer_id must not be empty".into(),
            ));
        }
        if self.protocol_id.is_empty() {
            return Err(WaypointError::Config("protocol_id must not be empty".into()));
        }
        if self.lookup_ttl_secs == 0 {
            return Err(WaypointError::Config(
                "lookup_ttl_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn lookup_ttl(&self) -> Duration {
        Duration::from_secs(self.lookup_ttl_secs)
    }

    /// `None` when the sweeper is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// `None` when periodic re-announcing is disabled.
    pub fn announce_interval(&self) -> Option<Duration> {
        (self.announce_interval_secs > 0).then(|| Duration::from_secs(self.announce_interval_secs))
    }

    /// Whether this node is itself the bootstrap peer.
    pub fn is_bootstrap(&self) -> bool {
        self.peer_id == self.bootstrap.peer_id
    }

    /// Build the local peer record, falling back to the bound address when no
    /// advertised addresses are configured.
    pub fn local_record(&self, bound: SocketAddr) -> PeerRecord {
        let addresses = if self.advertised_addresses.is_empty() {
            vec![bound.to_string()]
        } else {
            self.advertised_addresses.clone()
        };
        PeerRecord::new(self.peer_id.clone(), addresses)
    }
}

/// The fixed bootstrap peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub peer_id: PeerId,
    pub addresses: Vec<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            peer_id: PeerId::from(DEFAULT_BOOTSTRAP_PEER_ID),
            addresses: vec![DEFAULT_BOOTSTRAP_ADDRESS.to_string()],
        }
    }
}

impl BootstrapConfig {
    pub fn record(&self) -> PeerRecord {
        PeerRecord::new(self.peer_id.clone(), self.addresses.clone())
    }
}
