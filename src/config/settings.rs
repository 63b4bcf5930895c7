use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{NodeError, Result};

/// Default port every CeroCoin node listens on.
pub const DEFAULT_PORT: u16 = 6404;

/// Node configuration, loaded from a TOML file with CLI overrides
/// applied on top. Passed explicitly to the components that need it;
/// there is no global configuration state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Peer addresses to dial at startup (`host:port`, or bare host for
    /// the default port).
    pub peers: Vec<String>,
    /// Port to listen on.
    pub port: u16,
    /// RSA modulus width for the node's key pair.
    pub modulus_bits: u64,
    /// Difficulty in force until a first block is accepted.
    pub starting_pow_difficulty: u32,
    /// How many generated transactions trigger block assembly.
    pub transactions_per_block: usize,
    /// Debug-harness bound on mining iterations; exceeding it aborts
    /// the node.
    pub max_mining_iterations: Option<u64>,
    /// Bound on peer reply reads during negotiation and broadcast.
    pub peer_read_timeout_secs: u64,
    /// Bound on dialing a peer.
    pub peer_connect_timeout_secs: u64,
    /// Where the key-pair files are written.
    pub key_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            peers: Vec::new(),
            port: DEFAULT_PORT,
            modulus_bits: 512,
            starting_pow_difficulty: 251,
            transactions_per_block: 3,
            max_mining_iterations: None,
            peer_read_timeout_secs: 30,
            peer_connect_timeout_secs: 3,
            key_dir: PathBuf::from("."),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<NodeConfig> {
        let text = fs::read_to_string(path).map_err(|e| {
            NodeError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config: NodeConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.modulus_bits % 2 != 0 || self.modulus_bits < 64 {
            return Err(NodeError::Config(format!(
                "modulus_bits must be an even number of at least 64, got {}",
                self.modulus_bits
            )));
        }
        if self.starting_pow_difficulty > 256 {
            return Err(NodeError::Config(format!(
                "starting_pow_difficulty must be at most 256, got {}",
                self.starting_pow_difficulty
            )));
        }
        if self.transactions_per_block == 0 {
            return Err(NodeError::Config(
                "transactions_per_block must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_read_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_connect_timeout_secs)
    }
}
