use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::NodeConfig;
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(name = "cerocoin")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "run", about = "Start a CeroCoin node")]
    Run {
        #[arg(long, help = "TOML configuration file")]
        config: Option<PathBuf>,
        #[arg(long = "peer", help = "Peer address (host or host:port); repeatable")]
        peers: Vec<String>,
        #[arg(long, help = "Port to listen on")]
        port: Option<u16>,
        #[arg(long, help = "Starting proof-of-work difficulty")]
        difficulty: Option<u32>,
        #[arg(
            long = "block-size",
            help = "Number of transactions packed into each block"
        )]
        transactions_per_block: Option<usize>,
        #[arg(long, help = "RSA modulus width in bits")]
        modulus_bits: Option<u64>,
        #[arg(
            long,
            help = "Abort after this many mining iterations (debug harness)"
        )]
        max_iterations: Option<u64>,
    },
    #[command(name = "keygen", about = "Generate a key pair and write it to disk")]
    Keygen {
        #[arg(long, default_value_t = 512, help = "RSA modulus width in bits")]
        modulus_bits: u64,
        #[arg(long, default_value = ".", help = "Directory for the key files")]
        out_dir: PathBuf,
    },
}

impl Command {
    /// Resolve the effective node configuration for a `run` command:
    /// the config file (or defaults) with CLI flags layered on top.
    pub fn node_config(&self) -> Result<Option<NodeConfig>> {
        let Command::Run {
            config,
            peers,
            port,
            difficulty,
            transactions_per_block,
            modulus_bits,
            max_iterations,
        } = self
        else {
            return Ok(None);
        };
        let mut resolved = match config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };
        if !peers.is_empty() {
            resolved.peers = peers.clone();
        }
        if let Some(port) = port {
            resolved.port = *port;
        }
        if let Some(difficulty) = difficulty {
            resolved.starting_pow_difficulty = *difficulty;
        }
        if let Some(batch) = transactions_per_block {
            resolved.transactions_per_block = *batch;
        }
        if let Some(bits) = modulus_bits {
            resolved.modulus_bits = *bits;
        }
        if let Some(cap) = max_iterations {
            resolved.max_mining_iterations = Some(*cap);
        }
        resolved.validate()?;
        Ok(Some(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags_override_defaults() {
        let opt = Opt::parse_from([
            "cerocoin",
            "run",
            "--peer",
            "192.168.43.12",
            "--peer",
            "192.168.43.181:2001",
            "--difficulty",
            "252",
            "--block-size",
            "4",
        ]);
        let config = opt.command.node_config().unwrap().unwrap();
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.starting_pow_difficulty, 252);
        assert_eq!(config.transactions_per_block, 4);
        // Untouched settings keep their defaults
        assert_eq!(config.modulus_bits, 512);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let opt = Opt::parse_from(["cerocoin", "run", "--difficulty", "300"]);
        assert!(opt.command.node_config().is_err());
    }

    #[test]
    fn test_keygen_has_no_node_config() {
        let opt = Opt::parse_from(["cerocoin", "keygen", "--modulus-bits", "256"]);
        assert!(opt.command.node_config().unwrap().is_none());
    }
}
