use log::{error, info, warn};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::{NodeConfig, DEFAULT_PORT};
use crate::core::CancelToken;
use crate::error::{NodeError, Result};
use crate::network::assembler::BlockAssembler;
use crate::network::miner::Miner;
use crate::network::peers::{PeerLink, PeerRegistry};
use crate::network::phase::{Ledger, PhaseCoordinator};
use crate::network::server::Server;
use crate::network::transactor::Transactor;
use crate::wallet::KeyPair;

const NETWORK_SCAN_ROUNDS: u32 = 3;
const NETWORK_SCAN_PAUSE: Duration = Duration::from_secs(5);

/// A CeroCoin node: one key pair, one ledger, and the worker threads
/// that mine, trade, assemble and validate.
pub struct Node {
    config: NodeConfig,
    keys: Arc<KeyPair>,
    coordinator: Arc<PhaseCoordinator>,
    peers: Arc<PeerRegistry>,
    miner_token: CancelToken,
}

impl Node {
    /// Generate the node's identity and set up the (still empty) ledger.
    pub fn new(config: NodeConfig) -> Result<Node> {
        config.validate()?;
        info!("generating a {}-bit key pair", config.modulus_bits);
        let keys = KeyPair::generate(config.modulus_bits)?;
        let (pub_path, priv_path) = keys.write_to_files(&config.key_dir)?;
        info!(
            "node id {}; key pair written to {} and {}",
            keys.node_id(),
            pub_path.display(),
            priv_path.display()
        );
        let coordinator = Arc::new(PhaseCoordinator::new(Ledger::new(
            config.starting_pow_difficulty,
        )));
        Ok(Node {
            config,
            keys: Arc::new(keys),
            coordinator,
            peers: Arc::new(PeerRegistry::new()),
            miner_token: CancelToken::new(),
        })
    }

    /// Start listening, dial the configured peers, spawn the workers, and
    /// supervise the miner. Returns only on a fatal error.
    pub fn run(self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).map_err(|e| {
            NodeError::Network(format!("failed to bind to port {}: {e}", self.config.port))
        })?;

        let server = Server::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.keys),
            self.miner_token.clone(),
        );
        thread::spawn(move || {
            if let Err(e) = server.run(listener) {
                error!("server terminated: {e}");
            }
        });

        self.connect_to_network()?;

        let transactor = Transactor::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.keys),
            Arc::clone(&self.peers),
        );
        thread::spawn(move || transactor.run());

        let assembler = BlockAssembler::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.keys),
            Arc::clone(&self.peers),
            self.miner_token.clone(),
            self.config.transactions_per_block,
        );
        thread::spawn(move || assembler.run());

        // The miner is supervised: its fatal errors take the node down
        let miner = Miner::new(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.keys),
            self.miner_token.clone(),
            self.config.max_mining_iterations,
        );
        let handle = thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || miner.run())?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(NodeError::Mining("miner thread panicked".to_string())),
        }
    }

    /// Dial the configured peers, retrying a few times before giving up.
    /// With no peers configured the node runs solo and only mines.
    fn connect_to_network(&self) -> Result<()> {
        if self.config.peers.is_empty() {
            warn!("no peers configured; running solo, coins will only accumulate");
            return Ok(());
        }
        for round in 1..=NETWORK_SCAN_ROUNDS {
            for entry in &self.config.peers {
                let addr = match resolve_peer(entry) {
                    Ok(addr) => addr,
                    Err(e) => {
                        warn!("skipping peer {entry}: {e}");
                        continue;
                    }
                };
                if self.peers.contains(addr) {
                    continue;
                }
                match PeerLink::connect(
                    addr,
                    self.config.connect_timeout(),
                    self.config.read_timeout(),
                ) {
                    Ok(link) => {
                        info!("made connection with host {addr}");
                        self.peers.add(link);
                    }
                    Err(e) => {
                        info!("no connection possible with {addr}: {e}");
                    }
                }
            }
            if self.peers.len() == 1 {
                warn!("only one other node found; only the simplest of demos possible");
                return Ok(());
            }
            if !self.peers.is_empty() {
                return Ok(());
            }
            warn!(
                "no CeroCoin peers found; will sleep and try again \
                 (round {round} of {NETWORK_SCAN_ROUNDS})"
            );
            thread::sleep(NETWORK_SCAN_PAUSE);
        }
        Err(NodeError::Network(
            "unable to establish a network with the configured peers".to_string(),
        ))
    }
}

/// `host:port`, or a bare host that gets the default port.
fn resolve_peer(entry: &str) -> Result<SocketAddr> {
    let resolved = if entry.contains(':') {
        entry.to_socket_addrs()
    } else {
        (entry, DEFAULT_PORT).to_socket_addrs()
    };
    resolved
        .map_err(|e| NodeError::Network(format!("cannot resolve {entry}: {e}")))?
        .next()
        .ok_or_else(|| NodeError::Network(format!("{entry} resolves to no address")))
}
