use log::{error, info, warn};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crate::core::block::BLOCK_BEGIN;
use crate::core::transaction::TRANSACTION_BEGIN;
use crate::core::{Block, CancelToken, Decision, Transaction};
use crate::error::Result;
use crate::network::assembler::{BLOCK_ACK, BLOCK_ANNOUNCE};
use crate::network::peers::PeerLink;
use crate::network::phase::{Phase, PhaseCoordinator};
use crate::network::transactor::BUYER_KEY_REQUEST;
use crate::wallet::KeyPair;

/// Inbound side of the node: accepts peer connections and serves the
/// line protocol on each.
///
/// Handlers answer buyer-key requests from the node's immutable key pair
/// without touching the ledger; transaction and block ingestion run under
/// the Validating phase. A record that fails parsing or validation is
/// discarded and the connection carries on.
pub struct Server {
    coordinator: Arc<PhaseCoordinator>,
    keys: Arc<KeyPair>,
    miner_token: CancelToken,
}

impl Server {
    pub fn new(
        coordinator: Arc<PhaseCoordinator>,
        keys: Arc<KeyPair>,
        miner_token: CancelToken,
    ) -> Server {
        Server {
            coordinator,
            keys,
            miner_token,
        }
    }

    /// Accept loop. Each connection gets its own handler thread.
    pub fn run(&self, listener: TcpListener) -> Result<()> {
        info!("server listening on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("failed to get peer address: {e}");
                            continue;
                        }
                    };
                    info!("connection request from {peer_addr}");
                    let coordinator = Arc::clone(&self.coordinator);
                    let keys = Arc::clone(&self.keys);
                    let miner_token = self.miner_token.clone();
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(
                            &coordinator,
                            &keys,
                            &miner_token,
                            stream,
                            peer_addr,
                        ) {
                            error!("error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("error accepting connection: {e}");
                }
            }
        }
        Ok(())
    }

    /// Serve one peer until it disconnects.
    fn handle_connection(
        coordinator: &PhaseCoordinator,
        keys: &KeyPair,
        miner_token: &CancelToken,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<()> {
        let mut link = PeerLink::from_stream(stream, peer_addr)?;
        loop {
            let line = match link.recv_line() {
                Ok(line) => line,
                Err(_) => {
                    info!("peer {peer_addr} disconnected");
                    return Ok(());
                }
            };
            if line == BUYER_KEY_REQUEST {
                link.send_line(&format!("BUYER_PUB_KEY={}", keys.public().wire_field()))?;
            } else if line.starts_with(TRANSACTION_BEGIN) {
                Self::handle_transaction(coordinator, &line, peer_addr);
            } else if line == BLOCK_ANNOUNCE {
                link.send_line(BLOCK_ACK)?;
            } else if line.starts_with(BLOCK_BEGIN) {
                Self::handle_block(coordinator, miner_token, &line, peer_addr);
            } else {
                warn!("unexpected line from {peer_addr}: {line}");
            }
        }
    }

    /// Validate an inbound transaction and record it together with its
    /// coin. Rejection has no side effects.
    fn handle_transaction(coordinator: &PhaseCoordinator, line: &str, peer_addr: SocketAddr) {
        let tranx = match Transaction::decode(line).and_then(|t| t.verify().map(|_| t)) {
            Ok(tranx) => tranx,
            Err(e) => {
                warn!("discarding invalid transaction from {peer_addr}: {e}");
                return;
            }
        };
        let mut guard = coordinator.enter(Phase::Validating);
        info!(
            "transaction {} from {peer_addr} validated; acquiring coin {}",
            tranx.id(),
            tranx.coin().id()
        );
        guard.acquired_coins.push(tranx.coin().clone());
        guard.received_transactions.push(tranx);
        info!(
            "number of transactions received: {}",
            guard.received_transactions.len()
        );
    }

    /// Validate an inbound block and run it through the fork-choice
    /// rule. Adoption stops the miner first, replaces the chain state,
    /// and lets the miner restart against the new block.
    fn handle_block(
        coordinator: &PhaseCoordinator,
        miner_token: &CancelToken,
        line: &str,
        peer_addr: SocketAddr,
    ) {
        let block = match Block::decode(line).and_then(|b| b.verify().map(|_| b)) {
            Ok(block) => block,
            Err(e) => {
                warn!("an illegal block received from {peer_addr}; ignoring it: {e}");
                return;
            }
        };
        let mut guard = coordinator.enter(Phase::Validating);
        info!(
            "received block {} validated: candidate length {} difficulty {}, \
             local length {} difficulty {}",
            block.id(),
            block.blockchain_length(),
            block.pow_difficulty(),
            guard.chain.blockchain_length(),
            guard.chain.pow_difficulty()
        );
        match guard.chain.evaluate(&block) {
            Decision::Adopt => {
                info!("will ask the current miner thread to stop");
                miner_token.cancel_and_wait();
                guard.chain.adopt(block);
                info!(
                    "miner will restart with pow difficulty {} and blockchain length {}",
                    guard.chain.pow_difficulty(),
                    guard.chain.blockchain_length()
                );
            }
            Decision::Reject => {
                info!("no reason to abandon the current chain");
            }
        }
    }
}
