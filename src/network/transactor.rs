use log::{info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::core::Transaction;
use crate::error::{NodeError, Result};
use crate::network::peers::PeerRegistry;
use crate::network::phase::{Phase, PhaseCoordinator};
use crate::utils::{current_timestamp, rand_bits_with_set_bits};
use crate::wallet::{KeyPair, PublicKey};

/// Literal request line a seller opens a negotiation with.
pub const BUYER_KEY_REQUEST: &str = "Send pub key for a new transaction";
/// Prefix of the buyer's reply.
pub const BUYER_KEY_PREFIX: &str = "BUYER_PUB_KEY=";

/// Pause after a completed negotiation.
const NEGOTIATION_PAUSE: Duration = Duration::from_secs(10);
/// Poll interval while there is nothing to sell or nobody to sell to.
const IDLE_PAUSE: Duration = Duration::from_secs(2);

/// The transaction worker: offers one owned coin at a time to a randomly
/// chosen peer.
///
/// Each negotiation runs `Idle -> AwaitingBuyerKey -> Signed -> Idle`.
/// Any I/O failure or malformed reply aborts only that negotiation; the
/// coin goes back into the owned collection for a later retry.
pub struct Transactor {
    coordinator: Arc<PhaseCoordinator>,
    keys: Arc<KeyPair>,
    peers: Arc<PeerRegistry>,
}

impl Transactor {
    pub fn new(
        coordinator: Arc<PhaseCoordinator>,
        keys: Arc<KeyPair>,
        peers: Arc<PeerRegistry>,
    ) -> Transactor {
        Transactor {
            coordinator,
            keys,
            peers,
        }
    }

    /// Thread body.
    pub fn run(&self) {
        loop {
            match self.negotiate_once() {
                Ok(true) => thread::sleep(NEGOTIATION_PAUSE),
                Ok(false) => thread::sleep(IDLE_PAUSE),
                Err(e) => {
                    warn!("transaction negotiation aborted: {e}");
                    thread::sleep(IDLE_PAUSE);
                }
            }
        }
    }

    /// Try to sell one coin. `Ok(false)` means there was nothing to do:
    /// no peer or no owned coin.
    pub fn negotiate_once(&self) -> Result<bool> {
        let Some(link) = self.peers.pick_random() else {
            return Ok(false);
        };
        let mut guard = self.coordinator.enter(Phase::Transacting);
        let Some(coin) = guard.owned_coins.pop() else {
            return Ok(false);
        };
        info!("looking for a client for making a transaction; outgoing coin {}", coin.id());

        let peer_addr = link
            .lock()
            .expect("peer link lock poisoned")
            .addr();
        let result = (|| -> Result<Transaction> {
            let mut link = link.lock().expect("peer link lock poisoned");
            link.send_line(BUYER_KEY_REQUEST)?;
            let reply = link.recv_line()?;
            let buyer_field = reply.strip_prefix(BUYER_KEY_PREFIX).ok_or_else(|| {
                NodeError::Wire(format!("expected a buyer key, got: {reply}"))
            })?;
            let buyer_pub_key = PublicKey::parse(buyer_field)?;
            info!("buyer pub key: {buyer_field}");

            let mut tranx = Transaction::new(
                rand_bits_with_set_bits(32),
                coin.clone(),
                self.keys.node_id(),
                self.keys.public(),
                buyer_pub_key,
                current_timestamp()?,
            );
            tranx.sign(&self.keys);
            link.send_line(&tranx.encode())?;
            Ok(tranx)
        })();

        match result {
            Ok(tranx) => {
                info!(
                    "transaction {} sent to {peer_addr}; generated queue now holds {}",
                    tranx.id(),
                    guard.pending_transactions.len() + 1
                );
                guard.pending_transactions.push(tranx);
                Ok(true)
            }
            Err(e) => {
                // The coin stays owned and is retried later
                guard.owned_coins.push(coin);
                if matches!(e, NodeError::Network(_)) {
                    self.peers.evict(peer_addr);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::peers::PeerLink;
    use crate::network::phase::Ledger;
    use crate::testnet::test_utils::{mined_coin, other_keys, test_keys};
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn transactor_with_coin() -> (Transactor, std::net::SocketAddr) {
        let coordinator = Arc::new(PhaseCoordinator::new(Ledger::new(251)));
        let keys = Arc::new(test_keys());
        coordinator
            .enter(Phase::Mining)
            .owned_coins
            .push(mined_coin(&keys, 256));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peers = Arc::new(PeerRegistry::new());
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        peers.add(
            PeerLink::connect(addr, Duration::from_secs(3), Duration::from_secs(3)).unwrap(),
        );
        let buyer_side = accept.join().unwrap();

        // A minimal buyer: answer the key request, swallow the transaction
        thread::spawn(move || {
            let buyer = other_keys();
            let mut reader = BufReader::new(buyer_side.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line.trim_end(), BUYER_KEY_REQUEST);
            let mut writer = buyer_side;
            writeln!(writer, "{BUYER_KEY_PREFIX}{}", buyer.public().wire_field()).unwrap();
            let mut tranx_line = String::new();
            reader.read_line(&mut tranx_line).unwrap();
            tranx_line
        });

        (Transactor::new(coordinator, keys, peers), addr)
    }

    #[test]
    fn test_successful_negotiation_queues_transaction() {
        let (transactor, _addr) = transactor_with_coin();
        assert!(transactor.negotiate_once().unwrap());
        let guard = transactor.coordinator.enter(Phase::Validating);
        assert!(guard.owned_coins.is_empty());
        assert_eq!(guard.pending_transactions.len(), 1);
        let tranx = &guard.pending_transactions[0];
        tranx.verify().unwrap();
        assert_eq!(tranx.buyer_pub_key(), &other_keys().public());
    }

    #[test]
    fn test_no_peer_means_nothing_to_do() {
        let coordinator = Arc::new(PhaseCoordinator::new(Ledger::new(251)));
        let keys = Arc::new(test_keys());
        coordinator
            .enter(Phase::Mining)
            .owned_coins
            .push(mined_coin(&keys, 256));
        let transactor = Transactor::new(coordinator, keys, Arc::new(PeerRegistry::new()));
        assert!(!transactor.negotiate_once().unwrap());
        assert_eq!(
            transactor
                .coordinator
                .enter(Phase::Validating)
                .owned_coins
                .len(),
            1
        );
    }

    #[test]
    fn test_failed_negotiation_returns_coin_and_evicts_peer() {
        let coordinator = Arc::new(PhaseCoordinator::new(Ledger::new(251)));
        let keys = Arc::new(test_keys());
        coordinator
            .enter(Phase::Mining)
            .owned_coins
            .push(mined_coin(&keys, 256));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let peers = Arc::new(PeerRegistry::new());
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        peers.add(
            PeerLink::connect(addr, Duration::from_secs(3), Duration::from_millis(200)).unwrap(),
        );
        // Peer hangs up instead of answering
        drop(accept.join().unwrap());

        let transactor = Transactor::new(coordinator, keys, peers);
        assert!(transactor.negotiate_once().is_err());
        let guard = transactor.coordinator.enter(Phase::Validating);
        assert_eq!(guard.owned_coins.len(), 1);
        assert!(guard.pending_transactions.is_empty());
        assert!(transactor.peers.is_empty());
    }
}
