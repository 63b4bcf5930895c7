use log::{info, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::core::{Block, CancelToken};
use crate::error::{NodeError, Result};
use crate::network::peers::PeerRegistry;
use crate::network::phase::{Phase, PhaseCoordinator};
use crate::utils::{current_timestamp, rand_bits_with_set_bits};
use crate::wallet::KeyPair;

/// Announcement line preceding a block payload.
pub const BLOCK_ANNOUNCE: &str = "Sending new block";
/// The receiver's go-ahead.
pub const BLOCK_ACK: &str = "OK to new block";

/// Pause after a block has been assembled and broadcast.
const ASSEMBLY_PAUSE: Duration = Duration::from_secs(10);
/// Poll interval while the pending queue is below the batch size.
const IDLE_PAUSE: Duration = Duration::from_secs(2);

/// The block-assembly worker: once enough transactions have accumulated,
/// packs them into a signed block, adopts it locally and broadcasts it.
pub struct BlockAssembler {
    coordinator: Arc<PhaseCoordinator>,
    keys: Arc<KeyPair>,
    peers: Arc<PeerRegistry>,
    miner_token: CancelToken,
    batch_size: usize,
}

impl BlockAssembler {
    pub fn new(
        coordinator: Arc<PhaseCoordinator>,
        keys: Arc<KeyPair>,
        peers: Arc<PeerRegistry>,
        miner_token: CancelToken,
        batch_size: usize,
    ) -> BlockAssembler {
        BlockAssembler {
            coordinator,
            keys,
            peers,
            miner_token,
            batch_size,
        }
    }

    /// Thread body.
    pub fn run(&self) {
        loop {
            match self.assemble_and_broadcast() {
                Ok(Some(_)) => thread::sleep(ASSEMBLY_PAUSE),
                Ok(None) => thread::sleep(IDLE_PAUSE),
                Err(e) => {
                    warn!("block assembly failed: {e}");
                    thread::sleep(IDLE_PAUSE);
                }
            }
        }
    }

    /// Pack the accumulated transactions into a new block if the batch
    /// size has been reached; `Ok(None)` otherwise.
    ///
    /// The new block replaces the chain state as a local adoption: the
    /// fork-choice comparison is bypassed (the block is authored here),
    /// but the miner is still stopped first and restarted after, so the
    /// next search derives its genesis string from this block.
    pub fn assemble_and_broadcast(&self) -> Result<Option<Block>> {
        let block = {
            let mut guard = self.coordinator.enter(Phase::BlockAssembling);
            if guard.pending_transactions.len() < self.batch_size {
                return Ok(None);
            }
            info!("packing the accumulated transactions into a new block");
            let transactions: Vec<_> = guard.pending_transactions.drain(..).collect();
            let (prev_block_hash, pow_difficulty, blockchain_length) =
                match guard.chain.current_block() {
                    None => (
                        rand_bits_with_set_bits(256),
                        guard.chain.pow_difficulty(),
                        transactions.len() as u64,
                    ),
                    Some(prev) => (
                        prev.genesis_digest(),
                        transactions
                            .iter()
                            .map(|t| t.pow_difficulty())
                            .min()
                            .unwrap_or(guard.chain.pow_difficulty()),
                        guard.chain.blockchain_length() + transactions.len() as u64,
                    ),
                };
            let mut block = Block::new(
                rand_bits_with_set_bits(32),
                self.keys.node_id(),
                transactions,
                pow_difficulty,
                prev_block_hash,
                blockchain_length,
                current_timestamp()?,
            );
            block.sign(&self.keys);
            self.miner_token.cancel_and_wait();
            guard.chain.adopt(block.clone());
            block
        };

        info!("will broadcast the signed block {}", block.id());
        self.broadcast(&block);
        Ok(Some(block))
    }

    /// Send the block to every peer, awaiting each one's acknowledgement
    /// before the payload. A failing peer is logged and evicted; the
    /// broadcast carries on with the rest.
    fn broadcast(&self, block: &Block) {
        let line = block.encode();
        for link in self.peers.all() {
            let mut link = link.lock().expect("peer link lock poisoned");
            let peer_addr = link.addr();
            let upload = link
                .send_line(BLOCK_ANNOUNCE)
                .and_then(|_| link.recv_line())
                .and_then(|reply| {
                    if reply == BLOCK_ACK {
                        link.send_line(&line)
                    } else {
                        Err(NodeError::Wire(format!(
                            "expected block acknowledgement, got: {reply}"
                        )))
                    }
                });
            if let Err(e) = upload {
                warn!("block upload to {peer_addr} failed: {e}");
                drop(link);
                self.peers.evict(peer_addr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::phase::Ledger;
    use crate::testnet::test_utils::{signed_block, signed_transaction, test_keys};

    fn assembler(batch_size: usize, difficulty: u32) -> BlockAssembler {
        BlockAssembler::new(
            Arc::new(PhaseCoordinator::new(Ledger::new(difficulty))),
            Arc::new(test_keys()),
            Arc::new(PeerRegistry::new()),
            CancelToken::new(),
            batch_size,
        )
    }

    fn queue_transactions(assembler: &BlockAssembler, n: usize) {
        let mut guard = assembler.coordinator.enter(Phase::Transacting);
        for _ in 0..n {
            let tranx = signed_transaction(&assembler.keys);
            guard.pending_transactions.push(tranx);
        }
    }

    #[test]
    fn test_below_batch_size_does_nothing() {
        let assembler = assembler(3, 251);
        queue_transactions(&assembler, 2);
        assert!(assembler.assemble_and_broadcast().unwrap().is_none());
        assert_eq!(
            assembler
                .coordinator
                .enter(Phase::Validating)
                .pending_transactions
                .len(),
            2
        );
    }

    #[test]
    fn test_first_block_takes_node_difficulty_and_transaction_count() {
        let assembler = assembler(3, 251);
        queue_transactions(&assembler, 3);
        let block = assembler.assemble_and_broadcast().unwrap().unwrap();
        block.verify().unwrap();
        assert_eq!(block.blockchain_length(), 3);
        assert_eq!(block.pow_difficulty(), 251);
        assert_eq!(block.transactions().len(), 3);

        let guard = assembler.coordinator.enter(Phase::Validating);
        assert!(guard.pending_transactions.is_empty());
        assert_eq!(guard.chain.blockchain_length(), 3);
        assert_eq!(guard.chain.current_block(), Some(&block));
    }

    #[test]
    fn test_follow_up_block_extends_length_and_chains_hash() {
        let assembler = assembler(2, 256);
        // An accepted first block of length 5
        let first = signed_block(&assembler.keys, 1, 256, 5);
        assembler
            .coordinator
            .enter(Phase::Validating)
            .chain
            .adopt(first.clone());

        queue_transactions(&assembler, 2);
        let block = assembler.assemble_and_broadcast().unwrap().unwrap();
        assert_eq!(block.blockchain_length(), 7);
        assert_eq!(block.prev_block_hash(), first.genesis_digest());
        // Minimum difficulty among the included transactions' coins
        assert_eq!(block.pow_difficulty(), 256);
    }

    #[test]
    fn test_assembly_bumps_chain_revision() {
        let assembler = assembler(1, 251);
        queue_transactions(&assembler, 1);
        let before = assembler
            .coordinator
            .enter(Phase::Validating)
            .chain
            .revision();
        assembler.assemble_and_broadcast().unwrap().unwrap();
        let after = assembler
            .coordinator
            .enter(Phase::Validating)
            .chain
            .revision();
        assert_eq!(after, before + 1);
    }
}
