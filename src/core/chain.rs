use crate::core::block::Block;
use log::info;

/// Outcome of the fork-choice rule for a candidate block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Adopt,
    Reject,
}

/// The node's view of the chain: the current accepted block, the chain
/// length it represents, and the proof-of-work difficulty in force.
///
/// Mutated only under the phase coordinator's exclusive access. Each
/// adoption replaces all three fields together and bumps a revision
/// counter so the miner can tell whether the chain moved under a search
/// it had in flight.
#[derive(Debug, Clone)]
pub struct ChainState {
    current_block: Option<Block>,
    blockchain_length: u64,
    pow_difficulty: u32,
    revision: u64,
}

impl ChainState {
    pub fn new(starting_pow_difficulty: u32) -> ChainState {
        ChainState {
            current_block: None,
            blockchain_length: 0,
            pow_difficulty: starting_pow_difficulty,
            revision: 0,
        }
    }

    pub fn current_block(&self) -> Option<&Block> {
        self.current_block.as_ref()
    }

    pub fn blockchain_length(&self) -> u64 {
        self.blockchain_length
    }

    pub fn pow_difficulty(&self) -> u32 {
        self.pow_difficulty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Genesis source for the next mining search: the digest of the
    /// current block, or nothing when the chain is empty (the miner then
    /// draws fresh randomness).
    pub fn genesis_source(&self) -> Option<String> {
        self.current_block.as_ref().map(Block::genesis_digest)
    }

    /// The fork-choice rule, as a pure function of the two chain summaries.
    ///
    /// An empty chain adopts anything. Otherwise the candidate must be
    /// strictly longer AND carry an equal-or-lower difficulty bound
    /// (equal-or-harder work). A tie on length rejects.
    pub fn evaluate(&self, candidate: &Block) -> Decision {
        if self.current_block.is_none() {
            return Decision::Adopt;
        }
        if candidate.blockchain_length() > self.blockchain_length
            && candidate.pow_difficulty() <= self.pow_difficulty
        {
            Decision::Adopt
        } else {
            Decision::Reject
        }
    }

    /// Replace the chain state with an accepted block. The caller must
    /// hold exclusive access and must already have stopped the miner.
    pub fn adopt(&mut self, block: Block) {
        info!(
            "adopting block {}: length {} -> {}, difficulty {} -> {}",
            block.id(),
            self.blockchain_length,
            block.blockchain_length(),
            self.pow_difficulty,
            block.pow_difficulty()
        );
        self.blockchain_length = block.blockchain_length();
        self.pow_difficulty = block.pow_difficulty();
        self.current_block = Some(block);
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::test_utils::{signed_block, test_keys};

    fn state_at(length: u64, difficulty: u32) -> ChainState {
        let keys = test_keys();
        let mut state = ChainState::new(difficulty);
        state.adopt(signed_block(&keys, 1, difficulty, length));
        state
    }

    #[test]
    fn test_empty_chain_adopts_unconditionally() {
        let keys = test_keys();
        let state = ChainState::new(251);
        let candidate = signed_block(&keys, 1, 255, 1);
        assert_eq!(state.evaluate(&candidate), Decision::Adopt);
    }

    #[test]
    fn test_longer_chain_with_equal_difficulty_adopts() {
        let keys = test_keys();
        let state = state_at(8, 251);
        let candidate = signed_block(&keys, 1, 251, 12);
        assert_eq!(state.evaluate(&candidate), Decision::Adopt);
    }

    #[test]
    fn test_longer_chain_with_easier_difficulty_rejects() {
        // Candidate difficulty 252 > current 251 means an easier target
        let keys = test_keys();
        let state = state_at(8, 251);
        let candidate = signed_block(&keys, 1, 252, 12);
        assert_eq!(state.evaluate(&candidate), Decision::Reject);
    }

    #[test]
    fn test_longer_chain_with_harder_difficulty_adopts() {
        let keys = test_keys();
        let state = state_at(8, 251);
        let candidate = signed_block(&keys, 1, 240, 12);
        assert_eq!(state.evaluate(&candidate), Decision::Adopt);
    }

    #[test]
    fn test_equal_length_rejects() {
        let keys = test_keys();
        let state = state_at(8, 251);
        let candidate = signed_block(&keys, 1, 251, 8);
        assert_eq!(state.evaluate(&candidate), Decision::Reject);
    }

    #[test]
    fn test_shorter_chain_rejects() {
        let keys = test_keys();
        let state = state_at(8, 251);
        let candidate = signed_block(&keys, 1, 240, 5);
        assert_eq!(state.evaluate(&candidate), Decision::Reject);
    }

    #[test]
    fn test_adopt_replaces_all_three_fields() {
        let keys = test_keys();
        let mut state = ChainState::new(251);
        assert_eq!(state.blockchain_length(), 0);
        assert!(state.genesis_source().is_none());
        let revision_before = state.revision();

        let block = signed_block(&keys, 1, 240, 5);
        state.adopt(block.clone());
        assert_eq!(state.blockchain_length(), 5);
        assert_eq!(state.pow_difficulty(), 240);
        assert_eq!(state.current_block(), Some(&block));
        assert_eq!(state.revision(), revision_before + 1);
        assert_eq!(state.genesis_source().unwrap(), block.genesis_digest());
    }
}
