use log::info;
use std::sync::Arc;

use crate::core::{search, CancelToken, Coin, SearchOutcome, SearchParams};
use crate::error::Result;
use crate::network::phase::{Phase, PhaseCoordinator};
use crate::utils::{current_timestamp, rand_bits_with_set_bits, rand_hex};
use crate::wallet::KeyPair;

/// The mining worker: reads the search parameters from the chain state,
/// runs the proof-of-work search, and installs signed coins into the
/// owned collection.
///
/// Difficulty is not a miner-owned parameter. It is re-read from the
/// chain at the start of every search, and the search-span marker is set
/// while the phase guard is still held, so a block adoption either
/// happens before the snapshot (and is seen) or interrupts the search.
pub struct Miner {
    coordinator: Arc<PhaseCoordinator>,
    keys: Arc<KeyPair>,
    token: CancelToken,
    max_iterations: Option<u64>,
}

impl Miner {
    pub fn new(
        coordinator: Arc<PhaseCoordinator>,
        keys: Arc<KeyPair>,
        token: CancelToken,
        max_iterations: Option<u64>,
    ) -> Miner {
        Miner {
            coordinator,
            keys,
            token,
            max_iterations,
        }
    }

    /// Thread body. Returns only on a fatal mining error (the debug-mode
    /// iteration cap).
    pub fn run(&self) -> Result<()> {
        loop {
            self.mine_one()?;
        }
    }

    /// One full search attempt: snapshot parameters, search, install the
    /// coin unless the chain moved or the search was preempted.
    pub fn mine_one(&self) -> Result<()> {
        let (params, revision) = {
            let guard = self.coordinator.enter(Phase::Mining);
            self.token.begin_search();
            let genesis_string = match guard.chain.genesis_source() {
                Some(digest) => {
                    info!("using the current block for forming the genesis string");
                    digest
                }
                None => {
                    info!("fresh mining with a random genesis string");
                    rand_hex(32)
                }
            };
            let params = SearchParams {
                genesis_string,
                difficulty: guard.chain.pow_difficulty(),
                max_iterations: self.max_iterations,
            };
            (params, guard.chain.revision())
        };

        match search(&params, &self.token)? {
            SearchOutcome::Cancelled => {
                info!("mining search interrupted; restarting with fresh chain parameters");
                Ok(())
            }
            SearchOutcome::Found { nonce, hashval, .. } => {
                let mut guard = self.coordinator.enter(Phase::Mining);
                if guard.chain.revision() != revision {
                    info!("chain advanced while the coin was in flight; discarding it");
                    return Ok(());
                }
                let mut coin = Coin::new(
                    rand_bits_with_set_bits(32),
                    self.keys.node_id(),
                    self.keys.public(),
                    params.genesis_string,
                    nonce,
                    params.difficulty,
                    current_timestamp()?,
                    hashval,
                );
                coin.sign(&self.keys);
                info!(
                    "adding signed coin {} (#{}) to the owned collection",
                    coin.id(),
                    guard.owned_coins.len() + 1
                );
                guard.owned_coins.push(coin);
                Ok(())
            }
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }
}
