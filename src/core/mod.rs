//! Core CeroCoin functionality
//!
//! This module contains the ledger records (coins, transactions, blocks)
//! with their wire codecs, the chain state with its fork-choice rule, and
//! the proof-of-work search.

pub mod block;
pub mod chain;
pub mod coin;
pub mod miner;
pub mod transaction;

pub use block::Block;
pub use chain::{ChainState, Decision};
pub use coin::Coin;
pub use miner::{search, CancelToken, SearchOutcome, SearchParams};
pub use transaction::Transaction;
