//! # CeroCoin - My Toy Peer-to-Peer Crypto-Currency Node
//!
//! This is my single-node implementation of a classroom crypto-currency,
//! built from scratch in Rust. When I come back to this code, here's what
//! I need to remember:
//!
//! ## What I Built
//! - **Proof-of-Work Mining**: Iterative nonce search against a `2^d`
//!   difficulty target, preemptible between any two hash attempts
//! - **From-Scratch Signatures**: Textbook RSA with a CRT fast path over
//!   `num-bigint`; coins, transactions and blocks all carry signatures
//! - **Textual Wire Protocol**: Line-oriented `KEY=VALUE` records over
//!   TCP, with a fixed field layout preserved for interoperability
//! - **Fork Choice**: Longest chain wins, and only at equal-or-harder
//!   difficulty; losing candidates are discarded without side effects
//! - **Phase Coordination**: Mining, transacting, block assembly and
//!   inbound validation share one ledger under a single guard
//!
//! ## How I Organized My Code
//! - `core/`: Ledger records with their wire codecs, chain state and
//!   fork choice, the proof-of-work search and cancellation token
//! - `wallet/`: Key-pair generation, CRT signing, key persistence
//! - `network/`: The inbound server, peer links, and the three worker
//!   threads, coordinated through the phase mechanism
//! - `config/`: Explicit configuration passed at construction
//! - `utils/`: Hashing, timestamps, randomness helpers
//! - `cli/`: Command-line interface for the node binary
//!
//! ## Key Design Decisions I Made
//! - Cooperative miner cancellation instead of killing the thread: the
//!   token is checked every iteration and adopters wait for the ack
//! - One mutex around all shared ledger state instead of advisory flags
//! - Canonical record strings are kept verbatim so signatures survive a
//!   decode/encode round trip
//! - Bounded read timeouts on peer replies so a silent peer cannot hang
//!   a negotiation

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{NodeConfig, DEFAULT_PORT};
pub use core::{
    search, Block, CancelToken, ChainState, Coin, Decision, SearchOutcome, SearchParams,
    Transaction,
};
pub use error::{NodeError, Result};
pub use network::{
    BlockAssembler, Ledger, Miner, Node, PeerLink, PeerRegistry, Phase, PhaseCoordinator, Server,
    Transactor, BLOCK_ACK, BLOCK_ANNOUNCE, BUYER_KEY_PREFIX, BUYER_KEY_REQUEST,
};
pub use utils::{current_timestamp, rand_bits_with_set_bits, rand_hex, sha256_hex, sha256_int};
pub use wallet::{KeyPair, PublicKey};
