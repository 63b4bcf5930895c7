//! Node networking and worker threads
//!
//! The inbound server, the outgoing peer links, and the three workers
//! (miner, transactor, block assembler), all coordinated through the
//! phase mechanism in `phase`.

pub mod assembler;
pub mod miner;
pub mod node;
pub mod peers;
pub mod phase;
pub mod server;
pub mod transactor;

pub use assembler::{BlockAssembler, BLOCK_ACK, BLOCK_ANNOUNCE};
pub use miner::Miner;
pub use node::Node;
pub use peers::{PeerLink, PeerRegistry};
pub use phase::{Ledger, Phase, PhaseCoordinator, PhaseGuard};
pub use server::Server;
pub use transactor::{Transactor, BUYER_KEY_PREFIX, BUYER_KEY_REQUEST};
