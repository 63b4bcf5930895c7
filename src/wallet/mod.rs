//! Key management
//!
//! Key-pair generation, the CRT signing scheme, public-key encodings,
//! and on-disk key persistence.

pub mod keys;

pub use keys::{KeyPair, PublicKey, PRIV_KEY_FILE, PUB_KEY_FILE, PUB_EXPONENT};
