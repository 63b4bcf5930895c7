//! Utility functions and helpers
//!
//! This module contains the hashing primitives, timestamp formatting,
//! and randomness helpers used throughout the node.

pub mod hashing;

pub use hashing::{
    current_timestamp, difficulty_target, hex_to_int, rand_bits_with_set_bits, rand_hex,
    sha256_hex, sha256_int,
};
