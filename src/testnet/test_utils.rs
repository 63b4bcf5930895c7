//! Helpers shared by the unit tests: a small deterministic key pair and
//! builders for signed coins, transactions and blocks.
//!
//! The key pairs use tiny fixed primes so tests run fast; verification
//! compares against `H(m) mod n`, so small moduli behave exactly like
//! full-size ones.

use num_bigint::BigUint;

use crate::core::{Block, Coin, Transaction};
use crate::utils::{rand_bits_with_set_bits, rand_hex, sha256_hex};
use crate::wallet::KeyPair;

/// Primes for a second, distinct key pair (a buyer or a peer node).
pub const OTHER_PRIMES: (u32, u32) = (89, 97);

/// A deterministic key pair built from fixed primes with e = 17.
pub fn test_keys() -> KeyPair {
    KeyPair::from_primes(
        BigUint::from(104729u32),
        BigUint::from(104723u32),
        BigUint::from(17u8),
    )
    .expect("fixed test primes must form a key pair")
}

/// A second key pair, distinct from `test_keys`.
pub fn other_keys() -> KeyPair {
    KeyPair::from_primes(
        BigUint::from(OTHER_PRIMES.0),
        BigUint::from(OTHER_PRIMES.1),
        BigUint::from(17u8),
    )
    .expect("fixed test primes must form a key pair")
}

/// A signed coin carrying the given difficulty bound.
///
/// The hash value is the honest digest of a random genesis string and
/// nonce, so at difficulty 256 the coin always verifies, while lower
/// difficulties will usually fail the bound check.
pub fn mined_coin(keys: &KeyPair, difficulty: u32) -> Coin {
    let genesis_string = rand_hex(32);
    let nonce = rand_hex(64);
    let hashval = sha256_hex(&format!("{genesis_string}{nonce}"));
    let mut coin = Coin::new(
        rand_bits_with_set_bits(32),
        keys.node_id(),
        keys.public(),
        genesis_string,
        nonce,
        difficulty,
        "1521659272.15".to_string(),
        hashval,
    );
    coin.sign(keys);
    coin
}

/// A signed transaction selling a fresh coin, with the seller doubling
/// as the buyer.
pub fn signed_transaction(seller: &KeyPair) -> Transaction {
    let mut tranx = Transaction::new(
        rand_bits_with_set_bits(32),
        mined_coin(seller, 256),
        seller.node_id(),
        seller.public(),
        seller.public(),
        "1521659253.75".to_string(),
    );
    tranx.sign(seller);
    tranx
}

/// A signed block of `n_transactions` fresh transactions with the given
/// block-level difficulty and chain length. The embedded coins carry
/// difficulty 256 so the block always passes full validation.
pub fn signed_block(
    keys: &KeyPair,
    n_transactions: usize,
    pow_difficulty: u32,
    blockchain_length: u64,
) -> Block {
    let transactions: Vec<Transaction> =
        (0..n_transactions).map(|_| signed_transaction(keys)).collect();
    let mut block = Block::new(
        rand_bits_with_set_bits(32),
        keys.node_id(),
        transactions,
        pow_difficulty,
        rand_bits_with_set_bits(256),
        blockchain_length,
        "1521659277.86".to_string(),
    );
    block.sign(keys);
    block
}
