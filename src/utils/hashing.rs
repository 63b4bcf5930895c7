use data_encoding::HEXLOWER;
use num_bigint::BigUint;
use rand::RngCore;
use ring::digest::{Context, SHA256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{NodeError, Result};

/// SHA-256 digest of a text payload as 64 lowercase hex characters.
///
/// All record hashing in the wire protocol runs over the canonical ASCII
/// encoding of the record, so the digest input is a `&str` rather than
/// raw bytes.
pub fn sha256_hex(data: &str) -> String {
    let mut context = Context::new(&SHA256);
    context.update(data.as_bytes());
    let digest = context.finish();
    HEXLOWER.encode(digest.as_ref())
}

/// SHA-256 digest of a text payload interpreted as an unsigned integer,
/// for comparisons against the proof-of-work target.
pub fn sha256_int(data: &str) -> BigUint {
    let mut context = Context::new(&SHA256);
    context.update(data.as_bytes());
    let digest = context.finish();
    BigUint::from_bytes_be(digest.as_ref())
}

/// Parse a lowercase/uppercase hex string into an unsigned integer.
pub fn hex_to_int(hex: &str) -> Result<BigUint> {
    BigUint::parse_bytes(hex.as_bytes(), 16)
        .ok_or_else(|| NodeError::Wire(format!("not a hex integer: {hex}")))
}

/// The proof-of-work target for difficulty `d`: a digest meets the
/// difficulty iff its integer value is strictly below `2^d`.
pub fn difficulty_target(difficulty: u32) -> BigUint {
    BigUint::from(1u8) << difficulty
}

/// Unix time in seconds with two decimals, kept as its canonical string
/// so that signed records hash identically after a decode/encode round trip.
pub fn current_timestamp() -> Result<String> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| NodeError::Crypto(format!("System time error: {e}")))?;
    Ok(format!("{:.2}", duration.as_secs_f64()))
}

/// `n_bytes` of fresh randomness as lowercase hex.
pub fn rand_hex(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    HEXLOWER.encode(&buf)
}

/// A random `bits`-wide integer with the top two bits and the low bit
/// forced set, rendered as hex. Forcing the top bits pins the rendered
/// width, so a 32-bit identifier is always 8 hex characters.
pub fn rand_bits_with_set_bits(bits: u64) -> String {
    let mut candidate = num_bigint::RandBigInt::gen_biguint(&mut rand::thread_rng(), bits);
    candidate.set_bit(0, true);
    candidate.set_bit(bits - 1, true);
    candidate.set_bit(bits - 2, true);
    candidate.to_str_radix(16)
}
