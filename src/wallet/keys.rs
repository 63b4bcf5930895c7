//! From-scratch public-key scheme used to sign coins, transactions and
//! blocks.
//!
//! The scheme is textbook RSA without padding: a record is hashed with
//! SHA-256 and the hash value is exponentiated directly. Signing uses the
//! CRT decomposition (`Xp`, `Xq`) instead of a full exponentiation mod `n`.
//! Key sizes are deliberately small (512-bit modulus by default); this is
//! a classroom currency, not a secure one.

use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NodeError, Result};
use crate::utils::{hex_to_int, sha256_hex, sha256_int};

/// Default public exponent, the usual F4.
pub const PUB_EXPONENT: u32 = 65537;

/// Miller-Rabin rounds for prime candidates.
const PRIMALITY_ROUNDS: u32 = 24;

/// File names for the persisted key pair.
pub const PUB_KEY_FILE: &str = "cerocoin_key_pub.txt";
pub const PRIV_KEY_FILE: &str = "cerocoin_key_priv.txt";

const SMALL_PRIMES: [u32; 20] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73,
];

/// Public half of a key pair.
///
/// Two textual encodings exist and both must be preserved: the
/// space-separated display form (key files, node-ID derivation) and the
/// comma-separated wire-field form (embedded in coin, transaction and
/// block records, where fields are split on spaces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    modulus: BigUint,
    exponent: BigUint,
}

impl PublicKey {
    pub fn new(modulus: BigUint, exponent: BigUint) -> PublicKey {
        PublicKey { modulus, exponent }
    }

    /// Space-separated form: `CEROCOIN_PUBKEY mod=<hex> e=<hex>`
    pub fn display(&self) -> String {
        format!(
            "CEROCOIN_PUBKEY mod={:x} e={:x}",
            self.modulus, self.exponent
        )
    }

    /// Comma-separated form: `CEROCOIN_PUBKEY,mod=<hex>,e=<hex>`
    pub fn wire_field(&self) -> String {
        format!(
            "CEROCOIN_PUBKEY,mod={:x},e={:x}",
            self.modulus, self.exponent
        )
    }

    /// Parse either the display or the wire-field form.
    pub fn parse(text: &str) -> Result<PublicKey> {
        let tokens: Vec<&str> = if text.contains(',') {
            text.split(',').collect()
        } else {
            text.split_whitespace().collect()
        };
        if tokens.first() != Some(&"CEROCOIN_PUBKEY") {
            return Err(NodeError::Wire(format!("not a public key: {text}")));
        }
        let mut modulus = None;
        let mut exponent = None;
        for token in &tokens[1..] {
            if let Some(value) = token.strip_prefix("mod=") {
                modulus = Some(hex_to_int(value)?);
            } else if let Some(value) = token.strip_prefix("e=") {
                exponent = Some(hex_to_int(value)?);
            }
        }
        match (modulus, exponent) {
            (Some(modulus), Some(exponent)) => Ok(PublicKey { modulus, exponent }),
            _ => Err(NodeError::Wire(format!("incomplete public key: {text}"))),
        }
    }

    /// A signature is valid iff `sig^e mod n == H(message) mod n`.
    pub fn verify(&self, message: &str, signature_hex: &str) -> bool {
        let signature = match hex_to_int(signature_hex) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        let checkval = signature.modpow(&self.exponent, &self.modulus);
        checkval == sha256_int(message) % &self.modulus
    }
}

/// A full RSA key pair with the CRT helpers used for fast signing.
///
/// Immutable after generation. `Xp = q * (q^-1 mod p)` and
/// `Xq = p * (p^-1 mod q)`, so for any residues `Vp`, `Vq` the value
/// `Vp*Xp + Vq*Xq` is congruent to `Vp` mod `p` and `Vq` mod `q`.
#[derive(Debug, Clone)]
pub struct KeyPair {
    modulus: BigUint,
    pub_exponent: BigUint,
    priv_exponent: BigUint,
    p: BigUint,
    q: BigUint,
    totient: BigUint,
    xp: BigUint,
    xq: BigUint,
}

impl KeyPair {
    /// Generate a key pair with a `modulus_bits`-wide modulus.
    ///
    /// Prime or exponent mismatches are retried internally; the caller
    /// never sees a pair that fails the sign/verify round trip.
    pub fn generate(modulus_bits: u64) -> Result<KeyPair> {
        if modulus_bits % 2 != 0 || modulus_bits < 64 {
            return Err(NodeError::Crypto(format!(
                "modulus size must be an even number of at least 64 bits, got {modulus_bits}"
            )));
        }
        let e = BigUint::from(PUB_EXPONENT);
        let prime_bits = modulus_bits / 2;
        loop {
            let p = generate_prime(prime_bits, &e);
            let q = generate_prime(prime_bits, &e);
            if p == q {
                continue;
            }
            let totient = (&p - 1u8) * (&q - 1u8);
            if gcd(totient.clone(), e.clone()) != BigUint::from(1u8) {
                continue;
            }
            let pair = KeyPair::from_primes(p, q, e.clone())?;
            // Round-trip probe before the pair is handed out
            let probe = "cerocoin keypair probe";
            let signature = pair.raw_sign(probe);
            if pair.public().verify(probe, &signature) {
                return Ok(pair);
            }
        }
    }

    /// Assemble a key pair from known primes. Used by `generate` and by
    /// tests that need a deterministic pair.
    pub fn from_primes(p: BigUint, q: BigUint, pub_exponent: BigUint) -> Result<KeyPair> {
        let modulus = &p * &q;
        let totient = (&p - 1u8) * (&q - 1u8);
        let priv_exponent = mod_inverse(&pub_exponent, &totient).ok_or_else(|| {
            NodeError::Crypto("public exponent has no inverse modulo the totient".to_string())
        })?;
        let q_inv_mod_p = mod_inverse(&q, &p)
            .ok_or_else(|| NodeError::Crypto("q has no inverse mod p".to_string()))?;
        let p_inv_mod_q = mod_inverse(&p, &q)
            .ok_or_else(|| NodeError::Crypto("p has no inverse mod q".to_string()))?;
        let xp = &q * q_inv_mod_p;
        let xq = &p * p_inv_mod_q;
        Ok(KeyPair {
            modulus,
            pub_exponent,
            priv_exponent,
            p,
            q,
            totient,
            xp,
            xq,
        })
    }

    pub fn public(&self) -> PublicKey {
        PublicKey {
            modulus: self.modulus.clone(),
            exponent: self.pub_exponent.clone(),
        }
    }

    /// The node identity: SHA-256 of the display form of the public key.
    pub fn node_id(&self) -> String {
        sha256_hex(&self.public().display())
    }

    /// CRT signature over a message, as lowercase hex.
    ///
    /// `sig = (H(m)^d mod p)*Xp mod n + (H(m)^d mod q)*Xq mod n`. The sum
    /// is left unreduced on the wire; verification is unaffected, since it
    /// can differ from the CRT value only by one multiple of `n`.
    ///
    /// Panics if the fresh signature fails self-verification: that is a
    /// programming or numeric defect, never a recoverable condition.
    pub fn sign(&self, message: &str) -> String {
        let signature = self.raw_sign(message);
        assert!(
            self.public().verify(message, &signature),
            "signature self-check failed: hashval does not agree with checkval"
        );
        signature
    }

    fn raw_sign(&self, message: &str) -> String {
        let hashval = sha256_int(message);
        let vp = hashval.modpow(&self.priv_exponent, &self.p);
        let vq = hashval.modpow(&self.priv_exponent, &self.q);
        let signature = (vp * &self.xp) % &self.modulus + (vq * &self.xq) % &self.modulus;
        format!("{signature:x}")
    }

    /// Private-key display form, mirroring the public one.
    pub fn display_private(&self) -> String {
        format!(
            "CEROCOIN-PRIVKEY mod={:x} e={:x} d={:x} p={:x} q={:x} totient={:x} Xp={:x} Xq={:x}",
            self.modulus,
            self.pub_exponent,
            self.priv_exponent,
            self.p,
            self.q,
            self.totient,
            self.xp,
            self.xq
        )
    }

    /// Persist both key encodings to text files in `dir`.
    pub fn write_to_files(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let pub_path = dir.join(PUB_KEY_FILE);
        let priv_path = dir.join(PRIV_KEY_FILE);
        fs::write(&pub_path, self.public().display())?;
        fs::write(&priv_path, self.display_private())?;
        Ok((pub_path, priv_path))
    }
}

/// Euclid's algorithm, as in any number theory text.
fn gcd(mut a: BigUint, mut b: BigUint) -> BigUint {
    let zero = BigUint::from(0u8);
    while b != zero {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

/// Modular inverse of `num` mod `modulus` via the extended Euclid
/// algorithm, or `None` when no inverse exists.
fn mod_inverse(num: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    let mut a = BigInt::from_biguint(Sign::Plus, num.clone());
    let mut m = BigInt::from_biguint(Sign::Plus, modulus.clone());
    let big_m = m.clone();
    let mut x = BigInt::from(0);
    let mut x_old = BigInt::from(1);
    while m != BigInt::from(0) {
        let quotient = &a / &m;
        let remainder = &a % &m;
        a = m;
        m = remainder;
        let next_x = &x_old - &quotient * &x;
        x_old = x;
        x = next_x;
    }
    if a != BigInt::from(1) {
        return None;
    }
    let inverse = ((x_old % &big_m) + &big_m) % &big_m;
    inverse.to_biguint()
}

/// Random probable prime of `bits` width whose predecessor is coprime to
/// the public exponent. Top two bits are forced set so the product of two
/// such primes fills the full modulus width.
fn generate_prime(bits: u64, pub_exponent: &BigUint) -> BigUint {
    let one = BigUint::from(1u8);
    loop {
        let mut candidate = rand::thread_rng().gen_biguint(bits);
        candidate.set_bit(0, true);
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(bits - 2, true);
        if !is_probable_prime(&candidate) {
            continue;
        }
        if gcd(&candidate - &one, pub_exponent.clone()) == one {
            return candidate;
        }
    }
}

/// Miller-Rabin with random bases, preceded by small-prime trial division.
fn is_probable_prime(n: &BigUint) -> bool {
    let one = BigUint::from(1u8);
    let two = BigUint::from(2u8);
    for small in SMALL_PRIMES {
        let small = BigUint::from(small);
        if *n == small {
            return true;
        }
        if n % &small == BigUint::from(0u8) {
            return false;
        }
    }
    // Write n-1 as d * 2^r with d odd
    let n_minus_one = n - &one;
    let mut d = n_minus_one.clone();
    let mut r = 0u64;
    while &d % &two == BigUint::from(0u8) {
        d >>= 1;
        r += 1;
    }
    let mut rng = rand::thread_rng();
    'witness: for _ in 0..PRIMALITY_ROUNDS {
        let base = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = base.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 0..r.saturating_sub(1) {
            x = x.modpow(&two, n);
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn textbook_pair() -> KeyPair {
        // The classic p=61, q=53, e=17 example
        KeyPair::from_primes(BigUint::from(61u8), BigUint::from(53u8), BigUint::from(17u8))
            .unwrap()
    }

    #[test]
    fn test_textbook_private_exponent() {
        let pair = textbook_pair();
        assert_eq!(pair.modulus, BigUint::from(3233u16));
        assert_eq!(pair.totient, BigUint::from(3120u16));
        assert_eq!(pair.priv_exponent, BigUint::from(2753u16));
    }

    #[test]
    fn test_textbook_round_trip() {
        let pair = textbook_pair();
        let message = "transfer one cerocoin";
        let signature = pair.sign(message);
        assert!(pair.public().verify(message, &signature));
    }

    #[test]
    fn test_verify_rejects_mutated_message() {
        let pair = textbook_pair();
        let signature = pair.sign("transfer one cerocoin");
        assert!(!pair.public().verify("transfer one cerocoiN", &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let pair = textbook_pair();
        let other =
            KeyPair::from_primes(BigUint::from(89u8), BigUint::from(97u8), BigUint::from(17u8))
                .unwrap();
        let signature = pair.sign("transfer one cerocoin");
        assert!(!other.public().verify("transfer one cerocoin", &signature));
    }

    #[test]
    fn test_generated_pair_round_trip() {
        let pair = KeyPair::generate(256).unwrap();
        let message = "a freshly generated pair must self-verify";
        let signature = pair.sign(message);
        assert!(pair.public().verify(message, &signature));
        assert!(!pair.public().verify("a different message", &signature));
    }

    #[test]
    fn test_generate_rejects_odd_modulus_size() {
        assert!(KeyPair::generate(257).is_err());
        assert!(KeyPair::generate(32).is_err());
    }

    #[test]
    fn test_public_key_encodings_round_trip() {
        let pair = KeyPair::generate(256).unwrap();
        let public = pair.public();
        assert_eq!(PublicKey::parse(&public.display()).unwrap(), public);
        assert_eq!(PublicKey::parse(&public.wire_field()).unwrap(), public);
        assert!(public.wire_field().starts_with("CEROCOIN_PUBKEY,mod="));
        assert!(!public.wire_field().contains(' '));
        assert!(public.display().contains(' '));
    }

    #[test]
    fn test_public_key_parse_rejects_garbage() {
        assert!(PublicKey::parse("CEROCOIN_PUBKEY,mod=zz,e=10001").is_err());
        assert!(PublicKey::parse("SOMETHING_ELSE,mod=ab,e=10001").is_err());
        assert!(PublicKey::parse("CEROCOIN_PUBKEY,mod=ab").is_err());
    }

    #[test]
    fn test_mod_inverse_matches_original_algorithm() {
        let inverse = mod_inverse(&BigUint::from(17u8), &BigUint::from(3120u16)).unwrap();
        assert_eq!(inverse, BigUint::from(2753u16));
        // 2 has no inverse mod 4
        assert!(mod_inverse(&BigUint::from(2u8), &BigUint::from(4u8)).is_none());
    }

    #[test]
    fn test_prime_generator_properties() {
        let e = BigUint::from(PUB_EXPONENT);
        let prime = generate_prime(64, &e);
        assert!(prime.bit(63));
        assert!(prime.bit(62));
        assert!(prime.bit(0));
        assert!(is_probable_prime(&prime));
        assert_eq!(
            gcd(&prime - 1u8, e),
            BigUint::from(1u8)
        );
    }

    #[test]
    fn test_is_probable_prime_known_values() {
        assert!(is_probable_prime(&BigUint::from(61u8)));
        assert!(is_probable_prime(&BigUint::from(104729u32)));
        assert!(!is_probable_prime(&BigUint::from(104727u32)));
        assert!(!is_probable_prime(&(BigUint::from(61u8) * BigUint::from(53u8))));
    }

    #[test]
    fn test_key_files_written() {
        let dir = tempfile::tempdir().unwrap();
        let pair = KeyPair::generate(256).unwrap();
        let (pub_path, priv_path) = pair.write_to_files(dir.path()).unwrap();
        let pub_text = std::fs::read_to_string(pub_path).unwrap();
        let priv_text = std::fs::read_to_string(priv_path).unwrap();
        assert_eq!(pub_text, pair.public().display());
        assert!(priv_text.starts_with("CEROCOIN-PRIVKEY mod="));
    }

    #[test]
    fn test_node_id_is_digest_of_display_form() {
        let pair = textbook_pair();
        assert_eq!(pair.node_id(), sha256_hex(&pair.public().display()));
        assert_eq!(pair.node_id().len(), 64);
    }
}
