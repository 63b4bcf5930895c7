use crate::error::{NodeError, Result};
use crate::utils::{difficulty_target, hex_to_int, sha256_hex};
use crate::wallet::{KeyPair, PublicKey};

pub const COIN_BEGIN: &str = "CEROCOIN_BEGIN";
pub const COIN_END: &str = "CEROCOIN_END";

/// A mined coin.
///
/// The canonical encoding is a single space-separated line between the
/// `CEROCOIN_BEGIN`/`CEROCOIN_END` delimiters. The miner signature covers
/// every field except itself, so the record is immutable once signed.
#[derive(Debug, Clone, PartialEq)]
pub struct Coin {
    id: String,
    miner_id: String,
    miner_pub_key: PublicKey,
    genesis_string: String,
    nonce: String,
    pow_difficulty: u32,
    timestamp: String,
    hashval: String,
    miner_signature: Option<String>,
}

impl Coin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        miner_id: String,
        miner_pub_key: PublicKey,
        genesis_string: String,
        nonce: String,
        pow_difficulty: u32,
        timestamp: String,
        hashval: String,
    ) -> Coin {
        Coin {
            id,
            miner_id,
            miner_pub_key,
            genesis_string,
            nonce,
            pow_difficulty,
            timestamp,
            hashval,
            miner_signature: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn miner_id(&self) -> &str {
        &self.miner_id
    }

    pub fn miner_pub_key(&self) -> &PublicKey {
        &self.miner_pub_key
    }

    pub fn pow_difficulty(&self) -> u32 {
        self.pow_difficulty
    }

    pub fn hashval(&self) -> &str {
        &self.hashval
    }

    pub fn is_signed(&self) -> bool {
        self.miner_signature.is_some()
    }

    /// The signing payload: every field between the delimiters except the
    /// signature itself.
    fn body(&self) -> String {
        format!(
            "COIN_ID={} COIN_MINER={} MINER_PUB_KEY={} GENESIS_STRING={} NONCE={} \
             POW_DIFFICULTY={} TIMESTAMP={} HASHVAL={}",
            self.id,
            self.miner_id,
            self.miner_pub_key.wire_field(),
            self.genesis_string,
            self.nonce,
            self.pow_difficulty,
            self.timestamp,
            self.hashval
        )
    }

    /// Attach the miner's signature over the coin body.
    pub fn sign(&mut self, keys: &KeyPair) {
        self.miner_signature = Some(keys.sign(&self.body()));
    }

    /// Single-line wire encoding. The signature field appears only once
    /// the coin has been signed.
    pub fn encode(&self) -> String {
        match &self.miner_signature {
            Some(signature) => {
                format!("{COIN_BEGIN} {} MINER_SIGNATURE={signature} {COIN_END}", self.body())
            }
            None => format!("{COIN_BEGIN} {} {COIN_END}", self.body()),
        }
    }

    /// Parse the wire encoding back into a coin.
    pub fn decode(line: &str) -> Result<Coin> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() != Some(&COIN_BEGIN) || tokens.last() != Some(&COIN_END) {
            return Err(NodeError::Wire("coin delimiters missing".to_string()));
        }
        let fields = parse_fields(&tokens[1..tokens.len() - 1])?;
        let pow_difficulty = take(&fields, "POW_DIFFICULTY")?
            .parse::<u32>()
            .map_err(|e| NodeError::Wire(format!("bad POW_DIFFICULTY: {e}")))?;
        Ok(Coin {
            id: take(&fields, "COIN_ID")?,
            miner_id: take(&fields, "COIN_MINER")?,
            miner_pub_key: PublicKey::parse(&take(&fields, "MINER_PUB_KEY")?)?,
            genesis_string: take(&fields, "GENESIS_STRING")?,
            nonce: take(&fields, "NONCE")?,
            pow_difficulty,
            timestamp: take(&fields, "TIMESTAMP")?,
            hashval: take(&fields, "HASHVAL")?,
            miner_signature: fields
                .iter()
                .find(|(key, _)| key == "MINER_SIGNATURE")
                .map(|(_, value)| value.clone()),
        })
    }

    /// Full coin validation: the recorded hash must match the genesis
    /// string and nonce, meet the recorded difficulty, and carry a valid
    /// miner signature.
    pub fn verify(&self) -> Result<()> {
        let recomputed = sha256_hex(&format!("{}{}", self.genesis_string, self.nonce));
        if recomputed != self.hashval {
            return Err(NodeError::Validation(format!(
                "coin {}: hashval does not match genesis string and nonce",
                self.id
            )));
        }
        if hex_to_int(&self.hashval)? >= difficulty_target(self.pow_difficulty) {
            return Err(NodeError::Validation(format!(
                "coin {}: hashval does not meet difficulty {}",
                self.id, self.pow_difficulty
            )));
        }
        let signature = self.miner_signature.as_ref().ok_or_else(|| {
            NodeError::Validation(format!("coin {}: missing miner signature", self.id))
        })?;
        if !self.miner_pub_key.verify(&self.body(), signature) {
            return Err(NodeError::Validation(format!(
                "coin {}: miner signature does not verify",
                self.id
            )));
        }
        Ok(())
    }
}

/// Split `KEY=VALUE` tokens, rejecting anything else. This is the
/// structural check applied to every inbound record.
pub(crate) fn parse_fields(tokens: &[&str]) -> Result<Vec<(String, String)>> {
    let mut fields = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token.split_once('=') {
            Some((key, value)) => fields.push((key.to_string(), value.to_string())),
            None => {
                return Err(NodeError::Wire(format!(
                    "token without KEY=VALUE shape: {token}"
                )))
            }
        }
    }
    Ok(fields)
}

pub(crate) fn take(fields: &[(String, String)], key: &str) -> Result<String> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| NodeError::Wire(format!("missing field {key}")))
}
