use crate::core::coin::{parse_fields, take};
use crate::core::transaction::Transaction;
use crate::error::{NodeError, Result};
use crate::utils::sha256_hex;
use crate::wallet::{KeyPair, PublicKey};

pub const BLOCK_BEGIN: &str = "CEROCOIN_BLOCK_BEGIN";
pub const BLOCK_END: &str = "CEROCOIN_BLOCK_END";

/// A block packs an ordered sequence of signed transactions.
///
/// `blockchain_length` counts transactions, not blocks: a new block's
/// length is the previous accepted length plus the number of transactions
/// it carries. `pow_difficulty` is the minimum difficulty represented
/// among the included transactions.
///
/// The wire format carries no creator public key; the creator signs the
/// transactions it generated itself, so its key is recovered from any
/// embedded transaction whose seller is the block creator.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    id: String,
    creator_id: String,
    transactions: Vec<Transaction>,
    pow_difficulty: u32,
    prev_block_hash: String,
    blockchain_length: u64,
    timestamp: String,
    creator_signature: Option<String>,
}

impl Block {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        creator_id: String,
        transactions: Vec<Transaction>,
        pow_difficulty: u32,
        prev_block_hash: String,
        blockchain_length: u64,
        timestamp: String,
    ) -> Block {
        Block {
            id,
            creator_id,
            transactions,
            pow_difficulty,
            prev_block_hash,
            blockchain_length,
            timestamp,
            creator_signature: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn creator_id(&self) -> &str {
        &self.creator_id
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn pow_difficulty(&self) -> u32 {
        self.pow_difficulty
    }

    pub fn prev_block_hash(&self) -> &str {
        &self.prev_block_hash
    }

    pub fn blockchain_length(&self) -> u64 {
        self.blockchain_length
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Pack the transaction lines into the space-free `TRANSACTIONS`
    /// field value: a bracketed, quoted list with every space turned
    /// into a colon.
    fn pack_transactions(transactions: &[Transaction]) -> String {
        let packed: Vec<String> = transactions
            .iter()
            .map(|t| t.encode().replace(' ', ":"))
            .collect();
        format!("['{}']", packed.join("',:'"))
    }

    /// Invert `pack_transactions`.
    fn unpack_transactions(field: &str) -> Result<Vec<Transaction>> {
        let inner = field
            .strip_prefix("['")
            .and_then(|rest| rest.strip_suffix("']"))
            .ok_or_else(|| {
                NodeError::Wire("TRANSACTIONS field is not a packed list".to_string())
            })?;
        inner
            .split("',:'")
            .map(|packed| Transaction::decode(&packed.replace(':', " ")))
            .collect()
    }

    /// The signing payload: every field between the block delimiters
    /// except the creator signature.
    fn body(&self) -> String {
        format!(
            "BLOCK_ID={} BLOCK_CREATOR={} TRANSACTIONS={} POW_DIFFICULTY={} \
             PREV_BLOCK_HASH={} BLOCKCHAIN_LENGTH={} TIMESTAMP={}",
            self.id,
            self.creator_id,
            Self::pack_transactions(&self.transactions),
            self.pow_difficulty,
            self.prev_block_hash,
            self.blockchain_length,
            self.timestamp
        )
    }

    pub fn sign(&mut self, keys: &KeyPair) {
        self.creator_signature = Some(keys.sign(&self.body()));
    }

    pub fn encode(&self) -> String {
        match &self.creator_signature {
            Some(signature) => format!(
                "{BLOCK_BEGIN} {} BLOCK_CREATOR_SIGNATURE={signature} {BLOCK_END}",
                self.body()
            ),
            None => format!("{BLOCK_BEGIN} {} {BLOCK_END}", self.body()),
        }
    }

    pub fn decode(line: &str) -> Result<Block> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() != Some(&BLOCK_BEGIN) || tokens.last() != Some(&BLOCK_END) {
            return Err(NodeError::Wire("block delimiters missing".to_string()));
        }
        let fields = parse_fields(&tokens[1..tokens.len() - 1])?;
        let pow_difficulty = take(&fields, "POW_DIFFICULTY")?
            .parse::<u32>()
            .map_err(|e| NodeError::Wire(format!("bad POW_DIFFICULTY: {e}")))?;
        let blockchain_length = take(&fields, "BLOCKCHAIN_LENGTH")?
            .parse::<u64>()
            .map_err(|e| NodeError::Wire(format!("bad BLOCKCHAIN_LENGTH: {e}")))?;
        Ok(Block {
            id: take(&fields, "BLOCK_ID")?,
            creator_id: take(&fields, "BLOCK_CREATOR")?,
            transactions: Self::unpack_transactions(&take(&fields, "TRANSACTIONS")?)?,
            pow_difficulty,
            prev_block_hash: take(&fields, "PREV_BLOCK_HASH")?,
            blockchain_length,
            timestamp: take(&fields, "TIMESTAMP")?,
            creator_signature: fields
                .iter()
                .find(|(key, _)| key == "BLOCK_CREATOR_SIGNATURE")
                .map(|(_, value)| value.clone()),
        })
    }

    /// The block creator's public key, recovered from an embedded
    /// transaction the creator sold.
    fn creator_pub_key(&self) -> Result<&PublicKey> {
        self.transactions
            .iter()
            .find(|t| t.seller_id() == self.creator_id)
            .map(Transaction::seller_pub_key)
            .ok_or_else(|| {
                NodeError::Validation(format!(
                    "block {}: no embedded transaction establishes the creator's key",
                    self.id
                ))
            })
    }

    /// Full validation: every embedded transaction on its own terms, then
    /// the creator signature over the body.
    pub fn verify(&self) -> Result<()> {
        if self.transactions.is_empty() {
            return Err(NodeError::Validation(format!(
                "block {}: carries no transactions",
                self.id
            )));
        }
        for transaction in &self.transactions {
            transaction.verify()?;
        }
        let signature = self.creator_signature.as_ref().ok_or_else(|| {
            NodeError::Validation(format!("block {}: missing creator signature", self.id))
        })?;
        if !self.creator_pub_key()?.verify(&self.body(), signature) {
            return Err(NodeError::Validation(format!(
                "block {}: creator signature does not verify",
                self.id
            )));
        }
        Ok(())
    }

    /// Digest a successor's genesis string is derived from: the packed
    /// transactions field, the previous-block hash, and the timestamp,
    /// concatenated and hashed.
    pub fn genesis_digest(&self) -> String {
        sha256_hex(&format!(
            "{}{}{}",
            Self::pack_transactions(&self.transactions),
            self.prev_block_hash,
            self.timestamp
        ))
    }
}
