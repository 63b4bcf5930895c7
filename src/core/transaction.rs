use crate::core::coin::{parse_fields, take, Coin, COIN_BEGIN, COIN_END};
use crate::error::{NodeError, Result};
use crate::wallet::{KeyPair, PublicKey};

pub const TRANSACTION_BEGIN: &str = "----CEROCOIN_TRANSACTION_BEGIN";
pub const TRANSACTION_END: &str = "CEROCOIN_TRANSACTION_END----";

/// A coin-transfer record: the seller embeds the signed coin together
/// with the buyer's public key and signs the whole thing.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: String,
    coin: Coin,
    seller_id: String,
    seller_pub_key: PublicKey,
    buyer_pub_key: PublicKey,
    timestamp: String,
    seller_signature: Option<String>,
}

impl Transaction {
    pub fn new(
        id: String,
        coin: Coin,
        seller_id: String,
        seller_pub_key: PublicKey,
        buyer_pub_key: PublicKey,
        timestamp: String,
    ) -> Transaction {
        Transaction {
            id,
            coin,
            seller_id,
            seller_pub_key,
            buyer_pub_key,
            timestamp,
            seller_signature: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coin(&self) -> &Coin {
        &self.coin
    }

    pub fn seller_id(&self) -> &str {
        &self.seller_id
    }

    pub fn seller_pub_key(&self) -> &PublicKey {
        &self.seller_pub_key
    }

    pub fn buyer_pub_key(&self) -> &PublicKey {
        &self.buyer_pub_key
    }

    /// Difficulty represented by this transaction: the one its coin was
    /// mined at. Used by the block assembler's difficulty aggregation.
    pub fn pow_difficulty(&self) -> u32 {
        self.coin.pow_difficulty()
    }

    /// The signing payload: every field between the transaction
    /// delimiters except the seller signature, with the embedded coin in
    /// its full delimited encoding.
    fn body(&self) -> String {
        format!(
            "TRANSACTION_ID={} {} SELLER={} SELLER_PUB_KEY={} BUYER_PUB_KEY={} TIMESTAMP={}",
            self.id,
            self.coin.encode(),
            self.seller_id,
            self.seller_pub_key.wire_field(),
            self.buyer_pub_key.wire_field(),
            self.timestamp
        )
    }

    pub fn sign(&mut self, keys: &KeyPair) {
        self.seller_signature = Some(keys.sign(&self.body()));
    }

    pub fn encode(&self) -> String {
        match &self.seller_signature {
            Some(signature) => format!(
                "{TRANSACTION_BEGIN} {} SELLER_TRANX_SIGNATURE={signature} {TRANSACTION_END}",
                self.body()
            ),
            None => format!("{TRANSACTION_BEGIN} {} {TRANSACTION_END}", self.body()),
        }
    }

    pub fn decode(line: &str) -> Result<Transaction> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.first() != Some(&TRANSACTION_BEGIN) || tokens.last() != Some(&TRANSACTION_END) {
            return Err(NodeError::Wire("transaction delimiters missing".to_string()));
        }
        let inner = &tokens[1..tokens.len() - 1];
        let coin_start = inner
            .iter()
            .position(|t| *t == COIN_BEGIN)
            .ok_or_else(|| NodeError::Wire("transaction has no embedded coin".to_string()))?;
        let coin_end = inner
            .iter()
            .position(|t| *t == COIN_END)
            .ok_or_else(|| NodeError::Wire("embedded coin is unterminated".to_string()))?;
        if coin_end <= coin_start {
            return Err(NodeError::Wire("embedded coin delimiters reversed".to_string()));
        }
        let coin = Coin::decode(&inner[coin_start..=coin_end].join(" "))?;
        let mut outer_tokens: Vec<&str> = inner[..coin_start].to_vec();
        outer_tokens.extend_from_slice(&inner[coin_end + 1..]);
        let fields = parse_fields(&outer_tokens)?;
        Ok(Transaction {
            id: take(&fields, "TRANSACTION_ID")?,
            coin,
            seller_id: take(&fields, "SELLER")?,
            seller_pub_key: PublicKey::parse(&take(&fields, "SELLER_PUB_KEY")?)?,
            buyer_pub_key: PublicKey::parse(&take(&fields, "BUYER_PUB_KEY")?)?,
            timestamp: take(&fields, "TIMESTAMP")?,
            seller_signature: fields
                .iter()
                .find(|(key, _)| key == "SELLER_TRANX_SIGNATURE")
                .map(|(_, value)| value.clone()),
        })
    }

    /// Full validation: seller signature over the body, then the embedded
    /// coin on its own terms.
    pub fn verify(&self) -> Result<()> {
        let signature = self.seller_signature.as_ref().ok_or_else(|| {
            NodeError::Validation(format!("transaction {}: missing seller signature", self.id))
        })?;
        if !self.seller_pub_key.verify(&self.body(), signature) {
            return Err(NodeError::Validation(format!(
                "transaction {}: seller signature does not verify",
                self.id
            )));
        }
        self.coin.verify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::test_utils::{mined_coin, signed_transaction, test_keys, OTHER_PRIMES};
    use crate::wallet::KeyPair;
    use num_bigint::BigUint;

    #[test]
    fn test_signed_transaction_verifies() {
        let seller = test_keys();
        let tranx = signed_transaction(&seller);
        tranx.verify().unwrap();
        assert_eq!(tranx.seller_id(), seller.node_id());
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let seller = test_keys();
        let tranx = signed_transaction(&seller);
        let line = tranx.encode();
        assert!(line.starts_with("----CEROCOIN_TRANSACTION_BEGIN TRANSACTION_ID="));
        assert!(line.ends_with("CEROCOIN_TRANSACTION_END----"));
        assert!(!line.contains('\n'));
        let decoded = Transaction::decode(&line).unwrap();
        assert_eq!(decoded, tranx);
        decoded.verify().unwrap();
    }

    #[test]
    fn test_buyer_key_is_the_buyers() {
        // The record must carry the buyer's key, not the seller's
        let seller = test_keys();
        let buyer = KeyPair::from_primes(
            BigUint::from(OTHER_PRIMES.0),
            BigUint::from(OTHER_PRIMES.1),
            BigUint::from(17u8),
        )
        .unwrap();
        let coin = mined_coin(&seller, 256);
        let mut tranx = Transaction::new(
            "fec4d031".to_string(),
            coin,
            seller.node_id(),
            seller.public(),
            buyer.public(),
            "1521659253.75".to_string(),
        );
        tranx.sign(&seller);
        assert_eq!(tranx.buyer_pub_key(), &buyer.public());
        assert_ne!(tranx.buyer_pub_key(), &seller.public());
    }

    #[test]
    fn test_tampered_transaction_rejected() {
        let seller = test_keys();
        let tranx = signed_transaction(&seller);
        let line = tranx.encode().replace("SELLER=", "SELLER=0");
        let decoded = Transaction::decode(&line).unwrap();
        assert!(decoded.verify().is_err());
    }

    #[test]
    fn test_transaction_with_tampered_coin_rejected() {
        let seller = test_keys();
        let mut tranx = signed_transaction(&seller);
        // Re-sign the outer record around a coin whose nonce was swapped:
        // the seller signature then verifies but the coin must not
        tranx.coin = {
            let mut coin = tranx.coin.clone();
            let line = coin
                .encode()
                .replace("NONCE=", "NONCE=ff");
            coin = Coin::decode(&line).unwrap();
            coin
        };
        tranx.sign(&seller);
        assert!(tranx.verify().is_err());
    }

    #[test]
    fn test_decode_rejects_missing_coin() {
        let line = "----CEROCOIN_TRANSACTION_BEGIN TRANSACTION_ID=ab SELLER=cd \
                    CEROCOIN_TRANSACTION_END----";
        assert!(Transaction::decode(line).is_err());
    }
}
