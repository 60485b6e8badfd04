//! Blocks, payloads, and proof-of-work sealing
//!
//! Block hash:
//! ```text
//! SHA-256( canonical_json({ "data", "index", "nonce", "previous_hash", "timestamp" }) )
//! ```
//! Keys are sorted, so the hash does not depend on field order in the file.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use vitae_core::{sha256_hex, RecordKind, VitaeResult};

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

pub const GENESIS_MESSAGE: &str = "Genesis Block - vitae secure resume ledger";

/// Tagged record stored in a block: `{type, data, created_at}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub record_type: String,
    pub data: Value,
    /// RFC 3339 creation time
    pub created_at: String,
}

impl Payload {
    pub fn new(record_type: impl Into<String>, data: Value) -> Self {
        Self {
            record_type: record_type.into(),
            data,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn genesis() -> Self {
        Self::new(RecordKind::Genesis.as_str(), json!({ "message": GENESIS_MESSAGE }))
    }

    /// The record kind, if `record_type` names one of the known kinds.
    pub fn kind(&self) -> Option<RecordKind> {
        self.record_type.parse().ok()
    }

    /// JSON form used for hashing and search.
    pub fn to_value(&self) -> Value {
        json!({
            "type": self.record_type,
            "data": self.data,
            "created_at": self.created_at,
        })
    }
}

/// A sealed (or being-sealed) block. Fields are read-only outside this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub(crate) index: u64,
    pub(crate) timestamp: f64,
    pub(crate) payload: Payload,
    pub(crate) previous_hash: String,
    pub(crate) nonce: u64,
    pub(crate) hash: String,
}

/// Portable form of a block as stored in the snapshot file.
///
/// When the payload is encrypted at rest, `data` holds `{"_encrypted": true}`
/// and `data_encrypted` holds the token of the payload's JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: u64,
    pub timestamp: f64,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_encrypted: Option<String>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Build an unsealed block: nonce 0, hash computed over the current fields.
    pub fn new(index: u64, timestamp: f64, payload: Payload, previous_hash: impl Into<String>) -> Self {
        let mut block = Self {
            index,
            timestamp,
            payload,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn record_type(&self) -> &str {
        &self.payload.record_type
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Recompute the hash from the current fields (does not update `hash`).
    pub fn calculate_hash(&self) -> String {
        hash_header(&self.header())
    }

    /// True if the stored hash is correct and has `difficulty` leading zero hex digits.
    pub fn is_sealed(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.hash, difficulty) && self.hash == self.calculate_hash()
    }

    /// Increment the nonce until the hash has `difficulty` leading zero hex digits.
    ///
    /// Expected attempts are about `16^difficulty`.
    pub fn seal(&mut self, difficulty: usize) {
        let mut header = self.header();
        while !meets_difficulty(&self.hash, difficulty) {
            self.nonce = self.nonce.wrapping_add(1);
            header["nonce"] = Value::from(self.nonce);
            self.hash = hash_header(&header);
        }
        tracing::debug!(index = self.index, nonce = self.nonce, hash = %self.hash, "block sealed");
    }

    /// Like [`Block::seal`] but gives up after `max_attempts` hashes.
    ///
    /// Returns false (block left unsealed, nonce advanced) if the budget ran out.
    pub fn seal_bounded(&mut self, difficulty: usize, max_attempts: u64) -> bool {
        let mut header = self.header();
        let mut attempts = 0u64;
        while !meets_difficulty(&self.hash, difficulty) {
            if attempts == max_attempts {
                return false;
            }
            attempts += 1;
            self.nonce = self.nonce.wrapping_add(1);
            header["nonce"] = Value::from(self.nonce);
            self.hash = hash_header(&header);
        }
        true
    }

    pub fn to_record(&self) -> BlockRecord {
        BlockRecord {
            index: self.index,
            timestamp: self.timestamp,
            data: self.payload.to_value(),
            data_encrypted: None,
            previous_hash: self.previous_hash.clone(),
            nonce: self.nonce,
            hash: self.hash.clone(),
        }
    }

    /// Rebuild a block from its plaintext record. The stored hash is kept as-is;
    /// checking it is the ledger's job.
    pub fn from_record(record: BlockRecord) -> VitaeResult<Self> {
        let payload: Payload = serde_json::from_value(record.data)?;
        Ok(Self {
            index: record.index,
            timestamp: record.timestamp,
            payload,
            previous_hash: record.previous_hash,
            nonce: record.nonce,
            hash: record.hash,
        })
    }

    fn header(&self) -> Value {
        json!({
            "index": self.index,
            "timestamp": self.timestamp,
            "data": self.payload.to_value(),
            "previous_hash": self.previous_hash,
            "nonce": self.nonce,
        })
    }
}

fn hash_header(header: &Value) -> String {
    // Value's Display is compact JSON; object keys are already sorted.
    sha256_hex(header.to_string().as_bytes())
}

/// True if the first `difficulty` characters of `hash` are all `'0'`.
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_block() -> Block {
        Block::new(
            1,
            1_718_000_000.25,
            Payload::new("resume", json!({"user_id": "u1", "score": 0.5})),
            "ab".repeat(32),
        )
    }

    #[test]
    fn test_new_block_is_hashed_with_zero_nonce() {
        let block = sample_block();
        assert_eq!(block.nonce(), 0);
        assert_eq!(block.hash().len(), 64);
        assert_eq!(block.hash(), block.calculate_hash());
    }

    #[test]
    fn test_seal_meets_difficulty() {
        let mut block = sample_block();
        block.seal(2);

        assert!(block.hash().starts_with("00"));
        assert_eq!(block.hash(), block.calculate_hash());
        assert!(block.is_sealed(2));
    }

    #[test]
    fn test_seal_zero_difficulty_keeps_nonce() {
        let mut block = sample_block();
        let before = block.hash().to_string();
        block.seal(0);
        assert_eq!(block.nonce(), 0);
        assert_eq!(block.hash(), before);
    }

    #[test]
    fn test_seal_bounded_gives_up() {
        let mut block = sample_block();
        // Eight leading zeros will not be found in ten attempts
        assert!(!block.seal_bounded(8, 10));
        assert_eq!(block.nonce(), 10);
        assert_eq!(block.hash(), block.calculate_hash());
    }

    #[test]
    fn test_seal_bounded_succeeds_like_seal() {
        let mut a = sample_block();
        let mut b = a.clone();
        a.seal(2);
        assert!(b.seal_bounded(2, u64::MAX));
        assert_eq!(a, b, "bounded sealing finds the same first nonce");
    }

    #[test]
    fn test_hash_commits_to_every_field() {
        let block = sample_block();

        let mut other = block.clone();
        other.nonce += 1;
        assert_ne!(other.calculate_hash(), block.hash());

        let mut other = block.clone();
        other.timestamp += 1.0;
        assert_ne!(other.calculate_hash(), block.hash());

        let mut other = block.clone();
        other.payload.data["score"] = json!(0.6);
        assert_ne!(other.calculate_hash(), block.hash());

        let mut other = block.clone();
        other.previous_hash = "cd".repeat(32);
        assert_ne!(other.calculate_hash(), block.hash());

        let mut other = block.clone();
        other.index = 2;
        assert_ne!(other.calculate_hash(), block.hash());
    }

    #[test]
    fn test_record_roundtrip_preserves_hash() {
        let mut block = sample_block();
        block.seal(1);

        let text = serde_json::to_string(&block.to_record()).unwrap();
        let record: BlockRecord = serde_json::from_str(&text).unwrap();
        assert!(record.data_encrypted.is_none());

        let restored = Block::from_record(record).unwrap();
        assert_eq!(restored, block);
        assert_eq!(restored.calculate_hash(), block.hash());
    }

    #[test]
    fn test_record_field_order_is_irrelevant() {
        let mut block = sample_block();
        block.seal(1);
        let record = block.to_record();
        let shuffled = format!(
            r#"{{"hash":"{}","nonce":{},"previous_hash":"{}","data":{},"timestamp":{},"index":{}}}"#,
            record.hash, record.nonce, record.previous_hash, record.data, record.timestamp, record.index
        );
        let restored = Block::from_record(serde_json::from_str(&shuffled).unwrap()).unwrap();
        assert_eq!(restored.calculate_hash(), block.hash());
    }

    #[test]
    fn test_genesis_payload() {
        let payload = Payload::genesis();
        assert_eq!(payload.kind(), Some(RecordKind::Genesis));
        assert_eq!(payload.data["message"], GENESIS_MESSAGE);
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("00", 3));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn sealed_hash_has_leading_zeros(difficulty in 1usize..=2, seed in any::<u32>()) {
            let mut block = Block::new(
                3,
                seed as f64,
                Payload::new("general", json!({"seed": seed})),
                GENESIS_PREVIOUS_HASH,
            );
            block.seal(difficulty);
            prop_assert!(block.hash().chars().take(difficulty).all(|c| c == '0'));
            prop_assert_eq!(block.hash(), block.calculate_hash());
        }
    }
}
