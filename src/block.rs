use crate::models::{Block, GenesisMarker, Transaction};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// previousHash carried by block 0.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

pub(crate) fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn json_string(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

/// Canonical text form of a transaction list, shared by hashing and tests.
///
/// Records are written as compact JSON objects with a fixed key order:
/// `voterHash, candidateId, electionId, timestamp` for votes and
/// `type, data` for the genesis marker. No whitespace is emitted.
pub fn canonical_transactions(transactions: &[Transaction]) -> String {
    let mut out = String::from("[");
    for (i, tx) in transactions.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match tx {
            Transaction::Vote(vote) => {
                out.push_str("{\"voterHash\":");
                out.push_str(&json_string(&vote.voter_hash));
                out.push_str(",\"candidateId\":");
                out.push_str(&json_string(&vote.candidate_id));
                out.push_str(",\"electionId\":");
                out.push_str(&json_string(&vote.election_id));
                out.push_str(",\"timestamp\":");
                out.push_str(&vote.timestamp.to_string());
                out.push('}');
            }
            Transaction::Genesis(marker) => {
                out.push_str("{\"type\":");
                out.push_str(&json_string(&marker.kind));
                out.push_str(",\"data\":");
                out.push_str(&json_string(&marker.data));
                out.push('}');
            }
        }
    }
    out.push(']');
    out
}

impl Block {
    /// Builds an unsealed block with `nonce = 0`.
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            transactions,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn genesis(timestamp: u64) -> Self {
        Block::new(
            0,
            timestamp,
            vec![Transaction::Genesis(GenesisMarker::default())],
            GENESIS_PREVIOUS_HASH,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Block 0 must carry the sentinel previous hash and exactly one marker.
    pub fn has_genesis_shape(&self) -> bool {
        self.index == 0
            && self.previous_hash == GENESIS_PREVIOUS_HASH
            && self.transactions == [Transaction::Genesis(GenesisMarker::default())]
    }

    pub fn calculate_hash(&self) -> String {
        let tx_digest = sha256_hex(&canonical_transactions(&self.transactions));
        sha256_hex(&format!(
            "{}{}{}{}{}",
            self.index, self.timestamp, tx_digest, self.previous_hash, self.nonce
        ))
    }

    /// Only the miner calls this; appended blocks are never resealed.
    pub(crate) fn reseal(&mut self, nonce: u64) {
        self.nonce = nonce;
        self.hash = self.calculate_hash();
    }

    /// Recomputes the digest and compares it to the stored hash. Linkage is
    /// checked by the chain.
    pub fn validate(&self) -> bool {
        self.hash == self.calculate_hash()
    }
}
