use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single ballot as it is stored in the ledger. `voter_hash` is the
/// anonymised voter digest, never the raw identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VoteRecord {
    pub voter_hash: String,
    pub candidate_id: String,
    pub election_id: String,
    pub timestamp: u64,
}

/// Contentless record carried only by block 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisMarker {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
}

impl Default for GenesisMarker {
    fn default() -> Self {
        GenesisMarker {
            kind: "genesis".to_string(),
            data: "Ballot Box Genesis".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transaction {
    Vote(VoteRecord),
    Genesis(GenesisMarker),
}

impl Transaction {
    pub fn as_vote(&self) -> Option<&VoteRecord> {
        match self {
            Transaction::Vote(vote) => Some(vote),
            Transaction::Genesis(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

/// Vote-content-free view of one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub index: u64,
    pub timestamp: u64,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub chain: Vec<AuditEntry>,
    pub is_valid: bool,
}

/// Result of a self-verification lookup. Deliberately has no candidate field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl VoteReceipt {
    pub fn not_found() -> Self {
        VoteReceipt {
            exists: false,
            block_index: None,
            block_hash: None,
            timestamp: None,
        }
    }
}

/// candidateId -> count, ordered so responses are stable.
pub type Tally = BTreeMap<String, u64>;
