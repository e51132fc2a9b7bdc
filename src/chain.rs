use crate::error::{LedgerError, LedgerResult};
use crate::models::{AuditEntry, Block, Tally, Transaction, VoteReceipt, VoteRecord};
use crate::pow;
use crate::storage::Snapshot;
use log::warn;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Registry key for one ballot. Uniqueness is per election, so the key
/// carries both the voter digest and the election id.
pub fn registry_key(voter_hash: &str, election_id: &str) -> String {
    format!("{}:{}", voter_hash, election_id)
}

fn bounded_difficulty(difficulty: usize) -> usize {
    if difficulty > pow::MAX_DIFFICULTY {
        warn!(
            "difficulty {} exceeds {}, clamping",
            difficulty,
            pow::MAX_DIFFICULTY
        );
        return pow::MAX_DIFFICULTY;
    }
    difficulty
}

/// The ordered blocks plus the voter-uniqueness registry. Never empty.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    used_voters: BTreeSet<String>,
    difficulty: usize,
}

impl Chain {
    pub fn new(difficulty: usize) -> Self {
        Chain {
            blocks: vec![Block::genesis(now_millis())],
            used_voters: BTreeSet::new(),
            difficulty: bounded_difficulty(difficulty),
        }
    }

    /// Rebuilds a chain from a persisted snapshot.
    ///
    /// Structural damage (empty chain, gaps in the index sequence, a wrong
    /// genesis) is reported as `CorruptSnapshot`. Hash mismatches are not:
    /// a tampered chain still loads so `validate_chain` can report it.
    pub fn from_snapshot(snapshot: Snapshot, difficulty: usize) -> LedgerResult<Self> {
        let Snapshot {
            chain: blocks,
            voted_addresses,
        } = snapshot;

        let genesis = blocks
            .first()
            .ok_or_else(|| LedgerError::CorruptSnapshot("chain is empty".into()))?;
        if !genesis.has_genesis_shape() {
            return Err(LedgerError::CorruptSnapshot(
                "first block is not a genesis block".into(),
            ));
        }
        if let Some((i, block)) = blocks
            .iter()
            .enumerate()
            .find(|(i, block)| block.index != *i as u64)
        {
            return Err(LedgerError::CorruptSnapshot(format!(
                "block at position {} has index {}",
                i, block.index
            )));
        }

        let mut used_voters = BTreeSet::new();
        for vote in blocks.iter().skip(1).flat_map(|b| b.transactions.iter()) {
            if let Some(vote) = vote.as_vote() {
                used_voters.insert(registry_key(&vote.voter_hash, &vote.election_id));
            }
        }
        let persisted: BTreeSet<String> = voted_addresses.into_iter().collect();
        if persisted != used_voters {
            warn!(
                "persisted voter registry ({} entries) disagrees with chain contents ({} entries); using chain contents",
                persisted.len(),
                used_voters.len()
            );
        }

        Ok(Chain {
            blocks,
            used_voters,
            difficulty: bounded_difficulty(difficulty),
        })
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            chain: self.blocks.clone(),
            voted_addresses: self.used_voters.iter().cloned().collect(),
        }
    }

    pub fn tip(&self) -> &Block {
        // Invariant: blocks always holds at least the genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false; the chain holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn has_voted(&self, voter_hash: &str, election_id: &str) -> bool {
        self.used_voters
            .contains(&registry_key(voter_hash, election_id))
    }

    /// Builds the next, not yet mined, block for a ballot.
    pub fn prepare_vote(
        &self,
        voter_hash: &str,
        candidate_id: &str,
        election_id: &str,
        timestamp: u64,
    ) -> LedgerResult<Block> {
        if self.has_voted(voter_hash, election_id) {
            return Err(LedgerError::DuplicateVoter {
                election_id: election_id.to_string(),
            });
        }
        let vote = VoteRecord {
            voter_hash: voter_hash.to_string(),
            candidate_id: candidate_id.to_string(),
            election_id: election_id.to_string(),
            timestamp,
        };
        let tip = self.tip();
        Ok(Block::new(
            tip.index + 1,
            timestamp,
            vec![Transaction::Vote(vote)],
            tip.hash.clone(),
        ))
    }

    /// Appends a sealed block and records its voters.
    pub fn append(&mut self, block: Block) -> LedgerResult<()> {
        let tip = self.tip();
        if block.index != tip.index + 1 {
            return Err(LedgerError::InvalidBlock(format!(
                "expected index {}, got {}",
                tip.index + 1,
                block.index
            )));
        }
        if block.previous_hash != tip.hash {
            return Err(LedgerError::InvalidBlock(
                "previous hash does not match tip".into(),
            ));
        }
        if !block.validate() {
            return Err(LedgerError::InvalidBlock("hash does not match contents".into()));
        }
        if !pow::meets_difficulty(&block.hash, self.difficulty) {
            return Err(LedgerError::InvalidBlock(format!(
                "hash lacks {} leading zeros",
                self.difficulty
            )));
        }

        let mut keys = BTreeSet::new();
        for tx in &block.transactions {
            let vote = tx
                .as_vote()
                .ok_or_else(|| LedgerError::InvalidBlock("genesis marker outside block 0".into()))?;
            let key = registry_key(&vote.voter_hash, &vote.election_id);
            if self.used_voters.contains(&key) || !keys.insert(key) {
                return Err(LedgerError::DuplicateVoter {
                    election_id: vote.election_id.clone(),
                });
            }
        }
        if keys.is_empty() {
            return Err(LedgerError::InvalidBlock("block carries no votes".into()));
        }

        self.used_voters.extend(keys);
        self.blocks.push(block);
        Ok(())
    }

    /// Check, build, mine and append in one step. Not persisted; the
    /// ledger service owns persistence.
    pub fn submit_vote(
        &mut self,
        voter_hash: &str,
        candidate_id: &str,
        election_id: &str,
    ) -> LedgerResult<Block> {
        let mut block = self.prepare_vote(voter_hash, candidate_id, election_id, now_millis())?;
        pow::mine(&mut block, self.difficulty);
        self.append(block.clone())?;
        Ok(block)
    }

    pub fn validate_chain(&self) -> bool {
        if !self.blocks.first().is_some_and(Block::has_genesis_shape) {
            return false;
        }

        self.blocks.iter().enumerate().all(|(i, block)| {
            if block.index != i as u64 || !block.validate() {
                return false;
            }
            if i == 0 {
                return true;
            }
            block.previous_hash == self.blocks[i - 1].hash
                && block.transactions.iter().all(|tx| tx.as_vote().is_some())
        })
    }

    fn votes(&self) -> impl Iterator<Item = (&Block, &VoteRecord)> {
        self.blocks
            .iter()
            .filter(|block| !block.is_genesis())
            .flat_map(|block| {
                block
                    .transactions
                    .iter()
                    .filter_map(move |tx| tx.as_vote().map(|vote| (block, vote)))
            })
    }

    pub fn tally_votes(&self, election_id: &str) -> Tally {
        let mut tally = Tally::new();
        for (_, vote) in self.votes().filter(|(_, v)| v.election_id == election_id) {
            *tally.entry(vote.candidate_id.clone()).or_insert(0) += 1;
        }
        tally
    }

    pub fn find_voter_record(&self, voter_hash: &str, election_id: &str) -> VoteReceipt {
        self.votes()
            .find(|(_, vote)| vote.voter_hash == voter_hash && vote.election_id == election_id)
            .map(|(block, vote)| VoteReceipt {
                exists: true,
                block_index: Some(block.index),
                block_hash: Some(block.hash.clone()),
                timestamp: Some(vote.timestamp),
            })
            .unwrap_or_else(VoteReceipt::not_found)
    }

    pub fn export_audit(&self) -> Vec<AuditEntry> {
        self.blocks
            .iter()
            .map(|block| AuditEntry {
                index: block.index,
                timestamp: block.timestamp,
                previous_hash: block.previous_hash.clone(),
                hash: block.hash.clone(),
                nonce: block.nonce,
                transaction_count: block.transactions.len(),
            })
            .collect()
    }
}
