//! The façade the HTTP layer talks to.
//!
//! Writers are serialised by an async mutex held for the whole
//! check/build/mine/persist/publish sequence. Readers never take that lock:
//! they clone an `Arc` of the last published chain, so mining does not stall
//! audit, tally or verify requests. A new chain is published only after its
//! snapshot has been saved.

use crate::block::sha256_hex;
use crate::chain::Chain;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{AuditReport, Block, Tally, VoteReceipt};
use crate::pow;
use crate::storage::SnapshotStore;
use log::{debug, error, info, warn};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;

/// `SHA256(voterId + ":" + secretToken)` as lowercase hex.
pub fn voter_hash(voter_id: &str, secret_token: &str) -> String {
    sha256_hex(&format!("{}:{}", voter_id, secret_token))
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

pub struct LedgerService {
    chain: RwLock<Arc<Chain>>,
    writer: Mutex<()>,
    store: Arc<dyn SnapshotStore>,
    writable: bool,
}

impl LedgerService {
    /// Restores the chain from `store`, or starts a fresh genesis-only chain
    /// (and saves it) when there is no usable snapshot. A snapshot that is
    /// rejected on restore is discarded through the store first, so the
    /// genesis save never overwrites it.
    pub fn open(store: Arc<dyn SnapshotStore>, difficulty: usize) -> LedgerResult<Self> {
        let restored = match store.load() {
            Some(snapshot) => match Chain::from_snapshot(snapshot, difficulty) {
                Ok(chain) => Some(chain),
                Err(err) => {
                    warn!("ignoring snapshot: {}", err);
                    store.discard()?;
                    None
                }
            },
            None => None,
        };

        let chain = match restored {
            Some(chain) => chain,
            None => {
                let chain = Chain::new(difficulty);
                store.save(&chain.to_snapshot())?;
                info!("initialised new ledger with genesis block {}", short(&chain.tip().hash));
                chain
            }
        };

        let writable = chain.validate_chain();
        if writable {
            info!("ledger opened: {} blocks, difficulty {}", chain.len(), difficulty);
        } else {
            error!(
                "ledger opened with {} blocks but failed integrity validation; new votes will be refused",
                chain.len()
            );
        }

        Ok(LedgerService {
            chain: RwLock::new(Arc::new(chain)),
            writer: Mutex::new(()),
            store,
            writable,
        })
    }

    /// The last persisted chain.
    pub fn snapshot(&self) -> Arc<Chain> {
        match self.chain.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    fn publish(&self, chain: Chain) {
        let chain = Arc::new(chain);
        match self.chain.write() {
            Ok(mut guard) => *guard = chain,
            Err(poisoned) => *poisoned.into_inner() = chain,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Records a ballot and returns the index of the block holding it.
    pub async fn submit_vote(
        &self,
        voter_id: &str,
        secret_token: &str,
        candidate_id: &str,
        election_id: &str,
    ) -> LedgerResult<u64> {
        let hash = voter_hash(voter_id, secret_token);
        let block = self.submit_hashed_vote(&hash, candidate_id, election_id).await?;
        Ok(block.index)
    }

    /// Same as `submit_vote` for callers that already hold the voter digest.
    pub async fn submit_hashed_vote(
        &self,
        voter_hash: &str,
        candidate_id: &str,
        election_id: &str,
    ) -> LedgerResult<Block> {
        let _writer = self.writer.lock().await;
        if !self.writable {
            return Err(LedgerError::IntegrityViolation);
        }

        let current = self.snapshot();
        let candidate = match current.prepare_vote(
            voter_hash,
            candidate_id,
            election_id,
            crate::chain::now_millis(),
        ) {
            Ok(block) => block,
            Err(err) => {
                info!(
                    "rejected ballot from {} for election {}: {}",
                    short(voter_hash),
                    election_id,
                    err
                );
                return Err(err);
            }
        };

        let difficulty = current.difficulty();
        let started = Instant::now();
        let sealed = tokio::task::spawn_blocking(move || {
            let mut block = candidate;
            pow::mine(&mut block, difficulty);
            block
        })
        .await
        .map_err(|e| LedgerError::Worker(e.to_string()))?;
        debug!(
            "mined block {} nonce {} in {:?}",
            sealed.index,
            sealed.nonce,
            started.elapsed()
        );

        let mut next = Chain::clone(&current);
        next.append(sealed.clone())?;

        let snapshot = next.to_snapshot();
        let store = Arc::clone(&self.store);
        let saved = tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .map_err(|e| LedgerError::Worker(e.to_string()))?;
        if let Err(err) = saved {
            error!("block {} not committed: {}", sealed.index, err);
            return Err(err);
        }

        self.publish(next);
        info!("appended block {} ({})", sealed.index, short(&sealed.hash));
        Ok(sealed)
    }

    pub fn audit_chain(&self) -> AuditReport {
        let chain = self.snapshot();
        AuditReport {
            chain: chain.export_audit(),
            is_valid: chain.validate_chain(),
        }
    }

    pub fn tally(&self, election_id: &str) -> Tally {
        self.snapshot().tally_votes(election_id)
    }

    pub fn verify(&self, voter_id: &str, secret_token: &str, election_id: &str) -> VoteReceipt {
        self.snapshot()
            .find_voter_record(&voter_hash(voter_id, secret_token), election_id)
    }

    pub fn has_voted(&self, voter_id: &str, secret_token: &str, election_id: &str) -> bool {
        self.verify(voter_id, secret_token, election_id).exists
    }
}
