use ballot_ledger::storage::SNAPSHOT_FILE;
use ballot_ledger::{
    voter_hash, JsonFileStore, LedgerError, LedgerResult, LedgerService, MemoryStore, Snapshot,
    SnapshotStore,
};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

fn memory_ledger() -> (Arc<MemoryStore>, LedgerService) {
    let store = Arc::new(MemoryStore::new());
    let ledger = LedgerService::open(store.clone(), 1).unwrap();
    (store, ledger)
}

/// Store whose saves can be made to fail or to stall until released.
#[derive(Default)]
struct ControlledStore {
    inner: MemoryStore,
    fail_saves: AtomicBool,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl ControlledStore {
    /// The next save signals `entered`, then waits for a message on the
    /// returned sender before writing.
    fn hold_next_save(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.gate.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }
}

impl SnapshotStore for ControlledStore {
    fn load(&self) -> Option<Snapshot> {
        self.inner.load()
    }

    fn save(&self, snapshot: &Snapshot) -> LedgerResult<()> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.send(()).unwrap();
            release.recv().unwrap();
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(LedgerError::Persistence("store rejected write".into()));
        }
        self.inner.save(snapshot)
    }

    fn discard(&self) -> LedgerResult<()> {
        self.inner.discard()
    }
}

#[tokio::test]
async fn vote_tally_and_duplicate_rejection() {
    let (_, ledger) = memory_ledger();
    assert!(ledger.tally("E1").is_empty());

    let index = ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap();
    assert_eq!(index, 1);
    assert_eq!(ledger.tally("E1").get("C1"), Some(&1));

    let err = ledger
        .submit_vote("alice", "tok-a", "C2", "E1")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateVoter { .. }));
    assert_eq!(ledger.snapshot().len(), 2);
    assert_eq!(ledger.tally("E1").len(), 1);
    assert_eq!(ledger.tally("E1").get("C1"), Some(&1));
}

#[tokio::test]
async fn chain_stays_valid_and_sealed_after_every_vote() {
    let (_, ledger) = memory_ledger();
    for (i, voter) in ["v1", "v2", "v3", "v4"].iter().enumerate() {
        let election = if i % 2 == 0 { "E1" } else { "E2" };
        ledger.submit_vote(voter, "tok", "C1", election).await.unwrap();
        let report = ledger.audit_chain();
        assert!(report.is_valid);
        assert_eq!(report.chain.len(), i + 2);
    }
    let chain = ledger.snapshot();
    assert!(chain.blocks().iter().skip(1).all(|b| b.hash.starts_with('0')));
    assert_eq!(ledger.tally("E1").get("C1"), Some(&2));
    assert_eq!(ledger.tally("E2").get("C1"), Some(&2));
}

#[tokio::test]
async fn verify_finds_ballot_without_revealing_choice() {
    let (_, ledger) = memory_ledger();
    ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap();

    let receipt = ledger.verify("alice", "tok-a", "E1");
    assert!(receipt.exists);
    assert_eq!(receipt.block_index, Some(1));
    assert_eq!(
        receipt.block_hash.as_deref(),
        Some(ledger.snapshot().blocks()[1].hash.as_str())
    );
    let json = serde_json::to_string(&receipt).unwrap();
    assert!(!json.contains("C1"));

    assert!(!ledger.verify("alice", "wrong-token", "E1").exists);
    assert!(ledger.has_voted("alice", "tok-a", "E1"));
    assert!(!ledger.has_voted("alice", "tok-a", "E2"));
}

#[tokio::test]
async fn ledger_does_not_store_raw_voter_ids() {
    let (store, ledger) = memory_ledger();
    ledger.submit_vote("alice@example.org", "tok-a", "C1", "E1").await.unwrap();
    let saved = serde_json::to_string(&store.current().unwrap()).unwrap();
    assert!(!saved.contains("alice@example.org"));
    assert!(saved.contains(&voter_hash("alice@example.org", "tok-a")));
}

#[tokio::test]
async fn failed_save_does_not_commit_the_vote() {
    let store = Arc::new(ControlledStore::default());
    let ledger = LedgerService::open(store.clone(), 1).unwrap();

    store.fail_saves.store(true, Ordering::SeqCst);
    let err = ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap_err();
    assert!(matches!(err, LedgerError::Persistence(_)));
    assert_eq!(ledger.snapshot().len(), 1);
    assert!(!ledger.has_voted("alice", "tok-a", "E1"));

    store.fail_saves.store(false, Ordering::SeqCst);
    assert_eq!(ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap(), 1);
    assert_eq!(store.inner.current().unwrap().chain.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reads_proceed_while_a_write_is_in_flight() {
    let store = Arc::new(ControlledStore::default());
    let ledger = Arc::new(LedgerService::open(store.clone(), 1).unwrap());
    let (entered, release) = store.hold_next_save();

    let writer = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move { ledger.submit_vote("alice", "tok-a", "C1", "E1").await })
    };
    tokio::task::spawn_blocking(move || entered.recv())
        .await
        .unwrap()
        .unwrap();

    // The block is mined and its save is stalled; readers see the prior state.
    assert!(ledger.tally("E1").is_empty());
    let report = ledger.audit_chain();
    assert!(report.is_valid);
    assert_eq!(report.chain.len(), 1);
    assert!(!ledger.verify("alice", "tok-a", "E1").exists);

    release.send(()).unwrap();
    assert_eq!(writer.await.unwrap().unwrap(), 1);
    assert_eq!(ledger.tally("E1").get("C1"), Some(&1));
    assert!(ledger.verify("alice", "tok-a", "E1").exists);
}

#[tokio::test]
async fn restart_restores_chain_and_registry() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = {
        let ledger =
            LedgerService::open(Arc::new(JsonFileStore::new(dir.path()).unwrap()), 1).unwrap();
        ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap();
        ledger.submit_vote("bob", "tok-b", "C2", "E1").await.unwrap();
        ledger.snapshot().blocks().to_vec()
    };

    let reopened =
        LedgerService::open(Arc::new(JsonFileStore::new(dir.path()).unwrap()), 1).unwrap();
    assert_eq!(reopened.snapshot().blocks(), blocks.as_slice());
    assert!(reopened.audit_chain().is_valid);
    let err = reopened
        .submit_vote("bob", "tok-b", "C1", "E1")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateVoter { .. }));
}

#[tokio::test]
async fn fresh_ledger_saves_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path()).unwrap();
    let ledger = LedgerService::open(Arc::new(store), 1).unwrap();
    let saved = JsonFileStore::new(dir.path()).unwrap().load().unwrap();
    assert_eq!(saved.chain, ledger.snapshot().blocks().to_vec());
    assert!(saved.voted_addresses.is_empty());
}

#[tokio::test]
async fn corrupt_snapshot_falls_back_to_genesis() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(SNAPSHOT_FILE), "garbage").unwrap();

    let ledger =
        LedgerService::open(Arc::new(JsonFileStore::new(dir.path()).unwrap()), 1).unwrap();
    assert_eq!(ledger.snapshot().len(), 1);
    assert!(ledger.is_writable());
    assert!(dir.path().join("blockchain.json.corrupt").exists());
    assert_eq!(ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap(), 1);
}

#[tokio::test]
async fn tampered_snapshot_loads_but_refuses_writes() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger =
            LedgerService::open(Arc::new(JsonFileStore::new(dir.path()).unwrap()), 1).unwrap();
        ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap();
        ledger.submit_vote("bob", "tok-b", "C2", "E1").await.unwrap();
    }

    let path = dir.path().join(SNAPSHOT_FILE);
    let mut raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    raw["chain"][2]["hash"] = serde_json::Value::String("0".repeat(64));
    fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

    let ledger =
        LedgerService::open(Arc::new(JsonFileStore::new(dir.path()).unwrap()), 1).unwrap();
    assert_eq!(ledger.snapshot().len(), 3);
    assert!(!ledger.audit_chain().is_valid);
    assert!(!ledger.is_writable());
    let err = ledger
        .submit_vote("carol", "tok-c", "C1", "E1")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::IntegrityViolation));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_admit_exactly_one() {
    let (_, ledger) = memory_ledger();
    let ledger = Arc::new(ledger);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .submit_vote("alice", "tok-a", &format!("C{}", i), "E1")
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(LedgerError::DuplicateVoter { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(ledger.snapshot().len(), 2);
    assert!(ledger.audit_chain().is_valid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_voters_all_land_in_order() {
    let (_, ledger) = memory_ledger();
    let ledger = Arc::new(ledger);

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .submit_vote(&format!("voter-{}", i), "tok", "C1", "E1")
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let chain = ledger.snapshot();
    assert_eq!(chain.len(), 7);
    assert!(chain.validate_chain());
    assert_eq!(ledger.tally("E1").get("C1"), Some(&6));
}

#[tokio::test]
async fn structurally_damaged_snapshot_is_kept_aside() {
    let dir = tempfile::tempdir().unwrap();
    {
        let ledger =
            LedgerService::open(Arc::new(JsonFileStore::new(dir.path()).unwrap()), 1).unwrap();
        ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap();
        ledger.submit_vote("bob", "tok-b", "C2", "E1").await.unwrap();
    }

    let path = dir.path().join(SNAPSHOT_FILE);
    let mut raw: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    raw["chain"][2]["index"] = serde_json::json!(7);
    fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

    let ledger =
        LedgerService::open(Arc::new(JsonFileStore::new(dir.path()).unwrap()), 1).unwrap();
    assert_eq!(ledger.snapshot().len(), 1);

    let kept: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("blockchain.json.corrupt")).unwrap())
            .unwrap();
    assert_eq!(kept["chain"].as_array().unwrap().len(), 3);
    assert_eq!(kept, raw);
}

#[tokio::test]
async fn rejected_snapshot_is_discarded_before_genesis_save() {
    let (store, ledger) = memory_ledger();
    ledger.submit_vote("alice", "tok-a", "C1", "E1").await.unwrap();
    let mut damaged = store.current().unwrap();
    damaged.chain[0].transactions.clear();
    drop(ledger);

    let store = Arc::new(MemoryStore::with_snapshot(damaged.clone()));
    let reopened = LedgerService::open(store.clone(), 1).unwrap();
    assert_eq!(reopened.snapshot().len(), 1);
    assert_eq!(store.discarded(), vec![damaged]);
    assert_eq!(store.current().unwrap().chain.len(), 1);
}
