use crate::chain::now_millis;
use crate::error::{LedgerError, LedgerResult};
use crate::models::Block;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const SNAPSHOT_FILE: &str = "blockchain.json";

/// Durable form of the ledger: `{ "chain": [...], "votedAddresses": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub chain: Vec<Block>,
    #[serde(default)]
    pub voted_addresses: Vec<String>,
}

/// Load/save contract the ledger relies on for recovery.
///
/// `load` returns `None` both when nothing was saved yet and when the stored
/// data cannot be read back; it never fails. `save` replaces the previous
/// snapshot in full. `discard` sets a loaded but unusable snapshot aside so a
/// following `save` does not destroy it.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Option<Snapshot>;
    fn save(&self, snapshot: &Snapshot) -> LedgerResult<()>;
    fn discard(&self) -> LedgerResult<()>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> LedgerResult<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self {
            path: data_dir.as_ref().join(SNAPSHOT_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a rejected snapshot goes. Earlier quarantined copies are kept.
    fn quarantine_path(&self) -> PathBuf {
        let target = self.path.with_extension("json.corrupt");
        if target.exists() {
            self.path
                .with_extension(format!("json.corrupt.{}", now_millis()))
        } else {
            target
        }
    }

    fn quarantine(&self) -> LedgerResult<()> {
        let target = self.quarantine_path();
        fs::rename(&self.path, &target)?;
        warn!("moved unusable snapshot to {}", target.display());
        Ok(())
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Option<Snapshot> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no snapshot at {}", self.path.display());
                return None;
            }
            Err(err) => {
                warn!("failed to read snapshot {}: {}", self.path.display(), err);
                return None;
            }
        };

        match serde_json::from_slice::<Snapshot>(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("snapshot {} is corrupt: {}", self.path.display(), err);
                if let Err(err) = self.quarantine() {
                    warn!("could not move unreadable snapshot aside: {}", err);
                }
                None
            }
        }
    }

    fn save(&self, snapshot: &Snapshot) -> LedgerResult<()> {
        let data = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| LedgerError::Persistence(e.to_string()))?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn discard(&self) -> LedgerResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        self.quarantine()
    }
}

/// In-process store for embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<Snapshot>>,
    discarded: Mutex<Vec<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        MemoryStore {
            snapshot: Mutex::new(Some(snapshot)),
            discarded: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|s| s.clone())
    }

    /// Snapshots set aside by `discard`, oldest first.
    pub fn discarded(&self) -> Vec<Snapshot> {
        self.discarded
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> LedgerError {
    LedgerError::Persistence("store lock poisoned".into())
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Option<Snapshot> {
        self.current()
    }

    fn save(&self, snapshot: &Snapshot) -> LedgerResult<()> {
        let mut slot = self.snapshot.lock().map_err(poisoned)?;
        *slot = Some(snapshot.clone());
        Ok(())
    }

    fn discard(&self) -> LedgerResult<()> {
        let taken = self.snapshot.lock().map_err(poisoned)?.take();
        if let Some(snapshot) = taken {
            self.discarded.lock().map_err(poisoned)?.push(snapshot);
        }
        Ok(())
    }
}
