//! JSON file backed registries
//!
//! The number registry keeps its records in memory and rewrites the whole file
//! after every mutation: serialize to a temp file, fsync, then rename over the
//! old file. A crash leaves either the old or the new file, never a torn one.
//!
//! ```text
//! data/uuidtonum.json       [{uuid, kind, number, inUse, createdAt, lastUsedAt}, ...]
//! data/networkstatus.json   [{uuid, bridgeNum}, ...]
//! ```

use super::memory::MemoryNumberRegistry;
use super::{NetworkStatusRecord, NetworkStatusRegistry, NumberRecord, NumberRegistry};
use crate::allocator::BridgeNum;
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Number registry persisted as a JSON array
///
/// Between `begin_batch` and `commit_batch` mutations only touch memory and
/// the file is rewritten once at commit.
#[derive(Debug)]
pub struct FileNumberRegistry {
    path: PathBuf,
    records: MemoryNumberRegistry,
    batching: bool,
    dirty: bool,
}

impl FileNumberRegistry {
    /// Open a registry file, starting empty if it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Registry(format!("Failed to create registry directory: {}", e))
            })?;
        }

        let records: Vec<NumberRecord> = if path.exists() {
            read_json(&path)?
        } else {
            info!(path = ?path, "No number registry found, starting fresh");
            Vec::new()
        };

        info!(path = ?path, records = records.len(), "Opened number registry");
        Ok(Self {
            path,
            records: MemoryNumberRegistry::with_records(records),
            batching: false,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, uuid: &Uuid, kind: &str) -> Option<&NumberRecord> {
        self.records.get(uuid, kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn write_through(&mut self) -> Result<()> {
        if self.batching {
            self.dirty = true;
            return Ok(());
        }
        self.persist()
    }

    /// Rewrite the file from the in-memory records
    fn persist(&mut self) -> Result<()> {
        // The journal is only interesting for in-memory use
        self.records.clear_journal();

        let records = self.records.list_all()?;
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| Error::Registry(format!("Failed to serialize records: {}", e)))?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::Registry(format!("Failed to create temp registry: {}", e)))?;

        file.write_all(&json)
            .map_err(|e| Error::Registry(format!("Failed to write registry: {}", e)))?;
        file.sync_all()
            .map_err(|e| Error::Registry(format!("Failed to sync registry: {}", e)))?;

        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::Registry(format!("Failed to rename registry: {}", e)))?;

        debug!(path = ?self.path, records = records.len(), "Persisted number registry");
        Ok(())
    }
}

impl NumberRegistry for FileNumberRegistry {
    fn list_all(&self) -> Result<Vec<NumberRecord>> {
        self.records.list_all()
    }

    fn allocate(&mut self, uuid: Uuid, kind: &str, number: BridgeNum, fresh: bool) -> Result<()> {
        self.records.allocate(uuid, kind, number, fresh)?;
        self.write_through()
    }

    fn update(&mut self, uuid: Uuid, kind: &str, number: BridgeNum) -> Result<()> {
        self.records.update(uuid, kind, number)?;
        self.write_through()
    }

    fn reserve(&mut self, uuid: Uuid, number: BridgeNum, kind: &str) -> Result<()> {
        self.records.reserve(uuid, number, kind)?;
        self.write_through()
    }

    fn free(&mut self, uuid: Uuid, kind: &str) -> Result<()> {
        self.records.free(uuid, kind)?;
        self.write_through()
    }

    fn delete(&mut self, uuid: Uuid, kind: &str) -> Result<()> {
        self.records.delete(uuid, kind)?;
        self.write_through()
    }

    fn begin_batch(&mut self) {
        self.batching = true;
    }

    fn commit_batch(&mut self) -> Result<()> {
        self.batching = false;
        if !self.dirty {
            return Ok(());
        }
        self.dirty = false;
        self.persist()
    }
}

/// Network status loaded from a JSON array
#[derive(Debug, Clone)]
pub struct FileNetworkStatus {
    path: PathBuf,
}

impl FileNetworkStatus {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl NetworkStatusRegistry for FileNetworkStatus {
    /// A missing file means nothing has been published yet
    fn list_all(&self) -> Result<Vec<NetworkStatusRecord>> {
        if !self.path.exists() {
            debug!(path = ?self.path, "No network status file");
            return Ok(Vec::new());
        }
        read_json(&self.path)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .map_err(|e| Error::Registry(format!("Failed to open {}: {}", path.display(), e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::Registry(format!("Failed to parse {}: {}", path.display(), e)))
}
