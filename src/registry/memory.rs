//! In-memory registries
//!
//! Records keep insertion order so recovery sees them in a predictable
//! sequence, and every mutating call is appended to a journal that tests can
//! inspect.

use super::{NetworkStatusRecord, NetworkStatusRegistry, NumberRecord, NumberRegistry};
use crate::allocator::BridgeNum;
use crate::error::{Error, Result};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

/// A mutating call made against a number registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Allocate {
        uuid: Uuid,
        kind: String,
        number: BridgeNum,
        fresh: bool,
    },
    Update {
        uuid: Uuid,
        kind: String,
        number: BridgeNum,
    },
    Reserve {
        uuid: Uuid,
        number: BridgeNum,
        kind: String,
    },
    Free {
        uuid: Uuid,
        kind: String,
    },
    Delete {
        uuid: Uuid,
        kind: String,
    },
}

/// In-memory number registry
#[derive(Debug, Clone, Default)]
pub struct MemoryNumberRegistry {
    records: Vec<NumberRecord>,
    journal: Vec<RegistryCall>,
}

impl MemoryNumberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records, kept in the given order
    pub fn with_records(records: Vec<NumberRecord>) -> Self {
        Self {
            records,
            journal: Vec::new(),
        }
    }

    pub fn get(&self, uuid: &Uuid, kind: &str) -> Option<&NumberRecord> {
        self.records.iter().find(|r| r.matches(uuid, kind))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Calls made so far, oldest first
    pub fn journal(&self) -> &[RegistryCall] {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    fn position(&self, uuid: &Uuid, kind: &str) -> Option<usize> {
        self.records.iter().position(|r| r.matches(uuid, kind))
    }
}

impl NumberRegistry for MemoryNumberRegistry {
    fn list_all(&self) -> Result<Vec<NumberRecord>> {
        Ok(self.records.clone())
    }

    fn allocate(&mut self, uuid: Uuid, kind: &str, number: BridgeNum, fresh: bool) -> Result<()> {
        self.journal.push(RegistryCall::Allocate {
            uuid,
            kind: kind.to_string(),
            number,
            fresh,
        });

        match self.position(&uuid, kind) {
            Some(idx) => self.records[idx].activate(number, fresh),
            None => self
                .records
                .push(NumberRecord::new(uuid, kind, number.into(), true)),
        }
        Ok(())
    }

    fn update(&mut self, uuid: Uuid, kind: &str, number: BridgeNum) -> Result<()> {
        self.journal.push(RegistryCall::Update {
            uuid,
            kind: kind.to_string(),
            number,
        });

        let idx = self
            .position(&uuid, kind)
            .ok_or_else(|| Error::Registry(format!("No {} record for {}", kind, uuid)))?;
        let record = &mut self.records[idx];
        record.number = number.into();
        record.in_use = true;
        record.last_used_at = Utc::now();
        Ok(())
    }

    fn reserve(&mut self, uuid: Uuid, number: BridgeNum, kind: &str) -> Result<()> {
        self.journal.push(RegistryCall::Reserve {
            uuid,
            number,
            kind: kind.to_string(),
        });

        match self.position(&uuid, kind) {
            Some(idx) => {
                let record = &mut self.records[idx];
                record.number = number.into();
                record.in_use = false;
            }
            None => self
                .records
                .push(NumberRecord::new(uuid, kind, number.into(), false)),
        }
        Ok(())
    }

    fn free(&mut self, uuid: Uuid, kind: &str) -> Result<()> {
        self.journal.push(RegistryCall::Free {
            uuid,
            kind: kind.to_string(),
        });

        match self.position(&uuid, kind) {
            Some(idx) => self.records[idx].in_use = false,
            None => debug!(%uuid, kind, "Free of unknown number record ignored"),
        }
        Ok(())
    }

    fn delete(&mut self, uuid: Uuid, kind: &str) -> Result<()> {
        self.journal.push(RegistryCall::Delete {
            uuid,
            kind: kind.to_string(),
        });
        self.records.retain(|r| !r.matches(&uuid, kind));
        Ok(())
    }
}

/// In-memory network status source
#[derive(Debug, Clone, Default)]
pub struct MemoryNetworkStatus {
    records: Vec<NetworkStatusRecord>,
}

impl MemoryNetworkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<NetworkStatusRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, uuid: Uuid, bridge_num: u32) {
        self.records.push(NetworkStatusRecord::new(uuid, bridge_num));
    }
}

impl NetworkStatusRegistry for MemoryNetworkStatus {
    fn list_all(&self) -> Result<Vec<NetworkStatusRecord>> {
        Ok(self.records.clone())
    }
}
