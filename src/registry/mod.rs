//! External registries consumed by the allocator
//!
//! # Architecture
//!
//! ```text
//! BridgeNumAllocator
//!   ├─→ NumberRegistry          (read at recovery, written on every change)
//!   │     (uuid, kind) → {number, inUse, createdAt, lastUsedAt}
//!   └─→ NetworkStatusRegistry   (read once at recovery)
//!         uuid → bridgeNum
//! ```
//!
//! The allocator only talks to these traits. Two implementations ship with
//! the crate:
//! - **Memory**: insertion-ordered, journals every call (tests, embedding)
//! - **File**: JSON file rewritten atomically after each mutation or batch

pub mod file;
pub mod memory;

use crate::allocator::BridgeNum;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use file::{FileNetworkStatus, FileNumberRegistry};
pub use memory::{MemoryNetworkStatus, MemoryNumberRegistry, RegistryCall};

/// Persisted number record, keyed by identity and kind
///
/// One identity may hold records of several kinds; the allocator only ever
/// touches records of its own kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberRecord {
    pub uuid: Uuid,
    /// Number kind, e.g. `bridgeNum`
    pub kind: String,
    /// Raw persisted value; validated on recovery
    pub number: u32,
    pub in_use: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl NumberRecord {
    pub fn new(uuid: Uuid, kind: impl Into<String>, number: u32, in_use: bool) -> Self {
        let now = Utc::now();
        Self {
            uuid,
            kind: kind.into(),
            number,
            in_use,
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn matches(&self, uuid: &Uuid, kind: &str) -> bool {
        self.uuid == *uuid && self.kind == kind
    }

    /// Mark the record active with `number`
    ///
    /// `fresh` restarts the creation time; a promotion keeps it.
    pub(crate) fn activate(&mut self, number: BridgeNum, fresh: bool) {
        let now = Utc::now();
        self.number = number.into();
        self.in_use = true;
        self.last_used_at = now;
        if fresh {
            self.created_at = now;
        }
    }
}

/// Network status record as published for a network instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatusRecord {
    pub uuid: Uuid,
    pub bridge_num: u32,
}

impl NetworkStatusRecord {
    pub fn new(uuid: Uuid, bridge_num: u32) -> Self {
        Self { uuid, bridge_num }
    }
}

/// Persisted `(identity, kind)` → number registry
///
/// Mutations address exactly one record: the one matching both the identity
/// and the kind. Records of other kinds for the same identity are left alone.
pub trait NumberRegistry {
    /// All records, in the registry's iteration order
    fn list_all(&self) -> Result<Vec<NumberRecord>>;

    /// Record a new or promoted active assignment
    fn allocate(&mut self, uuid: Uuid, kind: &str, number: BridgeNum, fresh: bool) -> Result<()>;

    /// Re-affirm an already active assignment
    fn update(&mut self, uuid: Uuid, kind: &str, number: BridgeNum) -> Result<()>;

    /// Record a reserved, inactive assignment
    fn reserve(&mut self, uuid: Uuid, number: BridgeNum, kind: &str) -> Result<()>;

    /// Clear the in-use flag, leaving the record otherwise untouched
    fn free(&mut self, uuid: Uuid, kind: &str) -> Result<()>;

    /// Remove the record entirely
    fn delete(&mut self, uuid: Uuid, kind: &str) -> Result<()>;

    /// Start collecting mutations without writing them out
    ///
    /// Registries that write through on every change may hold writes until
    /// [`commit_batch`](Self::commit_batch). The default does nothing.
    fn begin_batch(&mut self) {}

    /// Write out everything collected since [`begin_batch`](Self::begin_batch)
    fn commit_batch(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Published network status, read at recovery time
pub trait NetworkStatusRegistry {
    fn list_all(&self) -> Result<Vec<NetworkStatusRecord>>;
}

impl<R: NumberRegistry + ?Sized> NumberRegistry for Box<R> {
    fn list_all(&self) -> Result<Vec<NumberRecord>> {
        (**self).list_all()
    }

    fn allocate(&mut self, uuid: Uuid, kind: &str, number: BridgeNum, fresh: bool) -> Result<()> {
        (**self).allocate(uuid, kind, number, fresh)
    }

    fn update(&mut self, uuid: Uuid, kind: &str, number: BridgeNum) -> Result<()> {
        (**self).update(uuid, kind, number)
    }

    fn reserve(&mut self, uuid: Uuid, number: BridgeNum, kind: &str) -> Result<()> {
        (**self).reserve(uuid, number, kind)
    }

    fn free(&mut self, uuid: Uuid, kind: &str) -> Result<()> {
        (**self).free(uuid, kind)
    }

    fn delete(&mut self, uuid: Uuid, kind: &str) -> Result<()> {
        (**self).delete(uuid, kind)
    }

    fn begin_batch(&mut self) {
        (**self).begin_batch()
    }

    fn commit_batch(&mut self) -> Result<()> {
        (**self).commit_batch()
    }
}
