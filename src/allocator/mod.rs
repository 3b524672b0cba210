//! Bridge number allocator
//!
//! Hands out numbers in `1..=255` and keeps freed numbers reserved for their
//! last owner, so an instance that comes back gets the same bridge.
//!
//! # Architecture
//!
//! ```text
//! BridgeNumAllocator
//!   ├─→ active:   uuid → num        (in use)
//!   ├─→ sticky:   uuid → num        (freed, held for reuse)
//!   │     └─→ eviction order: seq → uuid, oldest first
//!   └─→ presence: 256-bit set       (bit n ⇔ n held by anyone)
//!
//! allocate(uuid):  active? ─→ sticky? (promote) ─→ lowest free bit
//!                  ─→ evict oldest sticky and retry ─→ Exhausted
//! free(uuid):      active ─→ sticky, registry record deleted
//! ```
//!
//! State is rebuilt at startup by [`BridgeNumAllocator::recover`], which
//! merges the number registry with published network status and leaves
//! everything sticky until it is asked for again.

pub mod bridge;
pub mod number;
pub mod presence;
pub mod recovery;
pub mod shared;
pub mod state;

pub use bridge::{AllocatorStats, Assignment, AssignmentState, BridgeNumAllocator};
pub use number::BridgeNum;
pub use presence::PresenceSet;
pub use recovery::RecoveryReport;
pub use shared::SharedAllocator;
pub use state::AllocatorState;
