//! Allocate / free protocol

use super::number::BridgeNum;
use super::state::AllocatorState;
use crate::config::AllocatorConfig;
use crate::error::{Error, Result};
use crate::registry::NumberRegistry;
use serde::Serialize;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Whether an identity currently uses its number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentState {
    Active,
    Reserved,
}

/// Number held by an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub number: BridgeNum,
    pub state: AssignmentState,
}

/// Snapshot of allocator occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    pub capacity: usize,
    pub active: usize,
    pub reserved: usize,
    pub free: usize,
}

/// Sticky bridge number allocator
///
/// Owns its maps and presence set and reports every change to the number
/// registry. Not internally synchronized; wrap it in
/// [`SharedAllocator`](super::SharedAllocator) to share it between threads.
pub struct BridgeNumAllocator<R: NumberRegistry> {
    pub(super) config: AllocatorConfig,
    pub(super) state: AllocatorState,
    pub(super) registry: R,
}

impl<R: NumberRegistry> std::fmt::Debug for BridgeNumAllocator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeNumAllocator")
            .field("config", &self.config)
            .field("active", &self.state.active_count())
            .field("reserved", &self.state.sticky_count())
            .finish()
    }
}

impl<R: NumberRegistry> BridgeNumAllocator<R> {
    /// Create an empty allocator
    ///
    /// Use [`recover`](Self::recover) or [`resume`](Self::resume) instead
    /// when previous assignments may exist in the registry.
    pub fn new(config: AllocatorConfig, registry: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: AllocatorState::new(),
            registry,
        })
    }

    /// Get the number for `uuid`, allocating one if needed
    ///
    /// Preference order: the identity's active number, then its reserved
    /// number, then the lowest free number. When every number is held, the
    /// oldest reservation is evicted to make room. Fails with
    /// [`Error::Exhausted`] only when all numbers are actively in use.
    #[instrument(skip(self))]
    pub fn allocate(&mut self, uuid: Uuid) -> Result<BridgeNum> {
        if let Some(number) = self.state.active_number(&uuid) {
            debug!(%uuid, %number, "Found allocated bridge number");
            self.ensure_claimed(number)?;
            self.registry.update(uuid, &self.config.kind, number)?;
            return Ok(number);
        }

        if let Some(number) = self.state.sticky_number(&uuid) {
            info!(%uuid, %number, "Found reserved bridge number");
            self.ensure_claimed(number)?;
            self.state.promote(uuid);
            self.registry
                .allocate(uuid, &self.config.kind, number, false)?;
            return Ok(number);
        }

        // Each pass either allocates or shrinks the sticky map
        let max = self.config.max();
        loop {
            if let Some(number) = self.state.lowest_free(max) {
                info!(%uuid, %number, "Allocating bridge number");
                self.state.insert_active(uuid, number);
                self.registry
                    .allocate(uuid, &self.config.kind, number, true)?;
                return Ok(number);
            }

            match self.state.evict_oldest() {
                Some((victim, number)) => {
                    info!(%uuid, %victim, %number, "No free bridge number, evicting reservation");
                    self.registry.delete(victim, &self.config.kind)?;
                }
                None => {
                    error!(%uuid, capacity = max.get(), "All bridge numbers are in use");
                    return Err(Error::Exhausted {
                        capacity: max.get(),
                    });
                }
            }
        }
    }

    /// Release the number held by `uuid`
    ///
    /// The number stays reserved for `uuid` until it is allocated again or
    /// evicted. Freeing an already reserved identity only clears the
    /// registry's in-use flag.
    #[instrument(skip(self))]
    pub fn free(&mut self, uuid: Uuid) -> Result<()> {
        if let Some(number) = self.state.active_number(&uuid) {
            self.ensure_claimed(number)?;
            if self.state.sticky_number(&uuid).is_some() {
                return Err(Error::Inconsistent(format!(
                    "{} is both allocated and reserved",
                    uuid
                )));
            }
            info!(%uuid, %number, "Reserving freed bridge number");
            self.state.deactivate(uuid);
            self.registry.delete(uuid, &self.config.kind)?;
            return Ok(());
        }

        if let Some(number) = self.state.sticky_number(&uuid) {
            self.ensure_claimed(number)?;
            debug!(%uuid, %number, "Bridge number already reserved, clearing in-use");
            self.registry.free(uuid, &self.config.kind)?;
            return Ok(());
        }

        Err(Error::NotAllocated(uuid))
    }

    /// Current assignment for `uuid`
    pub fn lookup(&self, uuid: &Uuid) -> Option<Assignment> {
        if let Some(number) = self.state.active_number(uuid) {
            return Some(Assignment {
                number,
                state: AssignmentState::Active,
            });
        }
        self.state.sticky_number(uuid).map(|number| Assignment {
            number,
            state: AssignmentState::Reserved,
        })
    }

    /// All assignments: active ones first, then reservations oldest first
    pub fn assignments(&self) -> impl Iterator<Item = (Uuid, Assignment)> + '_ {
        self.state.entries().map(|(uuid, number, active)| {
            let state = if active {
                AssignmentState::Active
            } else {
                AssignmentState::Reserved
            };
            (uuid, Assignment { number, state })
        })
    }

    pub fn stats(&self) -> AllocatorStats {
        let capacity = self.config.max().get() as usize;
        AllocatorStats {
            capacity,
            active: self.state.active_count(),
            reserved: self.state.sticky_count(),
            free: capacity.saturating_sub(self.state.claimed_count()),
        }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub fn state(&self) -> &AllocatorState {
        &self.state
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn into_registry(self) -> R {
        self.registry
    }

    pub fn check_invariants(&self) -> Result<()> {
        self.state.check_invariants()
    }

    fn ensure_claimed(&self, number: BridgeNum) -> Result<()> {
        if self.state.is_claimed(number) {
            Ok(())
        } else {
            error!(%number, "Presence bit not set for held bridge number");
            Err(Error::Inconsistent(format!(
                "presence bit not set for bridge number {}",
                number
            )))
        }
    }
}
