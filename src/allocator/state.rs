//! Allocator state: active map, sticky map and presence set
//!
//! The three structures are only mutated together through the methods here so
//! that the presence set always mirrors the union of both maps.

use super::number::BridgeNum;
use super::presence::PresenceSet;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// A sticky (reserved but inactive) entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Reservation {
    pub(super) number: BridgeNum,
    /// Position in the eviction order
    pub(super) seq: u64,
}

/// Maps plus presence set, owned by one allocator
#[derive(Debug, Default)]
pub struct AllocatorState {
    pub(super) active: HashMap<Uuid, BridgeNum>,
    pub(super) sticky: HashMap<Uuid, Reservation>,
    /// Sticky identities keyed by insertion sequence, oldest first
    pub(super) eviction_order: BTreeMap<u64, Uuid>,
    pub(super) presence: PresenceSet,
    next_seq: u64,
}

impl AllocatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_number(&self, uuid: &Uuid) -> Option<BridgeNum> {
        self.active.get(uuid).copied()
    }

    pub fn sticky_number(&self, uuid: &Uuid) -> Option<BridgeNum> {
        self.sticky.get(uuid).map(|r| r.number)
    }

    pub fn is_claimed(&self, number: BridgeNum) -> bool {
        self.presence.is_set(number.get())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn sticky_count(&self) -> usize {
        self.sticky.len()
    }

    pub fn claimed_count(&self) -> usize {
        self.presence.count()
    }

    /// Lowest unclaimed number in `1..=max`
    pub fn lowest_free(&self, max: BridgeNum) -> Option<BridgeNum> {
        self.presence
            .first_clear(BridgeNum::MIN.get()..=max.get())
            .and_then(BridgeNum::new)
    }

    /// Add a sticky entry at the back of the eviction order and claim its number
    pub(super) fn insert_sticky(&mut self, uuid: Uuid, number: BridgeNum) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.sticky.insert(uuid, Reservation { number, seq });
        self.eviction_order.insert(seq, uuid);
        self.presence.set(number.get());
    }

    /// Move a sticky entry to the active map; its number stays claimed
    pub(super) fn promote(&mut self, uuid: Uuid) -> Option<BridgeNum> {
        let reservation = self.sticky.remove(&uuid)?;
        self.eviction_order.remove(&reservation.seq);
        self.active.insert(uuid, reservation.number);
        Some(reservation.number)
    }

    /// Claim a fresh number for an identity in neither map
    pub(super) fn insert_active(&mut self, uuid: Uuid, number: BridgeNum) {
        self.active.insert(uuid, number);
        self.presence.set(number.get());
    }

    /// Move an active entry to the back of the sticky order
    pub(super) fn deactivate(&mut self, uuid: Uuid) -> Option<BridgeNum> {
        let number = self.active.remove(&uuid)?;
        self.insert_sticky(uuid, number);
        Some(number)
    }

    /// Drop the oldest sticky entry and release its number
    pub(super) fn evict_oldest(&mut self) -> Option<(Uuid, BridgeNum)> {
        let (_, uuid) = self.eviction_order.pop_first()?;
        let reservation = self.sticky.remove(&uuid)?;
        self.presence.clear(reservation.number.get());
        Some((uuid, reservation.number))
    }

    /// Active entries followed by sticky entries in eviction order
    pub fn entries(&self) -> impl Iterator<Item = (Uuid, BridgeNum, bool)> + '_ {
        let active = self.active.iter().map(|(uuid, num)| (*uuid, *num, true));
        let sticky = self
            .eviction_order
            .values()
            .filter_map(|uuid| self.sticky.get(uuid).map(|r| (*uuid, r.number, false)));
        active.chain(sticky)
    }

    /// Verify the map/presence invariants
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen_numbers = HashSet::new();

        for (uuid, num) in &self.active {
            if self.sticky.contains_key(uuid) {
                return Err(Error::Inconsistent(format!(
                    "{} is both active and reserved",
                    uuid
                )));
            }
            if !seen_numbers.insert(num.get()) {
                return Err(Error::Inconsistent(format!(
                    "bridge number {} held by more than one identity",
                    num
                )));
            }
        }

        for (uuid, reservation) in &self.sticky {
            if !seen_numbers.insert(reservation.number.get()) {
                return Err(Error::Inconsistent(format!(
                    "bridge number {} held by more than one identity",
                    reservation.number
                )));
            }
            if self.eviction_order.get(&reservation.seq) != Some(uuid) {
                return Err(Error::Inconsistent(format!(
                    "reservation for {} missing from eviction order",
                    uuid
                )));
            }
        }

        if self.eviction_order.len() != self.sticky.len() {
            return Err(Error::Inconsistent(format!(
                "eviction order has {} entries for {} reservations",
                self.eviction_order.len(),
                self.sticky.len()
            )));
        }

        for bit in 0..=u8::MAX {
            if self.presence.is_set(bit) != seen_numbers.contains(&bit) {
                return Err(Error::Inconsistent(format!(
                    "presence bit {} does not match allocator maps",
                    bit
                )));
            }
        }

        Ok(())
    }
}
