//! Startup recovery
//!
//! Rebuilds allocator state from two independent sources that may overlap or
//! disagree after a crash:
//!
//! 1. Number registry records of our kind. Nothing is active yet, so each
//!    recovered record has its in-use flag cleared.
//! 2. Published network status. Numbers not already recovered in pass 1 are
//!    written back to the registry as reservations.
//!
//! The first record seen for a number (or an identity) wins; later claims are
//! logged and skipped. Every recovered entry is sticky.

use super::bridge::BridgeNumAllocator;
use super::number::BridgeNum;
use super::state::AllocatorState;
use crate::config::AllocatorConfig;
use crate::error::Result;
use crate::registry::{NetworkStatusRegistry, NumberRegistry};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Counters collected during recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Reservations taken from number registry records
    pub from_registry: usize,
    /// Reservations taken from network status records
    pub from_status: usize,
    /// Records skipped because their number was already claimed
    pub duplicate_numbers: usize,
    /// Records skipped because their identity was already recovered
    pub duplicate_identities: usize,
    /// Records with a number outside `1..=max_number`
    pub out_of_range: usize,
    /// Registry records of another kind
    pub foreign_kind: usize,
    /// Recovered identities re-activated by `resume`
    pub resumed: usize,
}

impl RecoveryReport {
    pub fn recovered(&self) -> usize {
        self.from_registry + self.from_status
    }

    pub fn skipped(&self) -> usize {
        self.duplicate_numbers + self.duplicate_identities + self.out_of_range
    }
}

/// Outcome of checking one persisted claim against the state built so far
enum Claim {
    Accept(BridgeNum),
    OutOfRange,
    DuplicateNumber,
    DuplicateIdentity,
}

fn check_claim(state: &AllocatorState, max: BridgeNum, uuid: &Uuid, raw: u32) -> Claim {
    let number = match BridgeNum::from_persisted(raw) {
        Some(number) if number <= max => number,
        _ => return Claim::OutOfRange,
    };
    if state.is_claimed(number) {
        return Claim::DuplicateNumber;
    }
    if state.sticky_number(uuid).is_some() {
        return Claim::DuplicateIdentity;
    }
    Claim::Accept(number)
}

impl<R: NumberRegistry> BridgeNumAllocator<R> {
    /// Build an allocator from persisted records
    ///
    /// Reads every record from `registry` and `status`, reserves the numbers
    /// they claim and brings the registry in line: recovered records lose
    /// their in-use flag, status-only numbers gain a reservation record.
    /// Registry writes are batched and committed once at the end.
    pub fn recover<S>(
        config: AllocatorConfig,
        registry: R,
        status: &S,
    ) -> Result<(Self, RecoveryReport)>
    where
        S: NetworkStatusRegistry + ?Sized,
    {
        let mut allocator = Self::new(config, registry)?;
        allocator.registry.begin_batch();
        let report = allocator.recover_records(status)?;
        allocator.registry.commit_batch()?;
        Ok((allocator, report))
    }

    /// Recover, then re-activate identities whose record was still in use
    ///
    /// For a process that restarts between an allocate and its free, such
    /// as a CLI invocation. Numbers that were never freed come back active
    /// instead of sticky, so they cannot be evicted for a newcomer.
    pub fn resume<S>(
        config: AllocatorConfig,
        registry: R,
        status: &S,
    ) -> Result<(Self, RecoveryReport)>
    where
        S: NetworkStatusRegistry + ?Sized,
    {
        let in_use: Vec<(Uuid, u32)> = registry
            .list_all()?
            .into_iter()
            .filter(|r| r.in_use && r.kind == config.kind)
            .map(|r| (r.uuid, r.number))
            .collect();

        let mut allocator = Self::new(config, registry)?;
        allocator.registry.begin_batch();
        let mut report = allocator.recover_records(status)?;

        for (uuid, raw) in in_use {
            match allocator.state.sticky_number(&uuid) {
                Some(number) if u32::from(number) == raw => {
                    allocator.allocate(uuid)?;
                    report.resumed += 1;
                }
                _ => {
                    warn!(%uuid, number = raw, "In-use record was not recovered; not resumed");
                }
            }
        }

        allocator.registry.commit_batch()?;
        info!(resumed = report.resumed, "Resumed in-use bridge numbers");
        Ok((allocator, report))
    }

    fn recover_records<S>(&mut self, status: &S) -> Result<RecoveryReport>
    where
        S: NetworkStatusRegistry + ?Sized,
    {
        let mut report = RecoveryReport::default();
        let max = self.config.max();

        for record in self.registry.list_all()? {
            if record.kind != self.config.kind {
                report.foreign_kind += 1;
                continue;
            }
            info!(uuid = %record.uuid, number = record.number, in_use = record.in_use, "Found number record");

            match check_claim(&self.state, max, &record.uuid, record.number) {
                Claim::Accept(number) => {
                    info!(uuid = %record.uuid, %number, "Reserving bridge number");
                    self.state.insert_sticky(record.uuid, number);
                    self.registry.free(record.uuid, &self.config.kind)?;
                    report.from_registry += 1;
                }
                Claim::OutOfRange => {
                    warn!(uuid = %record.uuid, number = record.number, "Bridge number out of range; ignored");
                    report.out_of_range += 1;
                }
                Claim::DuplicateNumber => {
                    error!(uuid = %record.uuid, number = record.number, "Bridge number already reserved; ignored");
                    report.duplicate_numbers += 1;
                }
                Claim::DuplicateIdentity => {
                    warn!(uuid = %record.uuid, number = record.number, "Identity already has a reservation; ignored");
                    report.duplicate_identities += 1;
                }
            }
        }

        for record in status.list_all()? {
            match check_claim(&self.state, max, &record.uuid, record.bridge_num) {
                Claim::Accept(number) => {
                    info!(uuid = %record.uuid, %number, "Reserving bridge number from network status");
                    self.state.insert_sticky(record.uuid, number);
                    self.registry
                        .reserve(record.uuid, number, &self.config.kind)?;
                    report.from_status += 1;
                }
                Claim::OutOfRange => {
                    warn!(uuid = %record.uuid, number = record.bridge_num, "Network status bridge number out of range; ignored");
                    report.out_of_range += 1;
                }
                Claim::DuplicateNumber => {
                    info!(uuid = %record.uuid, number = record.bridge_num, "Bridge number already reserved");
                    report.duplicate_numbers += 1;
                }
                Claim::DuplicateIdentity => {
                    info!(uuid = %record.uuid, number = record.bridge_num, "Identity already has a reservation");
                    report.duplicate_identities += 1;
                }
            }
        }

        info!(
            from_registry = report.from_registry,
            from_status = report.from_status,
            skipped = report.skipped(),
            "Bridge number recovery complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{Assignment, AssignmentState};
    use crate::registry::{
        MemoryNetworkStatus, MemoryNumberRegistry, NumberRecord, RegistryCall,
    };

    fn recover(
        records: Vec<NumberRecord>,
        status: MemoryNetworkStatus,
    ) -> Result<(BridgeNumAllocator<MemoryNumberRegistry>, RecoveryReport)> {
        BridgeNumAllocator::recover(
            AllocatorConfig::default(),
            MemoryNumberRegistry::with_records(records),
            &status,
        )
    }

    #[test]
    fn test_empty_sources() -> Result<()> {
        let (alloc, report) = recover(Vec::new(), MemoryNetworkStatus::new())?;
        assert_eq!(report, RecoveryReport::default());
        assert_eq!(alloc.stats().free, 255);
        Ok(())
    }

    #[test]
    fn test_foreign_kind_ignored() -> Result<()> {
        let id = Uuid::new_v4();
        let (alloc, report) = recover(
            vec![NumberRecord::new(id, "appNum", 5, true)],
            MemoryNetworkStatus::new(),
        )?;

        assert_eq!(report.foreign_kind, 1);
        assert!(alloc.lookup(&id).is_none());
        // Untouched: still in use
        assert!(alloc.registry().get(&id, "appNum").unwrap().in_use);
        assert!(alloc.registry().journal().is_empty());
        Ok(())
    }

    #[test]
    fn test_out_of_range_skipped() -> Result<()> {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (alloc, report) = recover(
            vec![
                NumberRecord::new(a, "bridgeNum", 0, false),
                NumberRecord::new(b, "bridgeNum", 300, false),
            ],
            MemoryNetworkStatus::new(),
        )?;

        assert_eq!(report.out_of_range, 2);
        assert_eq!(report.recovered(), 0);
        assert!(alloc.lookup(&a).is_none());
        assert!(alloc.lookup(&b).is_none());
        alloc.check_invariants()
    }

    #[test]
    fn test_above_configured_max_skipped() -> Result<()> {
        let id = Uuid::new_v4();
        let config = AllocatorConfig {
            max_number: 8,
            ..AllocatorConfig::default()
        };
        let registry =
            MemoryNumberRegistry::with_records(vec![NumberRecord::new(id, "bridgeNum", 9, false)]);

        let (alloc, report) =
            BridgeNumAllocator::recover(config, registry, &MemoryNetworkStatus::new())?;
        assert_eq!(report.out_of_range, 1);
        assert!(alloc.lookup(&id).is_none());
        Ok(())
    }

    #[test]
    fn test_status_reservation_written_back() -> Result<()> {
        let id = Uuid::new_v4();
        let mut status = MemoryNetworkStatus::new();
        status.push(id, 12);

        let (alloc, report) = recover(Vec::new(), status)?;
        assert_eq!(report.from_status, 1);

        let num = BridgeNum::new(12).unwrap();
        assert_eq!(
            alloc.registry().journal(),
            &[RegistryCall::Reserve {
                uuid: id,
                number: num,
                kind: "bridgeNum".to_string()
            }]
        );
        let record = alloc.registry().get(&id, "bridgeNum").unwrap();
        assert_eq!(record.number, 12);
        assert!(!record.in_use);
        alloc.check_invariants()
    }

    #[test]
    fn test_identity_in_both_sources_keeps_registry_number() -> Result<()> {
        let id = Uuid::new_v4();
        let mut status = MemoryNetworkStatus::new();
        status.push(id, 40);

        let (alloc, report) = recover(vec![NumberRecord::new(id, "bridgeNum", 4, true)], status)?;

        assert_eq!(report.from_registry, 1);
        assert_eq!(report.duplicate_identities, 1);
        assert_eq!(alloc.lookup(&id).map(|a| a.number.get()), Some(4));
        assert!(!alloc.state().is_claimed(BridgeNum::new(40).unwrap()));
        alloc.check_invariants()
    }

    #[test]
    fn test_recovered_entries_evicted_in_record_order() -> Result<()> {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut status = MemoryNetworkStatus::new();
        status.push(b, 2);
        let config = AllocatorConfig {
            max_number: 2,
            ..AllocatorConfig::default()
        };
        let registry =
            MemoryNumberRegistry::with_records(vec![NumberRecord::new(a, "bridgeNum", 1, true)]);

        let (mut alloc, _) = BridgeNumAllocator::recover(config, registry, &status)?;

        let c = Uuid::new_v4();
        assert_eq!(alloc.allocate(c)?.get(), 1);
        assert!(alloc.lookup(&a).is_none());
        assert!(alloc.lookup(&b).is_some());
        Ok(())
    }

    #[test]
    fn test_mixed_kinds_for_one_identity() -> Result<()> {
        let id = Uuid::new_v4();
        let (alloc, report) = recover(
            vec![
                NumberRecord::new(id, "appNum", 9, true),
                NumberRecord::new(id, "bridgeNum", 5, true),
            ],
            MemoryNetworkStatus::new(),
        )?;

        assert_eq!(report.foreign_kind, 1);
        assert_eq!(report.from_registry, 1);
        assert_eq!(alloc.lookup(&id).map(|a| a.number.get()), Some(5));

        let app = alloc.registry().get(&id, "appNum").unwrap();
        assert_eq!(app.number, 9);
        assert!(app.in_use);
        let bridge = alloc.registry().get(&id, "bridgeNum").unwrap();
        assert_eq!(bridge.number, 5);
        assert!(!bridge.in_use);
        Ok(())
    }

    #[test]
    fn test_resume_reactivates_in_use_records() -> Result<()> {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let registry = MemoryNumberRegistry::with_records(vec![
            NumberRecord::new(a, "bridgeNum", 1, true),
            NumberRecord::new(b, "bridgeNum", 2, false),
            NumberRecord::new(b, "appNum", 3, true),
        ]);
        let config = AllocatorConfig {
            max_number: 2,
            ..AllocatorConfig::default()
        };

        let (mut alloc, report) =
            BridgeNumAllocator::resume(config, registry, &MemoryNetworkStatus::new())?;

        assert_eq!(report.from_registry, 2);
        assert_eq!(report.resumed, 1);
        assert_eq!(
            alloc.lookup(&a),
            Some(Assignment {
                number: BridgeNum::new(1).unwrap(),
                state: AssignmentState::Active
            })
        );
        assert_eq!(
            alloc.lookup(&b).map(|a| a.state),
            Some(AssignmentState::Reserved)
        );
        assert!(alloc.registry().get(&a, "bridgeNum").unwrap().in_use);

        // Only b's reservation can be evicted
        let c = Uuid::new_v4();
        assert_eq!(alloc.allocate(c)?.get(), 2);
        assert!(matches!(
            alloc.allocate(Uuid::new_v4()),
            Err(crate::error::Error::Exhausted { capacity: 2 })
        ));
        alloc.check_invariants()
    }

    #[test]
    fn test_resume_skips_unrecovered_in_use_record() -> Result<()> {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let registry = MemoryNumberRegistry::with_records(vec![
            NumberRecord::new(a, "bridgeNum", 4, false),
            // Loses to a's claim on number 4
            NumberRecord::new(b, "bridgeNum", 4, true),
        ]);

        let (alloc, report) = BridgeNumAllocator::resume(
            AllocatorConfig::default(),
            registry,
            &MemoryNetworkStatus::new(),
        )?;

        assert_eq!(report.duplicate_numbers, 1);
        assert_eq!(report.resumed, 0);
        assert!(alloc.lookup(&b).is_none());
        alloc.check_invariants()
    }
}
