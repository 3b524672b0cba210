//! Allocation properties over the full 255-number space

use bridgenum::error::{Error, Result};
use bridgenum::registry::{MemoryNumberRegistry, NumberRegistry, RegistryCall};
use bridgenum::{AllocatorConfig, AssignmentState, BridgeNumAllocator};
use std::collections::HashMap;
use uuid::Uuid;

fn new_allocator() -> BridgeNumAllocator<MemoryNumberRegistry> {
    BridgeNumAllocator::new(AllocatorConfig::default(), MemoryNumberRegistry::new())
        .expect("default config is valid")
}

/// Allocate `count` fresh identities, returning them in allocation order
fn fill(
    alloc: &mut BridgeNumAllocator<MemoryNumberRegistry>,
    count: usize,
) -> Result<Vec<Uuid>> {
    (0..count)
        .map(|_| {
            let id = Uuid::new_v4();
            alloc.allocate(id).map(|_| id)
        })
        .collect()
}

#[test]
fn test_allocate_twice_returns_same_number() -> Result<()> {
    let mut alloc = new_allocator();
    let id = Uuid::new_v4();

    let first = alloc.allocate(id)?;
    let second = alloc.allocate(id)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_allocated_number_in_range_and_tracked() -> Result<()> {
    let mut alloc = new_allocator();

    for _ in 0..50 {
        let id = Uuid::new_v4();
        let num = alloc.allocate(id)?;
        assert!((1..=255).contains(&num.get()));
        assert!(alloc.state().is_claimed(num));
        assert_eq!(alloc.state().active_number(&id), Some(num));
    }
    alloc.check_invariants()
}

#[test]
fn test_free_then_allocate_same_number() -> Result<()> {
    let mut alloc = new_allocator();
    fill(&mut alloc, 10)?;
    let id = Uuid::new_v4();

    let num = alloc.allocate(id)?;
    alloc.free(id)?;
    assert_eq!(alloc.allocate(id)?, num);
    Ok(())
}

#[test]
fn test_numbers_unique_across_mixed_operations() -> Result<()> {
    let mut alloc = new_allocator();
    let ids: Vec<Uuid> = (0..300).map(|_| Uuid::new_v4()).collect();

    // Deterministic mix of allocations and frees, enough to force evictions
    for (step, id) in ids.iter().enumerate() {
        alloc.allocate(*id)?;
        if step % 3 == 0 {
            alloc.free(*id)?;
        }
        if step % 7 == 0 && step > 0 {
            let earlier = ids[step / 2];
            if alloc.lookup(&earlier).is_some() {
                alloc.allocate(earlier)?;
            }
        }

        let mut owners: HashMap<u8, Uuid> = HashMap::new();
        for (uuid, assignment) in alloc.assignments() {
            if let Some(prev) = owners.insert(assignment.number.get(), uuid) {
                panic!(
                    "number {} held by {} and {}",
                    assignment.number, prev, uuid
                );
            }
        }
        alloc.check_invariants()?;
    }
    Ok(())
}

#[test]
fn test_256th_allocation_exhausts() -> Result<()> {
    let mut alloc = new_allocator();
    let ids = fill(&mut alloc, 255)?;
    assert_eq!(ids.len(), 255);
    assert_eq!(alloc.stats().free, 0);

    let result = alloc.allocate(Uuid::new_v4());
    assert!(matches!(result, Err(Error::Exhausted { capacity: 255 })));

    // Existing assignments are untouched by the failure
    assert_eq!(alloc.stats().active, 255);
    alloc.check_invariants()
}

#[test]
fn test_full_space_evicts_reservation() -> Result<()> {
    let mut alloc = new_allocator();
    let ids = fill(&mut alloc, 255)?;

    let a = ids[41];
    let k = alloc.lookup(&a).map(|x| x.number).expect("allocated");
    alloc.free(a)?;

    let b = Uuid::new_v4();
    assert_eq!(alloc.allocate(b)?, k);
    assert!(alloc.lookup(&a).is_none());
    assert!(alloc.state().sticky_number(&a).is_none());
    assert!(alloc.state().active_number(&a).is_none());
    assert_eq!(
        alloc.registry().journal().last(),
        Some(&RegistryCall::Allocate {
            uuid: b,
            kind: "bridgeNum".to_string(),
            number: k,
            fresh: true
        })
    );
    alloc.check_invariants()
}

#[test]
fn test_eviction_order_is_oldest_reservation_first() -> Result<()> {
    let mut alloc = new_allocator();
    let ids = fill(&mut alloc, 255)?;

    // Reserve in a non-numeric order
    let freed = [ids[200], ids[3], ids[120]];
    for id in freed {
        alloc.free(id)?;
    }

    for victim in freed {
        let expected = alloc.lookup(&victim).map(|x| x.number).expect("reserved");
        let newcomer = Uuid::new_v4();
        assert_eq!(alloc.allocate(newcomer)?, expected);
        assert!(alloc.lookup(&victim).is_none());
    }

    assert!(matches!(
        alloc.allocate(Uuid::new_v4()),
        Err(Error::Exhausted { .. })
    ));
    Ok(())
}

#[test]
fn test_registry_mirrors_lifecycle() -> Result<()> {
    let mut alloc = new_allocator();
    let id = Uuid::new_v4();

    let num = alloc.allocate(id)?;
    let record = alloc.registry().get(&id, "bridgeNum").expect("record written");
    assert_eq!(record.number, u32::from(num));
    assert!(record.in_use);

    alloc.free(id)?;
    assert!(alloc.registry().get(&id, "bridgeNum").is_none());
    assert_eq!(
        alloc.lookup(&id).map(|a| a.state),
        Some(AssignmentState::Reserved)
    );

    alloc.allocate(id)?;
    assert!(alloc.registry().get(&id, "bridgeNum").expect("record rewritten").in_use);
    assert_eq!(alloc.registry().list_all()?.len(), 1);
    Ok(())
}
