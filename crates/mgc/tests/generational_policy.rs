//! Generational Policy Tests - Merge or Keep Young
//!
//! Verifies, through whole collection cycles, that:
//! - survivors merge into the old generation when enough of them were updated
//! - a poorly compacted generation is kept young for another collection
//! - the generation cap always forces a merge
//! - a full collection that keeps its generation young defers the next full

mod common;

use common::{assert_bounds_hold, DriverFixture, SimulatedPhases};
use mgc::{CollectionKind, CollectorState, GcEvent, SpaceKind};

/// Fixture with one mutable space holding a 1000-word generation
///
/// Compaction reclaims nothing, so the generation keeps its 1000 words and
/// `survival_percent` is exactly the updated share.
fn generation_of_1000(survival_percent: usize, this_generation: u32) -> DriverFixture {
    let mut phases = SimulatedPhases::with_survival(survival_percent);
    phases.reclaim_percent = 0;
    let mut fixture = DriverFixture::small()
        .with_phases(phases)
        .with_state(CollectorState {
            this_generation,
            defer_full_next_time: false,
        });
    fixture.add_space(SpaceKind::Mutable, 5000, 1000);
    fixture.add_space(SpaceKind::Immutable, 2000, 0);
    fixture
}

/// 60% updated: survivors join the old generation
///
/// **Bug this finds:** merge decision inverted, `gen_top` left in place
#[test]
fn test_well_compacted_generation_merges() {
    let mut fixture = generation_of_1000(60, 0);

    assert!(fixture.collect(CollectionKind::Minor, 10));

    let space = &fixture.heap.local_spaces()[0];
    assert_eq!(space.gen_top(), space.pointer());
    assert_eq!(fixture.driver.state().this_generation, 0);
    assert_eq!(
        fixture.count_events(|e| matches!(e, GcEvent::GenerationMerged { .. })),
        1
    );
}

/// 30% updated at generation count 1: kept young, count becomes 2
///
/// **Bug this finds:** generation counter not advanced, `gen_top` moved
#[test]
fn test_fragmented_generation_is_recollected() {
    let mut fixture = generation_of_1000(30, 1);

    assert!(fixture.collect(CollectionKind::Minor, 10));

    let space = &fixture.heap.local_spaces()[0];
    assert_eq!(space.gen_top(), space.top());
    assert_eq!(space.generation_words(), 1000);
    assert_eq!(fixture.driver.state().this_generation, 2);
    assert!(fixture.events().contains(&GcEvent::GenerationRecollected {
        cycle: 1,
        generation: 2
    }));
    assert!(!fixture.driver.state().defer_full_next_time);
}

/// Exactly half updated is not "fewer than half"
#[test]
fn test_half_updated_generation_merges() {
    let mut fixture = generation_of_1000(50, 0);

    assert!(fixture.collect(CollectionKind::Minor, 10));

    assert_eq!(fixture.driver.state().this_generation, 0);
}

/// **Bug this finds:** off-by-one at the cap (`>` vs `>=`)
#[test]
fn test_generation_cap_forces_merge() {
    let mut at_cap = generation_of_1000(30, 3);
    assert!(at_cap.collect(CollectionKind::Minor, 10));
    assert_eq!(at_cap.driver.state().this_generation, 4);

    let mut over_cap = generation_of_1000(30, 4);
    assert!(over_cap.collect(CollectionKind::Minor, 10));
    assert_eq!(over_cap.driver.state().this_generation, 0);
    let space = &over_cap.heap.local_spaces()[0];
    assert_eq!(space.gen_top(), space.pointer());
}

/// Repeated minor collections of a fragmented generation end in a merge
///
/// **Bug this finds:** unbounded generation growth
#[test]
fn test_recollection_is_bounded_over_many_cycles() {
    let mut fixture = generation_of_1000(30, 0);

    let mut generations = Vec::new();
    for _ in 0..6 {
        assert!(fixture.collect(CollectionKind::Minor, 10));
        generations.push(fixture.driver.state().this_generation);
        assert_bounds_hold(&fixture.heap);
    }

    assert_eq!(generations, vec![1, 2, 3, 4, 0, 0]);
}

/// A full collection that keeps its generation young makes the next
/// collection full too
///
/// **Bug this finds:** deferral lost when re-collecting after a full cycle
#[test]
fn test_full_recollection_defers_next_full() {
    let mut fixture = generation_of_1000(30, 0);

    assert!(fixture.collect(CollectionKind::Full, 10));
    assert_eq!(
        fixture.driver.state(),
        CollectorState {
            this_generation: 1,
            defer_full_next_time: true
        }
    );

    assert!(fixture.collect(CollectionKind::Minor, 10));
    let report = fixture.driver.stats().last_report().expect("report recorded");
    assert!(report.escalated);
    assert_eq!(report.performed, CollectionKind::Full);
}

/// An empty generation never asks to be collected again
#[test]
fn test_empty_generation_merges() {
    let mut fixture = DriverFixture::small().with_state(CollectorState {
        this_generation: 2,
        defer_full_next_time: false,
    });
    fixture.add_space(SpaceKind::Mutable, 5000, 0);
    fixture.add_space(SpaceKind::Immutable, 2000, 0);

    assert!(fixture.collect(CollectionKind::Minor, 10));

    assert_eq!(fixture.driver.state().this_generation, 0);
}
