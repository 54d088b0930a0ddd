//! Heap Invariant Tests
//!
//! Between cycles every space satisfies `bottom ≤ pointer ≤ gen_top ≤ top`
//! and its bitmap is clean. During a cycle the phase accounting identities
//! must hold exactly. Broken invariants are fatal; with `PanicOnFatal` that
//! shows up as a panic carrying the violation message.

mod common;

use common::{assert_bitmaps_clean, assert_bounds_hold, DriverFixture, SimulatedPhases};
use mgc::{CollectionKind, SpaceKind};

/// Mixed workload over many cycles
///
/// **Bug this finds:** any cycle that leaves a frontier out of order or a
/// mark bit behind
#[test]
fn test_invariants_hold_across_many_cycles() {
    let mut fixture = DriverFixture::small();
    fixture.add_space(SpaceKind::Mutable, 4000, 0);
    fixture.add_space(SpaceKind::Immutable, 2000, 0);

    let survival = [100, 70, 30, 50, 0, 90, 10];
    for round in 0..28 {
        {
            let phases = &mut fixture.phases;
            phases.survival_percent = survival[round % survival.len()];
            phases.immutable_share_percent = (round * 13) % 60;
            phases.reclaim_percent = if round % 3 == 0 { 40 } else { 100 };
        }

        // mutator allocates into the first mutable space that has room
        let words = 150 + (round * 37) % 400;
        if let Some(space) = fixture
            .heap
            .local_spaces_mut()
            .iter_mut()
            .find(|space| space.is_mutable() && space.free_words() >= words)
        {
            assert!(space.allocate(words).is_some());
        }

        let kind = if round % 5 == 4 {
            CollectionKind::Full
        } else {
            CollectionKind::Minor
        };
        assert!(fixture.collect(kind, 64), "round {} failed", round);

        assert_bounds_hold(&fixture.heap);
        assert_bitmaps_clean(&fixture.heap);
        assert!(fixture.largest_mutable_free() >= 64);
        assert!(fixture.driver.state().this_generation <= 4);
    }

    assert_eq!(fixture.driver.stats().cycle_count(), 28);
    assert!(fixture.phases.integrity_checks() >= 28);
}

/// **Bug this finds:** update accounting not checked
#[test]
#[should_panic(expected = "mutable spaces updated")]
fn test_update_accounting_violation_is_fatal() {
    let mut fixture = DriverFixture::small();
    fixture.add_space(SpaceKind::Mutable, 4000, 1000);
    fixture.add_space(SpaceKind::Immutable, 2000, 0);
    fixture.phases.update_skew = 1;

    fixture.collect(CollectionKind::Minor, 10);
}

/// **Bug this finds:** frontier checked only after the phases ran
#[test]
#[should_panic(expected = "bounds out of order")]
fn test_bounds_violation_before_cycle_is_fatal() {
    let mut fixture = DriverFixture::small();
    fixture.add_space(SpaceKind::Mutable, 4000, 1000);
    let space = &mut fixture.heap.local_spaces_mut()[0];
    let below_bottom = space.bottom() - 1;
    space.set_pointer(below_bottom);

    fixture.collect(CollectionKind::Minor, 10);
}

/// A mark bit in the old data of a merged space
///
/// **Bug this finds:** bitmap cleanliness above the generation not checked
#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "set beyond generation limit")]
fn test_stray_mark_above_generation_is_fatal() {
    let mut fixture = DriverFixture::small();
    fixture.add_space(SpaceKind::Mutable, 4000, 1000);
    fixture.add_space(SpaceKind::Immutable, 2000, 0);

    // first cycle merges the 1000 words into the old generation
    assert!(fixture.collect(CollectionKind::Minor, 10));
    assert!(fixture.heap.local_spaces()[0].gen_top() < fixture.heap.local_spaces()[0].top());

    let mut phases = SimulatedPhases::all_live();
    phases.stray_mark = true;
    fixture.phases = phases;
    fixture.collect(CollectionKind::Minor, 10);
}

/// Overflow left behind in a mutable space still balances the identities
///
/// **Bug this finds:** overflow subtracted from the wrong partition
#[test]
fn test_overflow_keeps_accounting_balanced() {
    let mut fixture = DriverFixture::new(
        mgc::TuningConfig {
            allow_growth: false,
            ..common::small_config()
        },
        1 << 20,
    );
    fixture.add_space(SpaceKind::Mutable, 6000, 3000);
    fixture.add_space(SpaceKind::Immutable, 1500, 1000);
    fixture.phases.immutable_share_percent = 50;

    // 1500 immutable words in the mutable space, 500 free immutable words
    assert!(fixture.collect(CollectionKind::Minor, 10));

    assert_eq!(fixture.heap.local_spaces()[0].in_use_words(), 2500);
    assert_eq!(fixture.heap.local_spaces()[1].free_words(), 0);
    assert_bounds_hold(&fixture.heap);
}
