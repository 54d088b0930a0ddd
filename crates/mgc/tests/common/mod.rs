//! Test Utilities for the MGC Driver Test Suite
//!
//! The driver never looks inside objects, so these tests run it against a
//! simulated heap: `SimulatedPhases` decides per space how much of the
//! current generation survives, how much of it is immutable data sitting in
//! a mutable space, and how much dead space compaction manages to reclaim.
//! The simulation keeps the phase accounting identities exact, so any
//! violation the driver reports is a driver bug (or a deliberately injected
//! fault).
//!
//! ============================================================================
//! Sizes are in words. Segment increments and free targets are kept small so
//! a whole scenario fits in a few thousand words of reserved address space.
//! ============================================================================

#![allow(dead_code)]

use mgc::{
    CollectionDriver, CollectionKind, CollectionPhases, CollectorState, FixedMemory, GcError,
    GcEvent, GcLogger, GcLoggerConfig, LogLevel, MemoryManager, PanicOnFatal,
    ReservedSegmentSource, SpaceKind, TaskFarm, TuningConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Word address of the reserved test window
pub const HEAP_BASE: usize = 0x10_0000;

/// Segment increment and full free target used by `small_config`
pub const INCREMENT: usize = 1000;

/// Minor free threshold used by `small_config`
pub const MIN_FREE: usize = 200;

// ============================================================================
// CONFIGURATION & HEAP BUILDERS
// ============================================================================

/// Configuration with small, round sizes
///
/// **Bug this finds:** sizing code that only works for the default Mi-word
/// increments
pub fn small_config() -> TuningConfig {
    TuningConfig {
        immutable_segment_words: INCREMENT,
        mutable_segment_words: INCREMENT,
        immutable_free_words: INCREMENT,
        mutable_free_words: INCREMENT,
        immutable_min_free_words: MIN_FREE,
        mutable_min_free_words: MIN_FREE,
        growth_floor_words: 100,
        gc_threads: 2,
        task_queue_depth: 16,
        ..Default::default()
    }
}

/// Empty heap over a reserved window of `capacity` words
pub fn heap_with_capacity(capacity: usize) -> MemoryManager {
    MemoryManager::new(Box::new(ReservedSegmentSource::new(HEAP_BASE, capacity)))
}

/// Add a space of `size` words holding `used` words of current-generation data
///
/// Returns the new space's id.
#[track_caller]
pub fn add_space(heap: &mut MemoryManager, kind: SpaceKind, size: usize, used: usize) -> u64 {
    assert!(
        heap.try_allocate_segment(size, kind),
        "test heap refused a {} space of {} words",
        kind,
        size
    );
    let space = heap
        .local_spaces_mut()
        .last_mut()
        .expect("space was just added");
    assert!(space.allocate(used).is_some(), "{} words do not fit", used);
    space.id()
}

/// Logger that keeps every event, including debug-level ones, in memory
pub fn recording_logger() -> Arc<GcLogger> {
    Arc::new(GcLogger::new(GcLoggerConfig {
        level: LogLevel::Debug,
        console: false,
        max_events: 4096,
        ..Default::default()
    }))
}

/// Task farm private to one test
pub fn test_farm() -> Arc<TaskFarm> {
    Arc::new(TaskFarm::new(2, 16).expect("test task farm should start"))
}

// ============================================================================
// SIMULATED PHASES
// ============================================================================

/// Phase entry points in the order the driver called them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCall {
    Mark,
    ScanWeakRefs,
    Copy,
    Update,
}

/// What the simulation decided for one space during the current cycle
#[derive(Debug, Default, Clone, Copy)]
struct SpacePlan {
    mutable_live: usize,
    immutable_live: usize,
    /// Dead words compaction could not reclaim
    dead_kept: usize,
    /// Immutable words moved here from mutable spaces
    moved_in: usize,
    /// Immutable words that had to stay in this mutable space
    overflow: usize,
}

impl SpacePlan {
    fn live(&self) -> usize {
        self.mutable_live + self.immutable_live
    }
}

/// Layout-free stand-in for the mark, copy and update algorithms
pub struct SimulatedPhases {
    /// Percentage of each space's current generation that is reachable
    pub survival_percent: usize,
    /// Percentage of the survivors of a mutable space that are immutable
    pub immutable_share_percent: usize,
    /// Percentage of dead words the copy phase reclaims
    pub reclaim_percent: usize,
    /// Words the update phase over-reports in mutable spaces (fault injection)
    pub update_skew: usize,
    /// Set a mark bit in the old data of every merged space (fault injection)
    pub stray_mark: bool,
    /// Calls made by the driver
    pub calls: Vec<PhaseCall>,
    /// Spaces whose weak bounds were non-empty during `scan_weak_refs`
    pub weak_spaces_seen: usize,
    integrity_checks: AtomicUsize,
    plans: HashMap<u64, SpacePlan>,
}

impl SimulatedPhases {
    /// Everything survives and compaction is perfect
    pub fn all_live() -> Self {
        Self::with_survival(100)
    }

    pub fn with_survival(survival_percent: usize) -> Self {
        Self {
            survival_percent,
            immutable_share_percent: 0,
            reclaim_percent: 100,
            update_skew: 0,
            stray_mark: false,
            calls: Vec::new(),
            weak_spaces_seen: 0,
            integrity_checks: AtomicUsize::new(0),
            plans: HashMap::new(),
        }
    }

    pub fn integrity_checks(&self) -> usize {
        self.integrity_checks.load(Ordering::Relaxed)
    }

    /// Number of times the driver ran the mark phase
    pub fn mark_count(&self) -> usize {
        self.calls.iter().filter(|&&call| call == PhaseCall::Mark).count()
    }

    fn plan(&mut self, id: u64) -> &mut SpacePlan {
        self.plans.entry(id).or_default()
    }
}

impl CollectionPhases for SimulatedPhases {
    fn mark(&mut self, heap: &mut MemoryManager, farm: &TaskFarm) {
        self.calls.push(PhaseCall::Mark);
        self.plans.clear();

        for space in heap.local_spaces_mut() {
            let span = space.gen_top() - space.gen_bottom();
            let live = span * self.survival_percent / 100;
            let immutable_live = if space.is_mutable() {
                live * self.immutable_share_percent / 100
            } else {
                live
            };
            let plan = SpacePlan {
                mutable_live: live - immutable_live,
                immutable_live,
                ..SpacePlan::default()
            };

            space.counters.mutable_marked = plan.mutable_live;
            space.counters.immutable_marked = plan.immutable_live;
            if live > 0 {
                space.weak.include(space.gen_bottom());
            }
            self.plans.insert(space.id(), plan);
        }

        let spaces = heap.local_spaces();
        let plans = &self.plans;
        let stray_mark = self.stray_mark;
        farm.run_phase(|phase| {
            for space in spaces {
                let live = plans.get(&space.id()).map_or(0, SpacePlan::live);
                phase.add_work_or_run_now(move |_| {
                    space
                        .bitmap()
                        .set_range(space.gen_bottom() - space.bottom(), live);
                    if stray_mark && space.gen_top() < space.top() {
                        space.bitmap().set_bit(space.size() - 1);
                    }
                });
            }
        });
    }

    fn scan_weak_refs(&mut self, heap: &mut MemoryManager, _farm: &TaskFarm) {
        self.calls.push(PhaseCall::ScanWeakRefs);
        self.weak_spaces_seen += heap
            .local_spaces()
            .iter()
            .filter(|space| !space.weak.is_empty())
            .count();
    }

    fn copy(&mut self, heap: &mut MemoryManager, _farm: &TaskFarm) -> usize {
        self.calls.push(PhaseCall::Copy);
        let reclaim_percent = self.reclaim_percent;

        // Compact every immutable space in place first so the mutable
        // spaces' immutable survivors can move into the freed room.
        for space in heap
            .local_spaces_mut()
            .iter_mut()
            .filter(|space| !space.is_mutable())
        {
            let plan = self.plans.entry(space.id()).or_default();
            let dead = space.gen_top() - space.gen_bottom() - plan.live();
            plan.dead_kept = dead - dead * reclaim_percent / 100;
            space.set_pointer(space.gen_top() - plan.live() - plan.dead_kept);
            if plan.dead_kept < dead {
                space.counters.copied = plan.immutable_live;
            }
        }

        let movers: Vec<(u64, usize)> = heap
            .spaces_of(SpaceKind::Mutable)
            .map(|space| {
                let immutable_live = self.plans.get(&space.id()).map_or(0, |p| p.immutable_live);
                (space.id(), immutable_live)
            })
            .collect();

        let mut overflow = 0;
        for (id, mut remaining) in movers {
            for space in heap
                .local_spaces_mut()
                .iter_mut()
                .filter(|space| !space.is_mutable())
            {
                let take = remaining.min(space.free_words());
                if take > 0 && space.allocate(take).is_some() {
                    self.plans.entry(space.id()).or_default().moved_in += take;
                    remaining -= take;
                }
            }
            self.plan(id).overflow = remaining;
            overflow += remaining;
        }

        for space in heap
            .local_spaces_mut()
            .iter_mut()
            .filter(|space| space.is_mutable())
        {
            let plan = self.plans.entry(space.id()).or_default();
            let dead = space.gen_top() - space.gen_bottom() - plan.live();
            plan.dead_kept = dead - dead * reclaim_percent / 100;
            space.set_pointer(space.gen_top() - plan.mutable_live - plan.overflow - plan.dead_kept);
        }

        overflow
    }

    fn update(&mut self, heap: &mut MemoryManager, _farm: &TaskFarm) {
        self.calls.push(PhaseCall::Update);
        for space in heap.local_spaces_mut() {
            let plan = self.plans.get(&space.id()).copied().unwrap_or_default();
            space.counters.updated = if space.is_mutable() {
                plan.mutable_live + plan.overflow + self.update_skew
            } else {
                plan.immutable_live + plan.moved_in
            };
        }
    }

    fn check_integrity(&self, heap: &MemoryManager) -> mgc::Result<()> {
        self.integrity_checks.fetch_add(1, Ordering::Relaxed);
        for space in heap.local_spaces() {
            space.check_bounds()?;
            if space.bitmap().count_set() != 0 {
                return Err(GcError::InvariantViolation(format!(
                    "space {} still has {} mark bits after the cycle",
                    space.id(),
                    space.bitmap().count_set()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// DRIVER FIXTURE
// ============================================================================

/// A driver, its heap and its phases, wired for inspection
///
/// Physical memory is unknown by default, so the heap-load check never
/// forces an extra cycle unless a test asks for it.
pub struct DriverFixture {
    pub driver: CollectionDriver,
    pub heap: MemoryManager,
    pub phases: SimulatedPhases,
    pub logger: Arc<GcLogger>,
}

impl DriverFixture {
    pub fn new(config: TuningConfig, capacity: usize) -> Self {
        let logger = recording_logger();
        let driver = CollectionDriver::new(Arc::new(config), test_farm(), Arc::new(PanicOnFatal))
            .with_physical_memory(Box::new(FixedMemory(None)))
            .with_logger(Arc::clone(&logger));
        Self {
            driver,
            heap: heap_with_capacity(capacity),
            phases: SimulatedPhases::all_live(),
            logger,
        }
    }

    /// Fixture with `small_config` and a roomy address window
    pub fn small() -> Self {
        Self::new(small_config(), 1 << 20)
    }

    /// Report `bytes` of physical memory to the heap-load check
    pub fn with_physical_bytes(mut self, bytes: Option<u64>) -> Self {
        self.driver = self.driver.with_physical_memory(Box::new(FixedMemory(bytes)));
        self
    }

    pub fn with_state(mut self, state: CollectorState) -> Self {
        self.driver = self.driver.with_state(state);
        self
    }

    pub fn with_phases(mut self, phases: SimulatedPhases) -> Self {
        self.phases = phases;
        self
    }

    pub fn add_space(&mut self, kind: SpaceKind, size: usize, used: usize) -> u64 {
        add_space(&mut self.heap, kind, size, used)
    }

    pub fn collect(&mut self, kind: CollectionKind, words_needed: usize) -> bool {
        self.driver
            .run_cycle(&mut self.heap, &mut self.phases, kind.is_full(), words_needed)
    }

    pub fn events(&self) -> Vec<GcEvent> {
        self.logger
            .get_events()
            .into_iter()
            .map(|(_, event)| event)
            .collect()
    }

    pub fn count_events(&self, matches: impl Fn(&GcEvent) -> bool) -> usize {
        self.events().iter().filter(|event| matches(event)).count()
    }

    /// Largest free area of any single mutable space
    pub fn largest_mutable_free(&self) -> usize {
        self.heap
            .spaces_of(SpaceKind::Mutable)
            .map(|space| space.free_words())
            .max()
            .unwrap_or(0)
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

/// Assert `bottom ≤ pointer ≤ gen_top ≤ top` for every local space
#[track_caller]
pub fn assert_bounds_hold(heap: &MemoryManager) {
    for space in heap.local_spaces() {
        if let Err(e) = space.check_bounds() {
            panic!("bounds broken between cycles: {}", e);
        }
    }
}

/// Assert no local space has a mark bit set
#[track_caller]
pub fn assert_bitmaps_clean(heap: &MemoryManager) {
    for space in heap.local_spaces() {
        assert_eq!(
            space.bitmap().count_set(),
            0,
            "space {} has mark bits left between cycles",
            space.id()
        );
    }
}
