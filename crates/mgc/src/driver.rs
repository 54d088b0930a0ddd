//! Collection Driver - One Collection Cycle End to End
//!
//! The driver runs with every mutator thread stopped and exclusive access to
//! the memory manager. A call to `run_cycle` performs one or more attempts:
//!
//! ```text
//! prepare spaces ─► [escalate?] ─► mark ─► weak refs ─► [full: pre-expand immutable]
//!      ▲                                                        │
//!      │                                                        ▼
//!      │             check accounting ◄─ update ◄─ check copy ◄─ copy
//!      │                    │
//!      │                    ▼
//!      │    clear marks ─► [full: adjust sizes] ─► integrity ─► sufficiency
//!      │                                                           │
//!      │                                                           ▼
//!      └──── retry ◄─ mutable space short / heap load high ◄─ merge or keep young
//! ```
//!
//! A minor attempt that leaves the heap short marks the next attempt as full
//! (`defer_full_next_time`). Within one call that escalation sticks: every
//! later attempt is full. A full attempt that cannot even meet the minor
//! thresholds ends the call with failure; that is the only failure exit.
//!
//! Broken invariants (bounds, copy accounting, update accounting, integrity)
//! are never returned to the caller. They go to the `FatalHandler`.

use crate::config::TuningConfig;
use crate::ensure_invariant;
use crate::error::{GcError, Result};
use crate::heap::sizer::SizeChange;
use crate::heap::{HeapSizer, LocalSpace, MemoryManager, PhysicalMemory, SpaceKind};
use crate::logging::{self, GcEvent, GcLogger};
use crate::phases::{CollectionPhases, FatalHandler};
use crate::policy::GenerationalPolicy;
use crate::scheduler::FullCollectionScheduler;
use crate::stats::{CycleReport, GcStats, GcTimer};
use crate::task_farm::TaskFarm;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Minor or full collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CollectionKind {
    /// Only the current generation `[pointer, gen_top)` of each space
    Minor,
    /// Every local space in its entirety
    Full,
}

impl CollectionKind {
    pub fn is_full(self) -> bool {
        self == CollectionKind::Full
    }

    fn from_full(full: bool) -> Self {
        if full {
            CollectionKind::Full
        } else {
            CollectionKind::Minor
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::Minor => write!(f, "minor"),
            CollectionKind::Full => write!(f, "full"),
        }
    }
}

/// State carried between `run_cycle` calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorState {
    /// Consecutive collections that kept the current generation young
    pub this_generation: u32,
    /// The next attempt must be a full collection
    pub defer_full_next_time: bool,
}

/// Outcome of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Done,
    Retry(RetryReason),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryReason {
    /// No mutable space can hold the pending allocation
    MutableSpaceShort,
    /// A full collection is pending and the heap is close to physical memory
    HeapLoad,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::MutableSpaceShort => write!(f, "no mutable space fits the allocation"),
            RetryReason::HeapLoad => write!(f, "heap load above threshold"),
        }
    }
}

/// Bookkeeping for one `run_cycle` call
#[derive(Debug)]
struct CallProgress {
    cycle: u64,
    full: bool,
    escalated: bool,
    minor_attempts: u32,
    full_attempts: u32,
    change: SizeChange,
}

impl CallProgress {
    fn attempts(&self) -> u32 {
        self.minor_attempts + self.full_attempts
    }
}

/// CollectionDriver - orchestrates collection cycles
///
/// # Examples
///
/// ```rust,no_run
/// use mgc::{AbortOnFatal, CollectionDriver, TaskFarm, TuningConfig};
/// use std::sync::Arc;
///
/// let config = Arc::new(TuningConfig::default());
/// let farm = Arc::new(TaskFarm::new(config.gc_threads, config.task_queue_depth).unwrap());
/// let driver = CollectionDriver::new(config, farm, Arc::new(AbortOnFatal));
/// assert_eq!(driver.state().this_generation, 0);
/// ```
pub struct CollectionDriver {
    config: Arc<TuningConfig>,
    sizer: HeapSizer,
    policy: GenerationalPolicy,
    scheduler: FullCollectionScheduler,
    farm: Arc<TaskFarm>,
    fatal: Arc<dyn FatalHandler>,
    stats: Arc<GcStats>,
    logger: Arc<GcLogger>,
    state: CollectorState,
}

impl CollectionDriver {
    /// Create a driver using the system's physical memory size and the
    /// global GC event logger
    pub fn new(
        config: Arc<TuningConfig>,
        farm: Arc<TaskFarm>,
        fatal: Arc<dyn FatalHandler>,
    ) -> Self {
        Self {
            sizer: HeapSizer::new(Arc::clone(&config)),
            policy: GenerationalPolicy::new(config.generation_cap),
            scheduler: FullCollectionScheduler::with_system_memory(
                config.heap_load_threshold_percent,
            ),
            config,
            farm,
            fatal,
            stats: Arc::new(GcStats::new()),
            logger: logging::global_logger(),
            state: CollectorState::default(),
        }
    }

    /// Use a different physical memory source for the heap load check
    pub fn with_physical_memory(mut self, memory: Box<dyn PhysicalMemory>) -> Self {
        self.scheduler =
            FullCollectionScheduler::new(self.config.heap_load_threshold_percent, memory);
        self
    }

    /// Send GC events to `logger` instead of the global logger
    pub fn with_logger(mut self, logger: Arc<GcLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Record statistics into `stats`
    pub fn with_stats(mut self, stats: Arc<GcStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Resume from a previously saved state
    pub fn with_state(mut self, state: CollectorState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> CollectorState {
        self.state
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<GcStats> {
        Arc::clone(&self.stats)
    }

    pub fn sizer(&self) -> &HeapSizer {
        &self.sizer
    }

    pub fn policy(&self) -> &GenerationalPolicy {
        &self.policy
    }

    pub fn scheduler(&self) -> &FullCollectionScheduler {
        &self.scheduler
    }

    pub fn farm(&self) -> &Arc<TaskFarm> {
        &self.farm
    }

    /// Run a collection
    ///
    /// `is_full` requests a full collection; a pending deferred full
    /// collection overrides a minor request. `words_needed` is the
    /// allocation that triggered the collection; on success some mutable
    /// space has at least that many free words.
    ///
    /// Returns false when even a full collection cannot meet the minor
    /// free-space thresholds.
    pub fn run_cycle(
        &mut self,
        heap: &mut MemoryManager,
        phases: &mut dyn CollectionPhases,
        is_full: bool,
        words_needed: usize,
    ) -> bool {
        let (cycle, timer) = self.stats.cycle_started();
        let requested = CollectionKind::from_full(is_full);
        self.logger.log(GcEvent::CycleStart {
            cycle,
            kind: requested,
            words_needed,
        });

        let mut progress = CallProgress {
            cycle,
            full: is_full,
            escalated: false,
            minor_attempts: 0,
            full_attempts: 0,
            change: SizeChange::default(),
        };

        let succeeded = loop {
            match self.attempt(heap, phases, words_needed, &mut progress) {
                Attempt::Done => break true,
                Attempt::Failed => break false,
                Attempt::Retry(reason) => {
                    log::debug!("[MGC] cycle {}: retrying, {}", cycle, reason);
                    self.logger.log(GcEvent::Retry {
                        cycle,
                        attempt: progress.attempts() + 1,
                        reason: reason.to_string(),
                    });
                }
            }
        };

        let performed = CollectionKind::from_full(progress.full);
        let duration = timer.elapsed();
        self.logger.log(GcEvent::CycleEnd {
            cycle,
            kind: performed,
            attempts: progress.attempts(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            succeeded,
        });
        if self.config.verbose {
            log::info!(
                "[MGC] cycle {} {} after {} attempts in {:.2}ms",
                cycle,
                if succeeded { "completed" } else { "failed" },
                progress.attempts(),
                duration.as_secs_f64() * 1000.0
            );
        }

        self.stats.cycle_finished(CycleReport {
            cycle,
            requested,
            performed,
            words_needed,
            minor_attempts: progress.minor_attempts,
            full_attempts: progress.full_attempts,
            escalated: progress.escalated,
            succeeded,
            grown_words: progress.change.grown_words,
            released_words: progress.change.released_words,
            duration,
        });

        succeeded
    }

    fn attempt(
        &mut self,
        heap: &mut MemoryManager,
        phases: &mut dyn CollectionPhases,
        words_needed: usize,
        progress: &mut CallProgress,
    ) -> Attempt {
        let cycle = progress.cycle;

        for space in heap.local_spaces_mut() {
            if let Err(e) = space.check_bounds() {
                self.fail(e);
            }
            space.begin_cycle();
        }
        for space in heap.permanent_spaces_mut() {
            space.begin_cycle();
        }

        if self.state.defer_full_next_time {
            self.state.defer_full_next_time = false;
            if !progress.full {
                progress.full = true;
                progress.escalated = true;
                log::warn!("[MGC] cycle {}: running the deferred full collection", cycle);
                self.logger.log(GcEvent::Escalated { cycle });
            }
        }

        let full = progress.full;
        if full {
            progress.full_attempts += 1;
            for space in heap.local_spaces_mut() {
                space.include_all_in_generation();
            }
        } else {
            progress.minor_attempts += 1;
        }

        let mut timer = GcTimer::new();
        phases.mark(heap, &self.farm);
        phases.scan_weak_refs(heap, &self.farm);
        log::debug!("[MGC] cycle {}: mark {:.2?}", cycle, timer.lap());

        if full {
            let marked: usize = heap
                .local_spaces()
                .iter()
                .map(|space| space.counters.immutable_marked)
                .sum();
            let change = self.sizer.expand_immutable_for(heap, marked);
            self.record_size_change(SpaceKind::Immutable, change, progress);
        }

        let overflow = phases.copy(heap, &self.farm);
        if let Err(e) = check_copy(heap) {
            self.fail(e);
        }
        log::debug!(
            "[MGC] cycle {}: copy {:.2?}, immutable overflow {} words",
            cycle,
            timer.lap(),
            overflow
        );

        phases.update(heap, &self.farm);
        if let Err(e) = check_update(heap, overflow) {
            self.fail(e);
        }
        log::debug!("[MGC] cycle {}: update {:.2?}", cycle, timer.lap());

        for space in heap.local_spaces() {
            if cfg!(debug_assertions) {
                if let Err(e) = space.check_bitmap_clean_above_generation() {
                    self.fail(e);
                }
            }
            space.clear_generation_marks();
        }

        if full {
            self.adjust(heap, SpaceKind::Immutable, overflow, progress);
            let i_full = self.sizer.is_really_full(heap, SpaceKind::Immutable, overflow, true);
            let m_full = self.sizer.is_really_full(heap, SpaceKind::Mutable, words_needed, true);
            // A generation that will be collected again leaves the mutable
            // partition alone until the next attempt has settled its size.
            if i_full || !m_full || !self.should_recollect(heap) {
                self.adjust(heap, SpaceKind::Mutable, words_needed, progress);
            }
        }

        if let Err(e) = phases.check_integrity(heap) {
            self.fail(e);
        }

        let i_full = self.sizer.is_really_full(heap, SpaceKind::Immutable, overflow, full);
        let m_full = self.sizer.is_really_full(heap, SpaceKind::Mutable, words_needed, full);
        if i_full || m_full {
            if !i_full && self.should_recollect(heap) {
                log::debug!("[MGC] cycle {}: short, recollecting the generation", cycle);
            } else if !full {
                self.state.defer_full_next_time = true;
                log::warn!("[MGC] cycle {}: minor collection left the heap short", cycle);
                self.logger.log(GcEvent::FullDeferred { cycle });
            } else if self.sizer.is_really_full(heap, SpaceKind::Immutable, 0, false)
                || self.sizer.is_really_full(heap, SpaceKind::Mutable, words_needed, false)
            {
                let mutable_free_words = heap.free_words(SpaceKind::Mutable);
                let immutable_free_words = heap.free_words(SpaceKind::Immutable);
                log::warn!(
                    "[MGC] cycle {}: cannot make {} words available ({} mutable, {} immutable free)",
                    cycle,
                    words_needed,
                    mutable_free_words,
                    immutable_free_words
                );
                self.logger.log(GcEvent::AllocationFailure {
                    words_needed,
                    mutable_free_words,
                    immutable_free_words,
                });
                return Attempt::Failed;
            }
        }

        if self.should_recollect(heap) {
            self.state.defer_full_next_time |= full;
            self.state.this_generation += 1;
            self.logger.log(GcEvent::GenerationRecollected {
                cycle,
                generation: self.state.this_generation,
            });
        } else {
            for space in heap.local_spaces_mut() {
                space.merge_generation();
            }
            self.state.this_generation = 0;
            self.logger.log(GcEvent::GenerationMerged { cycle });
        }

        if !heap
            .spaces_of(SpaceKind::Mutable)
            .any(|space| space.free_words() >= words_needed)
        {
            return Attempt::Retry(RetryReason::MutableSpaceShort);
        }

        if self.state.defer_full_next_time {
            if let Some(percent) = self.scheduler.heap_load_percent(heap) {
                self.logger.log(GcEvent::HeapLoad {
                    percent,
                    threshold: self.scheduler.threshold_percent(),
                });
            }
            if self.scheduler.should_collect_now(heap) {
                return Attempt::Retry(RetryReason::HeapLoad);
            }
        }

        Attempt::Done
    }

    fn should_recollect(&self, heap: &MemoryManager) -> bool {
        self.policy.should_recollect(heap, self.state.this_generation)
    }

    fn adjust(
        &self,
        heap: &mut MemoryManager,
        kind: SpaceKind,
        words_required: usize,
        progress: &mut CallProgress,
    ) {
        match self.sizer.adjust_size(heap, kind, words_required) {
            Ok(change) => self.record_size_change(kind, change, progress),
            Err(e) => self.fail(e),
        }
    }

    fn record_size_change(&self, kind: SpaceKind, change: SizeChange, progress: &mut CallProgress) {
        if change.grown_words > 0 {
            self.logger.log(GcEvent::HeapGrown {
                kind,
                words: change.grown_words,
            });
        }
        if change.released_words > 0 {
            self.logger.log(GcEvent::HeapShrunk {
                kind,
                words: change.released_words,
                spaces: change.released_spaces,
            });
        }
        progress.change.merge(change);
    }

    fn fail(&self, err: GcError) -> ! {
        log::error!("[MGC] {}", err);
        self.fatal.fatal(&err.to_string())
    }
}

impl fmt::Debug for CollectionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionDriver")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("scheduler", &self.scheduler)
            .field("farm", &self.farm)
            .finish()
    }
}

/// Check the copy phase's post-conditions
///
/// Every frontier stays inside `[bottom, gen_top]`, nothing was copied into a
/// mutable space, and immutable spaces received no more than was marked
/// immutable in them.
pub fn check_copy(heap: &MemoryManager) -> Result<()> {
    for space in heap.local_spaces() {
        space.check_bounds()?;
    }

    let mutable_copied: usize = heap
        .spaces_of(SpaceKind::Mutable)
        .map(|space| space.counters.copied)
        .sum();
    ensure_invariant!(
        mutable_copied == 0,
        "{} words copied into mutable spaces",
        mutable_copied
    );

    let (immutable_copied, immutable_marked) = heap
        .spaces_of(SpaceKind::Immutable)
        .fold((0usize, 0usize), |(copied, marked), space| {
            (copied + space.counters.copied, marked + space.counters.immutable_marked)
        });
    ensure_invariant!(
        immutable_copied <= immutable_marked,
        "{} words copied into immutable spaces but only {} marked there",
        immutable_copied,
        immutable_marked
    );

    Ok(())
}

/// Check the update phase's accounting identity
pub fn check_update(heap: &MemoryManager, overflow: usize) -> Result<()> {
    let spaces = heap.local_spaces();
    let immutable_marked: usize = spaces.iter().map(|s| s.counters.immutable_marked).sum();
    let mutable_marked: usize = spaces.iter().map(|s| s.counters.mutable_marked).sum();
    let (immutable_updated, mutable_updated) = spaces.iter().fold(
        (0usize, 0usize),
        |(imm, mutable), space: &LocalSpace| match space.kind() {
            SpaceKind::Immutable => (imm + space.counters.updated, mutable),
            SpaceKind::Mutable => (imm, mutable + space.counters.updated),
        },
    );

    ensure_invariant!(
        overflow <= immutable_marked && immutable_updated == immutable_marked - overflow,
        "immutable spaces updated {} words, expected {} marked - {} overflow",
        immutable_updated,
        immutable_marked,
        overflow
    );
    ensure_invariant!(
        mutable_updated == mutable_marked + overflow,
        "mutable spaces updated {} words, expected {} marked + {} overflow",
        mutable_updated,
        mutable_marked,
        overflow
    );

    Ok(())
}
