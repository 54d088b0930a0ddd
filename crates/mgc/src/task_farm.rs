//! Task Farm - Worker Pool for the Parallel Phases
//!
//! Mark, copy and update are internally parallel. Each phase opens a scope on
//! the farm, submits tasks, and returns only when every task it submitted
//! (including tasks those tasks submitted) has finished. That scope is the
//! barrier between phases.
//!
//! Submission is "add work or run now": once `queue_depth` tasks are waiting
//! for a worker, the submitting thread runs the next task itself instead of
//! queueing it. This bounds the queue during deep traversals.
//!
//! The farm is process-wide. It is initialised once, before the first
//! collection, and drivers hold a shared handle to it.

use crate::error::{GcError, Result};
use crossbeam::utils::CachePadded;
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

static GLOBAL_FARM: OnceLock<Arc<TaskFarm>> = OnceLock::new();

/// TaskFarm - fixed pool of GC worker threads
pub struct TaskFarm {
    pool: ThreadPool,
    threads: usize,
    queue_depth: usize,
    /// Tasks submitted but not yet started
    pending: CachePadded<AtomicUsize>,
    /// Tasks run inline because the queue was full
    inline_runs: CachePadded<AtomicU64>,
    /// Tasks handed to workers
    queued_runs: CachePadded<AtomicU64>,
}

impl TaskFarm {
    /// Build a farm with `threads` workers
    pub fn new(threads: usize, queue_depth: usize) -> Result<Self> {
        if threads == 0 {
            return Err(GcError::TaskFarm("thread count must be > 0".to_string()));
        }
        if queue_depth == 0 {
            return Err(GcError::TaskFarm("queue depth must be > 0".to_string()));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("mgc-worker-{}", index))
            .build()
            .map_err(|e| GcError::TaskFarm(e.to_string()))?;

        log::debug!(
            "[MGC] task farm started: {} threads, queue depth {}",
            threads,
            queue_depth
        );

        Ok(Self {
            pool,
            threads,
            queue_depth,
            pending: CachePadded::new(AtomicUsize::new(0)),
            inline_runs: CachePadded::new(AtomicU64::new(0)),
            queued_runs: CachePadded::new(AtomicU64::new(0)),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Tasks currently waiting for a worker
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Tasks that ran on the submitting thread
    pub fn inline_runs(&self) -> u64 {
        self.inline_runs.load(Ordering::Relaxed)
    }

    /// Tasks handed to worker threads
    pub fn queued_runs(&self) -> u64 {
        self.queued_runs.load(Ordering::Relaxed)
    }

    /// Run one parallel phase
    ///
    /// `body` submits tasks through the `PhaseScope`. Returns once `body` and
    /// every submitted task have completed.
    pub fn run_phase<'scope, F, R>(&'scope self, body: F) -> R
    where
        F: FnOnce(&PhaseScope<'_, 'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(|scope| {
            body(&PhaseScope {
                scope,
                farm: self,
            })
        })
    }
}

impl fmt::Debug for TaskFarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFarm")
            .field("threads", &self.threads)
            .field("queue_depth", &self.queue_depth)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Submission handle for one phase
pub struct PhaseScope<'s, 'scope> {
    scope: &'s Scope<'scope>,
    farm: &'scope TaskFarm,
}

impl<'s, 'scope> PhaseScope<'s, 'scope> {
    /// Queue `task`, or run it now if the queue is full
    ///
    /// The task receives a scope of its own so it can submit further work to
    /// the same phase.
    pub fn add_work_or_run_now<T>(&self, task: T)
    where
        T: for<'t> FnOnce(&PhaseScope<'t, 'scope>) + Send + 'scope,
    {
        let farm = self.farm;
        if farm.pending.load(Ordering::Acquire) >= farm.queue_depth {
            farm.inline_runs.fetch_add(1, Ordering::Relaxed);
            task(self);
            return;
        }

        farm.pending.fetch_add(1, Ordering::AcqRel);
        farm.queued_runs.fetch_add(1, Ordering::Relaxed);
        self.scope.spawn(move |scope| {
            farm.pending.fetch_sub(1, Ordering::AcqRel);
            task(&PhaseScope { scope, farm });
        });
    }

    pub fn farm(&self) -> &'scope TaskFarm {
        self.farm
    }
}

/// Initialise the process-wide farm
///
/// Fails with `AlreadyInitialized` on a second call.
pub fn initialise(threads: usize, queue_depth: usize) -> Result<Arc<TaskFarm>> {
    if GLOBAL_FARM.get().is_some() {
        return Err(GcError::AlreadyInitialized("GC task farm"));
    }
    let farm = Arc::new(TaskFarm::new(threads, queue_depth)?);
    GLOBAL_FARM
        .set(Arc::clone(&farm))
        .map_err(|_| GcError::AlreadyInitialized("GC task farm"))?;
    Ok(farm)
}

/// The process-wide farm, if initialised
pub fn global() -> Option<Arc<TaskFarm>> {
    GLOBAL_FARM.get().cloned()
}
