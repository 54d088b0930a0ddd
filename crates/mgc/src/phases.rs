//! Collection Phases - Collaborator Contracts
//!
//! The driver does not trace, move or fix up objects itself. Those
//! algorithms depend on the object layout of the runtime and are supplied
//! through `CollectionPhases`. Each phase may fan out over the task farm but
//! must return only once all of its work is finished.
//!
//! Phase Contracts:
//! ```text
//! mark            set mark bits in [gen_bottom, gen_top) of every space and
//!                 fill immutable_marked / mutable_marked
//! scan_weak_refs  clear weak references to unmarked objects, within the
//!                 weak bounds recorded during marking
//! copy            compact marked objects downward in address order; immutable
//!                 objects go to immutable spaces only; fill `copied`, move
//!                 `pointer`, return the words of immutable data that had to
//!                 stay in mutable spaces (the overflow)
//! update          rewrite references to moved objects; fill `updated`
//! check_integrity optional whole-heap consistency check
//! ```
//!
//! After `update` the driver checks
//! `Σ updated(immutable spaces) = Σ immutable_marked - overflow` and
//! `Σ updated(mutable spaces) = Σ mutable_marked + overflow`.

use crate::error::Result;
use crate::heap::MemoryManager;
use crate::task_farm::TaskFarm;

/// Mark, copy and update algorithms used by the driver
pub trait CollectionPhases: Send {
    /// Trace from the roots
    fn mark(&mut self, heap: &mut MemoryManager, farm: &TaskFarm);

    /// Process weak references found while marking
    fn scan_weak_refs(&mut self, heap: &mut MemoryManager, farm: &TaskFarm) {
        let _ = (heap, farm);
    }

    /// Compact live objects; returns the immutable overflow in words
    fn copy(&mut self, heap: &mut MemoryManager, farm: &TaskFarm) -> usize;

    /// Fix up references to moved objects
    fn update(&mut self, heap: &mut MemoryManager, farm: &TaskFarm);

    /// Verify the heap after sizing
    fn check_integrity(&self, heap: &MemoryManager) -> Result<()> {
        let _ = heap;
        Ok(())
    }
}

/// Hook for unrecoverable errors
///
/// Called when a heap invariant is broken or the task farm cannot be
/// initialised. Must not return.
pub trait FatalHandler: Send + Sync {
    fn fatal(&self, message: &str) -> !;
}

/// Log the message and abort the process
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnFatal;

impl FatalHandler for AbortOnFatal {
    fn fatal(&self, message: &str) -> ! {
        log::error!("[MGC] fatal: {}", message);
        eprintln!("[MGC] fatal: {}", message);
        std::process::abort()
    }
}

/// Log the message and panic
///
/// For hosts that catch unwinds at their boundary, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicOnFatal;

impl FatalHandler for PanicOnFatal {
    fn fatal(&self, message: &str) -> ! {
        log::error!("[MGC] fatal: {}", message);
        panic!("{}", message)
    }
}
