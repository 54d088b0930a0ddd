//! Runtime Initialization
//!
//! Process-wide setup performed once before the first collection:
//! 1. Validate configuration
//! 2. Configure the global GC event logger
//! 3. Start the task farm
//!
//! Failures here cannot be recovered from; they go to the fatal handler.

use crate::config::TuningConfig;
use crate::logging::{self, GcLoggerConfig};
use crate::phases::FatalHandler;
use crate::task_farm::{self, TaskFarm};
use std::sync::Arc;

/// Initialise the collector runtime and return the task farm handle
///
/// A second call returns the farm built by the first; the configuration of
/// later calls is ignored apart from validation.
pub fn initialise(config: &TuningConfig, fatal: &dyn FatalHandler) -> Arc<TaskFarm> {
    if let Err(e) = config.validate() {
        fatal.fatal(&format!("Invalid GC configuration: {}", e));
    }

    if let Some(farm) = task_farm::global() {
        log::debug!("[MGC] runtime already initialised, reusing task farm");
        return farm;
    }

    if config.verbose {
        logging::configure_logger(GcLoggerConfig {
            console: true,
            ..Default::default()
        });
    }

    match task_farm::initialise(config.gc_threads, config.task_queue_depth) {
        Ok(farm) => {
            log::info!(
                "[MGC] runtime initialised: {} GC threads, queue depth {}",
                farm.threads(),
                farm.queue_depth()
            );
            farm
        }
        Err(e) => {
            log::error!("[MGC] task farm initialisation failed: {}", e);
            // Lost a race with a concurrent initialiser.
            if let Some(farm) = task_farm::global() {
                return farm;
            }
            fatal.fatal("Unable to initialise the GC task farm")
        }
    }
}

/// True once the task farm exists
pub fn is_initialised() -> bool {
    task_farm::global().is_some()
}
