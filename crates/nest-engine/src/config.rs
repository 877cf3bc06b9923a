//! Configuration types for engine instances.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

/// Default memory ceiling for one engine (256 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 256 * 1024 * 1024;

/// Default native stack ceiling for one engine (1 MiB).
pub const DEFAULT_MAX_STACK_SIZE: usize = 1024 * 1024;

/// Default cap on pending jobs executed by a single drain.
pub const DEFAULT_DRAIN_LIMIT: usize = 10_000;

/// Smallest memory ceiling QuickJS can boot a full context under.
const MIN_MEMORY_LIMIT: usize = 1024 * 1024;

/// Smallest stack ceiling accepted.
const MIN_STACK_SIZE: usize = 64 * 1024;

/// Configuration for creating a new engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Heap ceiling in bytes
    pub memory_limit: usize,
    /// Native stack ceiling in bytes
    pub max_stack_size: usize,
    /// Allocation volume that triggers a GC cycle (engine default when unset)
    pub gc_threshold: Option<usize>,
    /// Maximum pending jobs executed per drain
    pub drain_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            gc_threshold: None,
            drain_limit: DEFAULT_DRAIN_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.memory_limit < MIN_MEMORY_LIMIT {
            return Err(EngineError::Config(format!(
                "memory_limit must be at least {MIN_MEMORY_LIMIT} bytes, got {}",
                self.memory_limit
            )));
        }

        if self.max_stack_size < MIN_STACK_SIZE {
            return Err(EngineError::Config(format!(
                "max_stack_size must be at least {MIN_STACK_SIZE} bytes, got {}",
                self.max_stack_size
            )));
        }

        if self.gc_threshold == Some(0) {
            return Err(EngineError::Config("gc_threshold must be > 0".into()));
        }

        if self.drain_limit == 0 {
            return Err(EngineError::Config("drain_limit must be > 0".into()));
        }

        Ok(())
    }
}
