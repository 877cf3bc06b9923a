//! Builder pattern for ergonomic Engine configuration.

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;

/// Fluent builder for configuring and creating Engine instances.
///
/// # Example
///
/// ```no_run
/// use nest_engine::EngineBuilder;
///
/// # fn example() -> nest_engine::Result<()> {
/// let engine = EngineBuilder::new()
///     .memory_limit(64 * 1024 * 1024)
///     .max_stack_size(512 * 1024)
///     .build()?;
///
/// let context = engine.create_context()?;
/// let answer = engine.enter(&context, |ctx| ctx.eval::<i32, _>("6 * 7").ok())?;
/// assert_eq!(answer, Some(42));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Set the heap ceiling in bytes.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.config.memory_limit = bytes;
        self
    }

    /// Set the native stack ceiling in bytes.
    pub fn max_stack_size(mut self, bytes: usize) -> Self {
        self.config.max_stack_size = bytes;
        self
    }

    /// Set the allocation volume that triggers a GC cycle.
    pub fn gc_threshold(mut self, bytes: usize) -> Self {
        self.config.gc_threshold = Some(bytes);
        self
    }

    /// Set the maximum number of pending jobs executed per drain.
    pub fn drain_limit(mut self, jobs: usize) -> Self {
        self.config.drain_limit = jobs;
        self
    }

    /// Build and return the configuration without creating an engine.
    ///
    /// Useful for testing or inspecting the configuration.
    pub fn build_config(self) -> EngineConfig {
        self.config
    }

    /// Build the Engine.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or QuickJS cannot
    /// allocate the runtime.
    pub fn build(self) -> Result<Engine> {
        Engine::create(self.config)
    }
}
