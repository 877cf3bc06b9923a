//! Runtime configuration types.
//!
//! Options can be built in code with [`RuntimeOptions::builder`] or loaded
//! from environment variables with [`RuntimeOptions::from_env`].

use crate::console::ConsoleSink;
use crate::error::SandboxError;
use nest_engine::EngineConfig;
use std::fmt;
use std::time::Duration;

/// Default runtime timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Options for creating a sandbox runtime.
#[derive(Clone)]
pub struct RuntimeOptions {
    /// Execution timeout. Stored and reported, not enforced.
    pub timeout: Duration,
    /// Limits for the runtime's engine.
    pub engine: EngineConfig,
    /// Where `console` output goes (a `tracing` event per line when unset).
    pub console: Option<ConsoleSink>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            engine: EngineConfig::default(),
            console: None,
        }
    }
}

impl fmt::Debug for RuntimeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeOptions")
            .field("timeout", &self.timeout)
            .field("engine", &self.engine)
            .field("console", &self.console.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl RuntimeOptions {
    /// Create a new options builder.
    pub fn builder() -> RuntimeOptionsBuilder {
        RuntimeOptionsBuilder::default()
    }

    /// Load options from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `NEST_TIMEOUT_MS` | `30000` |
    /// | `NEST_MEMORY_LIMIT_MIB` | `256` |
    /// | `NEST_MAX_STACK_KIB` | `1024` |
    /// | `NEST_GC_THRESHOLD_KIB` | engine default |
    ///
    /// Unparseable or out-of-range values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let timeout = number("NEST_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(default.timeout);
        let bytes = |key: &str, unit: usize| {
            number(key)
                .and_then(|n| usize::try_from(n).ok())
                .and_then(|n| n.checked_mul(unit))
        };

        let memory_limit =
            bytes("NEST_MEMORY_LIMIT_MIB", 1024 * 1024).unwrap_or(default.engine.memory_limit);
        let max_stack_size =
            bytes("NEST_MAX_STACK_KIB", 1024).unwrap_or(default.engine.max_stack_size);
        let gc_threshold = bytes("NEST_GC_THRESHOLD_KIB", 1024);

        Self {
            timeout,
            engine: EngineConfig {
                memory_limit,
                max_stack_size,
                gc_threshold,
                ..default.engine
            },
            console: None,
        }
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<(), SandboxError> {
        self.engine
            .validate()
            .map_err(|e| SandboxError::InvalidArgument(e.to_string()))
    }
}

/// Builder for RuntimeOptions.
#[derive(Debug, Default)]
pub struct RuntimeOptionsBuilder {
    options: RuntimeOptions,
}

impl RuntimeOptionsBuilder {
    /// Set the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Set the timeout in milliseconds.
    pub fn timeout_ms(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    /// Set the engine heap ceiling in bytes.
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.options.engine.memory_limit = bytes;
        self
    }

    /// Set the engine stack ceiling in bytes.
    pub fn max_stack_size(mut self, bytes: usize) -> Self {
        self.options.engine.max_stack_size = bytes;
        self
    }

    /// Set the GC threshold in bytes.
    pub fn gc_threshold(mut self, bytes: usize) -> Self {
        self.options.engine.gc_threshold = Some(bytes);
        self
    }

    /// Set the cap on jobs executed per drain.
    pub fn drain_limit(mut self, jobs: usize) -> Self {
        self.options.engine.drain_limit = jobs;
        self
    }

    /// Route console output to `sink`.
    pub fn console(mut self, sink: ConsoleSink) -> Self {
        self.options.console = Some(sink);
        self
    }

    /// Build the options, validating the engine limits.
    pub fn build(self) -> Result<RuntimeOptions, SandboxError> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_options_defaults() {
        let options = RuntimeOptions::default();
        assert_eq!(options.timeout, Duration::from_millis(30_000));
        assert_eq!(options.engine, EngineConfig::default());
        assert!(options.console.is_none());
    }

    #[test]
    fn test_builder_success() {
        let options = RuntimeOptions::builder()
            .timeout_ms(5_000)
            .memory_limit(64 * 1024 * 1024)
            .gc_threshold(1024 * 1024)
            .build()
            .expect("should build successfully");

        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.engine.memory_limit, 64 * 1024 * 1024);
        assert_eq!(options.engine.gc_threshold, Some(1024 * 1024));
    }

    #[test]
    fn test_builder_validation_tiny_memory() {
        let result = RuntimeOptions::builder().memory_limit(1024).build();
        assert!(matches!(result, Err(SandboxError::InvalidArgument(_))));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("NEST_TIMEOUT_MS", "1500"),
            ("NEST_MEMORY_LIMIT_MIB", "64"),
            ("NEST_MAX_STACK_KIB", "512"),
            ("NEST_GC_THRESHOLD_KIB", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let options = RuntimeOptions::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(options.timeout, Duration::from_millis(1500));
        assert_eq!(options.engine.memory_limit, 64 * 1024 * 1024);
        assert_eq!(options.engine.max_stack_size, 512 * 1024);
        assert!(options.engine.gc_threshold.is_none());
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let options = RuntimeOptions::from_lookup(|_| None);
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert_eq!(options.engine, EngineConfig::default());
    }

    #[test]
    fn test_from_lookup_overflow_is_default() {
        let max = u64::MAX.to_string();
        let options = RuntimeOptions::from_lookup(|key| match key {
            "NEST_MEMORY_LIMIT_MIB" | "NEST_MAX_STACK_KIB" | "NEST_GC_THRESHOLD_KIB" => {
                Some(max.clone())
            }
            _ => None,
        });
        assert_eq!(options.engine.memory_limit, EngineConfig::default().memory_limit);
        assert_eq!(options.engine.max_stack_size, EngineConfig::default().max_stack_size);
        assert!(options.engine.gc_threshold.is_none());
    }
}
