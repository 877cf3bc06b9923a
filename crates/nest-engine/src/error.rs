//! Error types for nest-engine.

use thiserror::Error;

/// Result type alias for nest-engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while driving a QuickJS engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Failed to allocate the QuickJS runtime
    #[error("failed to create QuickJS runtime: {0}")]
    Create(String),

    /// Failed to allocate an execution context
    #[error("failed to create QuickJS context: {0}")]
    Context(String),

    /// Operation needs exclusive use of the engine but a call is in flight
    /// on this thread
    #[error("cannot {0} while the engine is executing")]
    Busy(&'static str),

    /// Context handle was created by a different engine
    #[error("context belongs to engine {context_engine}, not {engine}")]
    ForeignContext {
        /// Engine the operation was issued on
        engine: uuid::Uuid,
        /// Engine that created the context
        context_engine: uuid::Uuid,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}
