//! Error types for nest-core.

use thiserror::Error;

/// Result type alias for nest-core operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Errors that can occur during sandbox operations.
///
/// `Display` yields the single message a host caller sees; there is no
/// structured error code on the public surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// Wrong arity or argument type at a public entry point
    #[error("{0}")]
    InvalidArgument(String),

    /// Operation attempted on a disposed runtime or context
    #[error("{} has been disposed", .0)]
    Disposed(DisposedKind),

    /// The engine instance or its scope could not be allocated
    #[error("failed to construct sandbox engine: {0}")]
    EngineConstruction(String),

    /// Sandbox-side syntax or runtime exception (message text only)
    #[error("{0}")]
    Evaluation(String),

    /// Value kind that cannot cross the boundary
    #[error("cannot marshal {0} across the sandbox boundary")]
    Unsupported(&'static str),

    /// Value graph nests deeper than the marshaling limit (usually a cycle)
    #[error("value nesting exceeds {0} levels")]
    TooDeep(usize),

    /// Operation needs the engine exclusively but is running inside a callback
    #[error("cannot {0} while the sandbox is executing")]
    Busy(&'static str),

    /// Bridge bookkeeping is inconsistent
    #[error("{0}")]
    Internal(String),
}

/// Which kind of object was already disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposedKind {
    /// A sandbox runtime
    Runtime,
    /// A sandbox context
    Context,
}

impl std::fmt::Display for DisposedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Runtime => write!(f, "Runtime"),
            Self::Context => write!(f, "Context"),
        }
    }
}

impl SandboxError {
    /// Shorthand for a disposed context.
    pub fn context_disposed() -> Self {
        Self::Disposed(DisposedKind::Context)
    }

    /// Shorthand for a disposed runtime.
    pub fn runtime_disposed() -> Self {
        Self::Disposed(DisposedKind::Runtime)
    }

    /// Whether this error reports a disposed object.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed(_))
    }
}

impl From<nest_engine::EngineError> for SandboxError {
    fn from(err: nest_engine::EngineError) -> Self {
        use nest_engine::EngineError;
        match err {
            EngineError::Create(_) | EngineError::Context(_) | EngineError::Config(_) => {
                Self::EngineConstruction(err.to_string())
            }
            EngineError::Busy(operation) => Self::Busy(operation),
            EngineError::ForeignContext { .. } => Self::Internal(err.to_string()),
        }
    }
}
