//! Typed error kinds shared across the runtime.
//!
//! Every fallible operation in the crate returns [`AgentError`]. The variants
//! mirror how failures are handled rather than where they originate: parse
//! failures are retryable inside the planner, depth overruns are substituted
//! with base-case workflows, and transport failures propagate to the caller.
//!
//! | Variant | Raised by | Recovery |
//! |---------|-----------|----------|
//! | `InvalidArgument` | input/config validation | none, surfaced |
//! | `InvalidFormat` | YAML/plan parsing | planner retries (≤ 3), then manual fallback |
//! | `ResourceUnavailable` | querying an uninitialized resource | none, surfaced |
//! | `Timeout` | code execution, LLM calls | reported as a plan-execution failure string |
//! | `DepthExceeded` | recursion control | substituted with a base-case workflow |
//! | `CancellationRequested` | promise adapter | promise cleans up, no delivery callback |
//! | `Internal` | anything unexpected | logged at ERROR, surfaced as an error payload |

use std::error::Error;
use std::fmt;

/// Convenience alias used throughout the crate.
pub type AgentResult<T> = Result<T, AgentError>;

/// The error type for all runtime operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentError {
    /// A caller-supplied argument failed validation (empty problem string,
    /// unknown state referenced by a transition, malformed workflow data).
    InvalidArgument(String),

    /// Text that was expected to parse (workflow YAML, an LLM plan response)
    /// did not have the required structure. The planner treats this class as
    /// retryable; everything else surfaces it as a warning.
    InvalidFormat(String),

    /// A resource was queried before `initialize()` succeeded, or no resource
    /// of the required kind is registered.
    ResourceUnavailable(String),

    /// An operation did not complete within its deadline. Carries a human
    /// readable description including the configured timeout.
    Timeout(String),

    /// The recursion controller refused to plan past the configured maximum
    /// depth. Callers normally never see this variant because the planner
    /// substitutes a base-case workflow instead.
    DepthExceeded {
        /// Depth at which planning was attempted.
        depth: usize,
        /// The configured cap.
        max_depth: usize,
    },

    /// A promise was cancelled before its value was delivered.
    CancellationRequested,

    /// An unexpected failure. The message carries whatever diagnostic detail
    /// was available at the failure site.
    Internal(String),
}

impl AgentError {
    /// Wrap an arbitrary boxed error from a collaborator (LLM transport,
    /// sandbox, input provider) as an [`AgentError::Internal`].
    pub fn from_boxed(err: Box<dyn Error + Send + Sync>) -> Self {
        AgentError::Internal(err.to_string())
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            AgentError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            AgentError::ResourceUnavailable(msg) => write!(f, "Resource unavailable: {}", msg),
            AgentError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            AgentError::DepthExceeded { depth, max_depth } => write!(
                f,
                "Recursion depth {} exceeds the configured maximum of {}",
                depth, max_depth
            ),
            AgentError::CancellationRequested => write!(f, "Cancellation requested"),
            AgentError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl Error for AgentError {}
