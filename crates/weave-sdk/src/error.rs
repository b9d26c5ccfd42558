//! Error types for the Weave SDK

use std::sync::Arc;

/// Hook resolution and execution errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookError {
    /// The provider failed while synthesizing a hook for an identity
    #[error("Hook resolution failed: {0}")]
    Resolution(String),

    /// A bound hook's body failed during begin/end
    #[error("Hook execution failed: {0}")]
    Execution(String),

    /// The call surface arity does not match the bound identity
    #[error("Arity mismatch: bound for {expected} arguments, called with {got}")]
    ArityMismatch {
        /// Argument count the identity was bound with
        expected: usize,
        /// Argument count at the call surface
        got: usize,
    },
}

impl From<String> for HookError {
    fn from(s: String) -> Self {
        HookError::Execution(s)
    }
}

impl From<&str> for HookError {
    fn from(s: &str) -> Self {
        HookError::Execution(s.to_string())
    }
}

/// The fault observed by the rewritten call site on method exit,
/// passed opaquely to the end hook.
#[derive(Debug, Clone)]
pub struct Fault {
    message: Arc<str>,
}

impl Fault {
    /// Wrap a fault message
    pub fn new(message: &str) -> Self {
        Self {
            message: Arc::from(message),
        }
    }

    /// The fault message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
