//! State token and return wrapper
//!
//! A `CallState` is produced by a begin hook and carried by the
//! rewritten call site across the intercepted method's execution to the
//! matching end hook. A `CallReturn` is produced by the end hook and
//! consumed by the call site to obtain the effective return value.
//!
//! Both are always produced — when no hook is bound, the degenerate
//! `CallState::none()` / `CallReturn::retain()` keep the rewritten call
//! site unconditionally well-formed, with no allocation.

use std::any::Any;
use std::sync::Arc;

use crate::value::Value;

/// Opaque snapshot of the ambient tracing context, owned by the
/// external tracing collaborator and consumed without inspection.
pub type TraceHandle = Arc<dyn Any + Send + Sync>;

// ============================================================================
// CallState
// ============================================================================

/// Opaque token correlating a begin call with its matching end call.
///
/// Carries the tracing context active at begin time and an
/// integration-specific payload. No shared mutable fields; the token is
/// moved from begin to end by the call site.
#[derive(Clone)]
pub struct CallState {
    trace: Option<TraceHandle>,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl CallState {
    /// The degenerate token, returned for unbound or disabled identities
    #[inline]
    pub fn none() -> Self {
        Self {
            trace: None,
            payload: None,
        }
    }

    /// Token with an integration payload and no trace snapshot yet
    pub fn with_payload(payload: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            trace: None,
            payload: Some(payload),
        }
    }

    /// Fill in the trace snapshot if the hook left it empty
    pub fn or_trace(mut self, trace: Option<TraceHandle>) -> Self {
        if self.trace.is_none() {
            self.trace = trace;
        }
        self
    }

    /// The tracing context captured at begin time
    pub fn trace(&self) -> Option<&TraceHandle> {
        self.trace.as_ref()
    }

    /// The integration payload
    pub fn payload(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.payload.as_ref()
    }

    /// Downcast the payload to a concrete type
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }

    /// True for the degenerate token
    pub fn is_none(&self) -> bool {
        self.trace.is_none() && self.payload.is_none()
    }
}

impl std::fmt::Debug for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallState")
            .field("trace", &self.trace.is_some())
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

// ============================================================================
// CallReturn
// ============================================================================

/// Wrapper produced by an end hook, carrying the possibly-replaced
/// return value.
#[derive(Debug, Clone, PartialEq)]
pub struct CallReturn {
    value: Option<Value>,
}

impl CallReturn {
    /// Keep the original return value
    #[inline]
    pub fn retain() -> Self {
        Self { value: None }
    }

    /// Substitute the return value
    pub fn replace(value: Value) -> Self {
        Self { value: Some(value) }
    }

    /// The replacement value, if any
    pub fn replaced(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Resolve the effective return value at the call site
    pub fn into_value(self, original: Value) -> Value {
        self.value.unwrap_or(original)
    }
}
