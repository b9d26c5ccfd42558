//! Hook traits — the integration dispatch interface
//!
//! Integrations supply hook logic through `HookProvider`; the engine
//! resolves a provider at most once per call-site identity and caches
//! the result. The ambient tracing context and the failure channel are
//! collaborator traits consumed by the engine without inspection.

use std::sync::Arc;

use crate::error::{Fault, HookError};
use crate::state::{CallReturn, CallState, TraceHandle};
use crate::value::{TypeSig, Value};

// ============================================================================
// Call-site identity
// ============================================================================

/// Name of an integration (which hook logic to bind).
///
/// Compared and hashed by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntegrationId(Arc<str>);

impl IntegrationId {
    /// Intern an integration name
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// The integration name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one interception binding: integration, target-object
/// type, and the ordered argument types. Distinct arities are distinct
/// identities even for the same integration and target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteKey {
    /// Which hook logic to bind
    pub integration: IntegrationId,
    /// The target-object type at the call site
    pub target: TypeSig,
    /// Ordered argument types
    pub args: Vec<TypeSig>,
}

impl SiteKey {
    /// Build a key
    pub fn new(integration: IntegrationId, target: TypeSig, args: Vec<TypeSig>) -> Self {
        Self {
            integration,
            target,
            args,
        }
    }

    /// Number of argument slots
    #[inline]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// A hook resolution request, wrapping the identity being bound.
#[derive(Debug, Clone, Copy)]
pub struct HookRequest<'a> {
    key: &'a SiteKey,
}

impl<'a> HookRequest<'a> {
    /// Wrap an identity
    pub fn new(key: &'a SiteKey) -> Self {
        Self { key }
    }

    /// The identity being bound
    pub fn key(&self) -> &SiteKey {
        self.key
    }

    /// The integration to resolve
    pub fn integration(&self) -> &IntegrationId {
        &self.key.integration
    }

    /// The target-object type
    pub fn target(&self) -> &TypeSig {
        &self.key.target
    }

    /// Ordered argument types
    pub fn args(&self) -> &[TypeSig] {
        &self.key.args
    }

    /// Number of argument slots
    pub fn arity(&self) -> usize {
        self.key.arity()
    }
}

// ============================================================================
// Hook + provider
// ============================================================================

/// Integration-supplied logic executed at method begin and end.
///
/// `on_begin` receives the arguments by mutable reference so the hook
/// can rewrite them in place before the real call proceeds. `on_end`
/// receives the original return value (mutable, for value-returning
/// targets) and any fault the call site observed.
pub trait Hook: Send + Sync {
    /// Called on method entry. Returns the state token carried to `on_end`.
    fn on_begin(
        &self,
        target: Option<&Value>,
        args: &mut [&mut Value],
    ) -> Result<CallState, HookError>;

    /// Called on method exit with the matching state token.
    fn on_end(
        &self,
        target: Option<&Value>,
        ret: Option<&mut Value>,
        fault: Option<&Fault>,
        state: CallState,
    ) -> Result<CallReturn, HookError>;
}

/// Supplies hook implementations for call-site identities.
///
/// `Ok(None)` means the integration declines this shape ("not
/// applicable") — the identity is disabled silently, with no failure
/// recorded. `Err` disables the identity and records the cause.
pub trait HookProvider: Send + Sync {
    /// Resolve a hook for the requested identity, at most once per identity
    fn resolve(&self, request: &HookRequest<'_>) -> Result<Option<Arc<dyn Hook>>, HookError>;
}

/// A provider that declines every identity
pub struct NoopHookProvider;

impl HookProvider for NoopHookProvider {
    fn resolve(&self, _request: &HookRequest<'_>) -> Result<Option<Arc<dyn Hook>>, HookError> {
        Ok(None)
    }
}

// ============================================================================
// Tracing + failure collaborators
// ============================================================================

/// Read-only accessor for the ambient tracing context.
///
/// The engine snapshots this at begin time and stores the handle in the
/// state token without inspecting it.
pub trait TraceSource: Send + Sync {
    /// The currently active tracing context, if any
    fn active(&self) -> Option<TraceHandle>;
}

/// A trace source with no ambient context
pub struct NoopTraceSource;

impl TraceSource for NoopTraceSource {
    fn active(&self) -> Option<TraceHandle> {
        None
    }
}

/// Receives failures for external logging.
///
/// `bind_failure` is delivered exactly once per permanently disabled
/// identity. `hook_failure` is the reporting channel for errors thrown
/// by a successfully-bound hook's body; the engine reports and moves
/// on — suppression or propagation policy belongs to the integration.
pub trait FailureSink: Send + Sync {
    /// A hook could not be constructed; the identity is now disabled
    fn bind_failure(&self, key: &SiteKey, error: &HookError);

    /// A bound hook's body failed during a begin/end call
    fn hook_failure(&self, key: &SiteKey, error: &HookError);
}

/// Default sink: one line per failure on stderr
pub struct StderrFailureSink;

impl FailureSink for StderrFailureSink {
    fn bind_failure(&self, key: &SiteKey, error: &HookError) {
        eprintln!("weave: disabled {}: {}", key.integration, error);
    }

    fn hook_failure(&self, key: &SiteKey, error: &HookError) {
        eprintln!("weave: hook error in {}: {}", key.integration, error);
    }
}

/// A sink that drops all reports
pub struct NoopFailureSink;

impl FailureSink for NoopFailureSink {
    fn bind_failure(&self, _key: &SiteKey, _error: &HookError) {}

    fn hook_failure(&self, _key: &SiteKey, _error: &HookError) {}
}
