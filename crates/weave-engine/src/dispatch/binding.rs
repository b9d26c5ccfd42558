//! Per-identity hook bindings
//!
//! A `SiteBinding` is the cached state of one call-site identity:
//! enabled flag, memoized hook invoker, and the recorded failure cause.
//! Transitions are forward-only — Unbound to Bound, or Unbound to
//! Disabled — and a disabled identity is never revisited: every later
//! call costs a single relaxed flag check.
//!
//! Construction is memoized per identity through a `OnceCell`, so a
//! first-use race from any number of threads converges on exactly one
//! provider resolution. Unrelated identities never contend on one lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use weave_sdk::{
    CallReturn, CallState, FailureSink, Fault, Hook, HookError, HookProvider, HookRequest,
    SiteKey, Value,
};

/// The hook-invocation callable synthesized for one identity,
/// specialized to its argument arity.
pub(crate) struct HookInvoker {
    hook: Arc<dyn Hook>,
    arity: usize,
}

impl HookInvoker {
    fn new(hook: Arc<dyn Hook>, arity: usize) -> Self {
        Self { hook, arity }
    }

    pub(crate) fn begin(
        &self,
        target: Option<&Value>,
        args: &mut [&mut Value],
    ) -> Result<CallState, HookError> {
        if args.len() != self.arity {
            return Err(HookError::ArityMismatch {
                expected: self.arity,
                got: args.len(),
            });
        }
        self.hook.on_begin(target, args)
    }

    pub(crate) fn end(
        &self,
        target: Option<&Value>,
        ret: Option<&mut Value>,
        fault: Option<&Fault>,
        state: CallState,
    ) -> Result<CallReturn, HookError> {
        self.hook.on_end(target, ret, fault, state)
    }
}

enum BoundState {
    Bound(HookInvoker),
    Disabled,
}

/// Cached binding state for one call-site identity.
pub struct SiteBinding {
    key: SiteKey,
    enabled: AtomicBool,
    state: OnceCell<BoundState>,
    failure: OnceCell<HookError>,
}

impl SiteBinding {
    /// An unbound binding; construction happens on first use.
    pub(crate) fn new(key: SiteKey) -> Self {
        Self {
            key,
            enabled: AtomicBool::new(true),
            state: OnceCell::new(),
            failure: OnceCell::new(),
        }
    }

    /// A binding short-circuited by policy: never enabled, provider
    /// never consulted, nothing recorded.
    pub(crate) fn disabled(key: SiteKey) -> Self {
        let state = OnceCell::new();
        let _ = state.set(BoundState::Disabled);
        Self {
            key,
            enabled: AtomicBool::new(false),
            state,
            failure: OnceCell::new(),
        }
    }

    /// The identity this binding serves
    pub fn key(&self) -> &SiteKey {
        &self.key
    }

    /// False once the identity is disabled (by policy, by a declining
    /// provider, or by a construction failure)
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// True once a hook is bound
    pub fn is_bound(&self) -> bool {
        matches!(self.state.get(), Some(BoundState::Bound(_)))
    }

    /// The recorded construction failure, if that is why the identity
    /// is disabled
    pub fn failure(&self) -> Option<&HookError> {
        self.failure.get()
    }

    /// The steady-state path: one flag check, then the memoized
    /// invoker. First use constructs the binding; construction failures
    /// never propagate to the caller.
    pub(crate) fn invoker(
        &self,
        provider: &dyn HookProvider,
        sink: &dyn FailureSink,
    ) -> Option<&HookInvoker> {
        if !self.enabled.load(Ordering::Acquire) {
            return None;
        }
        let state = self.state.get_or_init(|| self.bind(provider, sink));
        match state {
            BoundState::Bound(invoker) => Some(invoker),
            BoundState::Disabled => None,
        }
    }

    fn bind(&self, provider: &dyn HookProvider, sink: &dyn FailureSink) -> BoundState {
        match provider.resolve(&HookRequest::new(&self.key)) {
            Ok(Some(hook)) => BoundState::Bound(HookInvoker::new(hook, self.key.arity())),
            Ok(None) => {
                // Not applicable: disabled silently, nothing recorded
                self.enabled.store(false, Ordering::Release);
                BoundState::Disabled
            }
            Err(error) => {
                sink.bind_failure(&self.key, &error);
                let _ = self.failure.set(error);
                self.enabled.store(false, Ordering::Release);
                BoundState::Disabled
            }
        }
    }
}

impl std::fmt::Debug for SiteBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteBinding")
            .field("key", &self.key)
            .field("enabled", &self.is_enabled())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Process-wide map of identities to bindings. Lookups for distinct
/// identities proceed independently.
pub struct BindingCache {
    sites: DashMap<SiteKey, Arc<SiteBinding>>,
}

impl BindingCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            sites: DashMap::new(),
        }
    }

    /// Fetch or create the binding for an identity. `enabled_by_policy`
    /// false creates the binding pre-disabled.
    pub fn get_or_create(&self, key: &SiteKey, enabled_by_policy: bool) -> Arc<SiteBinding> {
        if let Some(existing) = self.sites.get(key) {
            return existing.value().clone();
        }
        self.sites
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(if enabled_by_policy {
                    SiteBinding::new(key.clone())
                } else {
                    SiteBinding::disabled(key.clone())
                })
            })
            .value()
            .clone()
    }

    /// Number of observed identities
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// True when no identity has been observed
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Count (bound, disabled) bindings
    pub fn counts(&self) -> (usize, usize) {
        let mut bound = 0;
        let mut disabled = 0;
        for entry in self.sites.iter() {
            if entry.value().is_bound() {
                bound += 1;
            } else if !entry.value().is_enabled() {
                disabled += 1;
            }
        }
        (bound, disabled)
    }
}

impl Default for BindingCache {
    fn default() -> Self {
        Self::new()
    }
}
