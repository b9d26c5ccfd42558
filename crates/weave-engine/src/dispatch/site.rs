//! Dispatcher and per-site entry surface
//!
//! `Dispatcher::site` resolves a call-site identity to a `CallSite`
//! handle once; the rewriter holds the handle and routes every call
//! through its arity-specialized `begin` variant and the matching
//! `end`. When the site's identity is disabled — by policy, by a
//! declining provider, or by a construction failure — every variant
//! returns the degenerate token/wrapper after a single flag check, with
//! no allocation.

use std::sync::Arc;

use weave_sdk::{
    CallReturn, CallState, FailureSink, Fault, HookProvider, NoopHookProvider, NoopTraceSource,
    SiteKey, StderrFailureSink, TraceSource, Value,
};

use crate::dispatch::binding::{BindingCache, SiteBinding};
use crate::options::DispatcherOptions;

struct Shared {
    options: DispatcherOptions,
    provider: Arc<dyn HookProvider>,
    trace: Arc<dyn TraceSource>,
    sink: Arc<dyn FailureSink>,
    cache: BindingCache,
}

// ============================================================================
// Builder
// ============================================================================

/// Configures and builds a `Dispatcher`.
pub struct DispatcherBuilder {
    options: DispatcherOptions,
    provider: Arc<dyn HookProvider>,
    trace: Arc<dyn TraceSource>,
    sink: Arc<dyn FailureSink>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self {
            options: DispatcherOptions::default(),
            provider: Arc::new(NoopHookProvider),
            trace: Arc::new(NoopTraceSource),
            sink: Arc::new(StderrFailureSink),
        }
    }

    /// Set dispatcher options
    pub fn options(mut self, options: DispatcherOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the integration hook provider
    pub fn provider(mut self, provider: Arc<dyn HookProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Set the ambient tracing context accessor
    pub fn trace_source(mut self, trace: Arc<dyn TraceSource>) -> Self {
        self.trace = trace;
        self
    }

    /// Set the failure sink
    pub fn failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the dispatcher
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            shared: Arc::new(Shared {
                options: self.options,
                provider: self.provider,
                trace: self.trace,
                sink: self.sink,
                cache: BindingCache::new(),
            }),
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Binding-cache statistics
#[derive(Debug, Clone, Copy)]
pub struct DispatcherStats {
    /// Identities observed
    pub sites: usize,
    /// Identities with a bound hook
    pub bound: usize,
    /// Identities permanently disabled
    pub disabled: usize,
}

/// The interception dispatcher: owns the collaborators and the
/// per-identity binding cache.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// A dispatcher with default options and no-op collaborators
    pub fn new() -> Self {
        DispatcherBuilder::new().build()
    }

    /// Start configuring a dispatcher
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Resolve the site handle for an identity. The first resolution
    /// creates the binding record (pre-disabled when policy
    /// short-circuits the integration); hook construction itself is
    /// deferred to the first `begin`/`end` through the handle.
    pub fn site(&self, key: SiteKey) -> CallSite {
        let enabled = self.shared.options.integration_enabled(&key.integration);
        let binding = self.shared.cache.get_or_create(&key, enabled);
        CallSite {
            shared: self.shared.clone(),
            binding,
        }
    }

    /// Binding-cache statistics
    pub fn stats(&self) -> DispatcherStats {
        let (bound, disabled) = self.shared.cache.counts();
        DispatcherStats {
            sites: self.shared.cache.len(),
            bound,
            disabled,
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// CallSite
// ============================================================================

/// Per-identity entry surface held by the rewritten call site.
#[derive(Clone)]
pub struct CallSite {
    shared: Arc<Shared>,
    binding: Arc<SiteBinding>,
}

macro_rules! begin_arity {
    ($name:ident, $n:literal, $($arg:ident),+) => {
        #[doc = concat!("Method-entry surface for arity ", stringify!($n),
            ". Arguments are passed by mutable reference so the hook can rewrite them in place.")]
        pub fn $name(&self, target: Option<&Value>, $($arg: &mut Value),+) -> CallState {
            let mut refs: [&mut Value; $n] = [$($arg),+];
            self.begin_with(target, &mut refs)
        }
    };
}

impl CallSite {
    /// The identity this site serves
    pub fn key(&self) -> &SiteKey {
        self.binding.key()
    }

    /// True until the identity is disabled
    pub fn is_enabled(&self) -> bool {
        self.binding.is_enabled()
    }

    /// Method-entry surface for arity 0.
    pub fn begin0(&self, target: Option<&Value>) -> CallState {
        self.begin_with(target, &mut [])
    }

    begin_arity!(begin1, 1, a1);
    begin_arity!(begin2, 2, a1, a2);
    begin_arity!(begin3, 3, a1, a2, a3);
    begin_arity!(begin4, 4, a1, a2, a3, a4);
    begin_arity!(begin5, 5, a1, a2, a3, a4, a5);
    begin_arity!(begin6, 6, a1, a2, a3, a4, a5, a6);
    begin_arity!(begin7, 7, a1, a2, a3, a4, a5, a6, a7);
    begin_arity!(begin8, 8, a1, a2, a3, a4, a5, a6, a7, a8);

    /// Variable-arity entry surface for call sites past the fixed
    /// family. Builds the by-reference view on each call.
    pub fn begin_slow(&self, target: Option<&Value>, args: &mut [Value]) -> CallState {
        let mut refs: Vec<&mut Value> = args.iter_mut().collect();
        self.begin_with(target, &mut refs)
    }

    /// Method-exit surface for void targets.
    pub fn end(&self, target: Option<&Value>, fault: Option<&Fault>, state: CallState) -> CallReturn {
        let Some(invoker) = self
            .binding
            .invoker(&*self.shared.provider, &*self.shared.sink)
        else {
            return CallReturn::retain();
        };
        match invoker.end(target, None, fault, state) {
            Ok(ret) => ret,
            Err(error) => {
                self.shared.sink.hook_failure(self.binding.key(), &error);
                CallReturn::retain()
            }
        }
    }

    /// Method-exit surface for value-returning targets. The hook may
    /// mutate the return value in place or replace it through the
    /// wrapper.
    pub fn end_value(
        &self,
        target: Option<&Value>,
        ret: &mut Value,
        fault: Option<&Fault>,
        state: CallState,
    ) -> CallReturn {
        let Some(invoker) = self
            .binding
            .invoker(&*self.shared.provider, &*self.shared.sink)
        else {
            return CallReturn::retain();
        };
        match invoker.end(target, Some(ret), fault, state) {
            Ok(wrapper) => wrapper,
            Err(error) => {
                self.shared.sink.hook_failure(self.binding.key(), &error);
                CallReturn::retain()
            }
        }
    }

    fn begin_with(&self, target: Option<&Value>, args: &mut [&mut Value]) -> CallState {
        let Some(invoker) = self
            .binding
            .invoker(&*self.shared.provider, &*self.shared.sink)
        else {
            return CallState::none();
        };
        // Ambient context is snapshotted at begin time; the token
        // carries it even when the hook leaves the slot empty.
        let trace = self.shared.trace.active();
        match invoker.begin(target, args) {
            Ok(state) => state.or_trace(trace),
            Err(error) => {
                self.shared.sink.hook_failure(self.binding.key(), &error);
                CallState::none()
            }
        }
    }
}

impl std::fmt::Debug for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSite")
            .field("key", self.binding.key())
            .field("enabled", &self.binding.is_enabled())
            .finish()
    }
}
