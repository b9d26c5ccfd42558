//! Weave Engine
//!
//! Runtime core of the Weave instrumentation framework:
//! - **Dispatcher**: arity-specialized begin/end entry surface with a
//!   per-identity binding cache and permanent disable-on-failure
//!   (`dispatch` module)
//! - **Duck typing**: shape-adapting proxy generator routing expected
//!   shapes to incompatible concrete instances (`duck` module)
//! - **Emission layer**: thunk builder and evaluator used by the proxy
//!   generator (`emit` module)
//! - **Type model**: class/shape registry and the conversion policy
//!   (`types` and `convert` modules)
//!
//! # Example
//!
//! ```rust,ignore
//! use weave_engine::{Dispatcher, SiteKey, IntegrationId, TypeSig, Value};
//!
//! let dispatcher = Dispatcher::builder()
//!     .provider(my_provider)
//!     .build();
//!
//! // The call-site rewriter resolves a site handle once...
//! let site = dispatcher.site(SiteKey::new(
//!     IntegrationId::new("http-client"),
//!     TypeSig::Object,
//!     vec![TypeSig::Prim(PrimKind::I32)],
//! ));
//!
//! // ...and routes every call through it.
//! let mut arg = Value::I32(7);
//! let state = site.begin1(Some(&target), &mut arg);
//! let ret = site.end(Some(&target), None, state);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod convert;
pub mod dispatch;
pub mod duck;
pub mod emit;
pub mod options;
pub mod registry;
pub mod types;

// ============================================================================
// Re-exports from SDK (canonical definitions live in weave-sdk)
// ============================================================================

pub use weave_sdk::{
    CallReturn, CallState, ClassId, FailureSink, Fault, Hook, HookError, HookProvider,
    HookRequest, IntegrationId, NoopFailureSink, NoopHookProvider, NoopTraceSource, ObjectRef,
    PrimKind, ShapeId, SiteKey, StderrFailureSink, TraceHandle, TraceSource, TypeSig, Value,
};

// ============================================================================
// Re-exports from engine modules
// ============================================================================

pub use convert::{Conversion, ConvertError};
pub use dispatch::{CallSite, Dispatcher, DispatcherBuilder, DispatcherStats, SiteBinding};
pub use duck::{AdapterHandle, AdapterPlan, DuckError, ProxyFactory, ProxyStats};
pub use emit::{EmitError, Label, Op, Thunk, ThunkBuilder};
pub use options::DispatcherOptions;
pub use registry::{DelegateFn, DelegateIndex, DelegateRegistry};
pub use types::{
    ClassDesc, ClassKind, MemberDesc, MemberFn, MemberKind, ShapeDescriptor, ShapeMember,
    TypeError, TypeRegistry,
};

/// Thunk evaluation and member invocation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    /// A runtime conversion failed at the point of use
    #[error("Invalid cast: {from} is not {to}")]
    InvalidCast {
        /// Runtime kind of the offending value
        from: String,
        /// The type the conversion required
        to: String,
    },

    /// An instance member was invoked without a receiver
    #[error("Null receiver")]
    NullReceiver,

    /// An argument slot past the call's arity was loaded
    #[error("Argument slot {0} out of range")]
    ArgOutOfRange(u8),

    /// The operand stack was exhausted mid-evaluation
    #[error("Operand stack underflow")]
    StackUnderflow,

    /// An indirect call referenced an unregistered artifact index
    #[error("No delegate registered at index {0}")]
    MissingDelegate(u32),

    /// An adapter was invoked with a member name outside its shape
    #[error("Unknown member: {0}")]
    UnknownMember(String),

    /// An operand had the wrong runtime kind for the instruction
    #[error("Type error: {0}")]
    TypeError(String),

    /// A concrete member's body failed
    #[error("Member call failed: {0}")]
    Call(String),
}

impl From<String> for RuntimeError {
    fn from(s: String) -> Self {
        RuntimeError::Call(s)
    }
}

/// Engine evaluation result
pub type RuntimeResult<T> = Result<T, RuntimeError>;
