//! Weave SDK - Lightweight SDK for writing instrumentation hooks
//!
//! This crate provides the minimal types and traits needed to write
//! Weave integrations without depending on the full weave-engine:
//! - **Value model**: the tagged runtime `Value`, type descriptors
//! - **State token**: `CallState` / `CallReturn` carried across an
//!   intercepted call
//! - **Integration traits**: `Hook`, `HookProvider`, plus the tracing
//!   and failure collaborators
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use weave_sdk::{Hook, HookProvider, HookRequest, CallState, CallReturn, HookError};
//!
//! struct TimingHook;
//!
//! impl Hook for TimingHook {
//!     fn on_begin(&self, _target: Option<&Value>, _args: &mut [&mut Value])
//!         -> Result<CallState, HookError>
//!     {
//!         Ok(CallState::with_payload(Arc::new(std::time::Instant::now())))
//!     }
//!
//!     fn on_end(&self, _target: Option<&Value>, _ret: Option<&mut Value>,
//!               _fault: Option<&Fault>, state: CallState)
//!         -> Result<CallReturn, HookError>
//!     {
//!         let started = state.payload_as::<std::time::Instant>().unwrap();
//!         record(started.elapsed());
//!         Ok(CallReturn::retain())
//!     }
//! }
//! ```

#![warn(missing_docs)]

mod error;
mod hook;
mod state;
mod value;

pub use error::{Fault, HookError};
pub use hook::{
    FailureSink, Hook, HookProvider, HookRequest, IntegrationId, NoopFailureSink,
    NoopHookProvider, NoopTraceSource, SiteKey, StderrFailureSink, TraceSource,
};
pub use state::{CallReturn, CallState, TraceHandle};
pub use value::{ClassId, ObjectRef, PrimKind, ShapeId, TypeSig, Value};
