//! Invocation dispatcher
//!
//! The public entry surface the call-site rewriter targets: per-site
//! `begin`/`end` operations backed by a lazily constructed, permanently
//! cached hook binding per call-site identity.

mod binding;
mod site;

pub use binding::{BindingCache, SiteBinding};
pub use site::{CallSite, Dispatcher, DispatcherBuilder, DispatcherStats};
