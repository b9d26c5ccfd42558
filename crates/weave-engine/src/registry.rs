//! Generated-artifact registry
//!
//! Process-wide, append-only table of generated callables. Emitted
//! thunks cannot embed a live reference to a dynamically created
//! callable in their static form, so they reference artifacts through a
//! small integer index resolved at call time; this registry is the
//! indirection table.
//!
//! Indices are monotonically increasing and never reused; entries are
//! never removed. The table is guarded by a single mutex for append and
//! read — a deliberate global contention point touched only during
//! synthesis and indirect calls, never on the dispatcher's steady-state
//! path.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use weave_sdk::Value;

use crate::RuntimeError;

/// A generated callable: receiver (None in static contexts) plus
/// evaluated arguments, producing a value or a runtime error.
pub type DelegateFn =
    Arc<dyn Fn(Option<&Value>, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Stable index of a registered artifact. Valid for the process
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateIndex(pub u32);

/// Append-only table of generated callables.
pub struct DelegateRegistry {
    slots: Mutex<Vec<DelegateFn>>,
}

impl DelegateRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Append an artifact, returning its permanent index
    pub fn register(&self, delegate: DelegateFn) -> DelegateIndex {
        let mut slots = self.slots.lock();
        let index = DelegateIndex(slots.len() as u32);
        slots.push(delegate);
        index
    }

    /// Resolve an index to its artifact
    pub fn lookup(&self, index: DelegateIndex) -> Option<DelegateFn> {
        self.slots.lock().get(index.0 as usize).cloned()
    }

    /// Number of registered artifacts
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True when nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DelegateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Lazy<DelegateRegistry> = Lazy::new(DelegateRegistry::new);

/// The process-wide registry. Initialized on first use, never torn down.
pub fn global() -> &'static DelegateRegistry {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = DelegateRegistry::new();
        let idx = registry.register(Arc::new(|_recv, _args| Ok(Value::I32(1))));

        let delegate = registry.lookup(idx).expect("registered");
        assert_eq!(delegate(None, &[]).unwrap(), Value::I32(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_indices_monotonic_and_stable() {
        let registry = DelegateRegistry::new();
        let a = registry.register(Arc::new(|_, _| Ok(Value::I32(1))));
        let b = registry.register(Arc::new(|_, _| Ok(Value::I32(2))));

        assert!(b.0 > a.0);
        // Earlier indices still resolve after later appends
        assert_eq!(registry.lookup(a).unwrap()(None, &[]).unwrap(), Value::I32(1));
        assert_eq!(registry.lookup(b).unwrap()(None, &[]).unwrap(), Value::I32(2));
    }

    #[test]
    fn test_lookup_unknown_index() {
        let registry = DelegateRegistry::new();
        assert!(registry.lookup(DelegateIndex(99)).is_none());
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(DelegateRegistry::new());

        let handles: Vec<_> = (0..8i64)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let mut indices = Vec::new();
                    for _ in 0..100 {
                        indices.push(registry.register(Arc::new(move |_, _| Ok(Value::I64(i)))));
                    }
                    indices
                })
            })
            .collect();

        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|idx| idx.0)
            .collect();
        all.sort_unstable();
        all.dedup();

        // No index handed out twice
        assert_eq!(all.len(), 800);
        assert_eq!(registry.len(), 800);
    }
}
