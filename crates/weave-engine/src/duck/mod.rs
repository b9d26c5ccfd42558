//! Shape-adapting proxy generator ("duck typing")
//!
//! Adapts a concrete runtime instance to an expected shape: for each
//! member the shape requires, a structurally matching member is located
//! on the concrete class and a forwarding thunk is emitted that loads
//! the receiver, converts each argument per the type-conversion policy,
//! invokes the located member (directly, or indirectly through the
//! artifact registry for delegate members), and converts the result.
//!
//! Adapter plans are cached process-wide per (concrete class, shape)
//! pair; synthesis happens at most once per pair. The whole shape is
//! validated with the non-emitting policy variant before any emission —
//! incompatibility surfaces as a descriptive error naming the member
//! and the offending type pair, and nothing is cached.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use weave_sdk::{ClassId, ShapeId, Value};

use crate::convert::{self, Conversion, ConvertError};
use crate::emit::{EmitError, Op, Thunk, ThunkBuilder};
use crate::types::{MemberDesc, MemberKind, ShapeMember, TypeRegistry};
use crate::{RuntimeError, RuntimeResult};

/// Proxy generation errors
#[derive(Debug, thiserror::Error)]
pub enum DuckError {
    /// Null cannot be adapted
    #[error("Cannot adapt null to a shape")]
    NullInstance,

    /// The shape id does not resolve
    #[error("Unknown shape id: {0}")]
    UnknownShape(u32),

    /// The concrete class has no structural match for a required member
    #[error("{class} has no member matching {shape}::{member}")]
    MemberNotFound {
        /// The requested shape
        shape: String,
        /// The concrete class
        class: String,
        /// The missing member
        member: String,
    },

    /// A parameter type pair was rejected by the conversion policy
    #[error("{shape}::{member} parameter {index}: {source}")]
    IncompatibleParameter {
        /// The requested shape
        shape: String,
        /// The offending member
        member: String,
        /// Zero-based parameter position
        index: usize,
        /// Policy rejection
        source: ConvertError,
    },

    /// The return type pair was rejected by the conversion policy
    #[error("{shape}::{member} return: {source}")]
    IncompatibleReturn {
        /// The requested shape
        shape: String,
        /// The offending member
        member: String,
        /// Policy rejection
        source: ConvertError,
    },

    /// Internal emission failure
    #[error("Emission failed: {0}")]
    Emit(#[from] EmitError),
}

// ============================================================================
// Plans and handles
// ============================================================================

/// A synthesized, cached adapter for one (concrete class, shape) pair.
/// Owns the per-member forwarding thunks; holds no instance data.
pub struct AdapterPlan {
    class: ClassId,
    shape: ShapeId,
    members: Vec<ShapeMember>,
    thunks: Vec<Arc<Thunk>>,
    by_name: FxHashMap<Arc<str>, usize>,
}

impl AdapterPlan {
    /// The concrete class this plan adapts
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// The shape this plan satisfies
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// Number of adapted members
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Adapted member names, in shape order
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| &*m.name)
    }
}

impl std::fmt::Debug for AdapterPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterPlan")
            .field("class", &self.class)
            .field("shape", &self.shape)
            .field("members", &self.members.len())
            .finish()
    }
}

/// A cached plan bound to one concrete instance. Satisfies the shape it
/// was synthesized for; member access routes to the concrete object.
#[derive(Clone)]
pub struct AdapterHandle {
    plan: Arc<AdapterPlan>,
    instance: Value,
    types: Arc<TypeRegistry>,
}

impl AdapterHandle {
    /// Invoke an adapted member by name
    pub fn invoke(&self, member: &str, args: &[Value]) -> RuntimeResult<Value> {
        let index = *self
            .plan
            .by_name
            .get(member)
            .ok_or_else(|| RuntimeError::UnknownMember(member.to_string()))?;
        let receiver = if self.plan.members[index].is_static {
            None
        } else {
            Some(&self.instance)
        };
        self.plan.thunks[index].eval(receiver, args, &self.types)
    }

    /// Read a zero-argument member (getter convenience)
    pub fn get(&self, member: &str) -> RuntimeResult<Value> {
        self.invoke(member, &[])
    }

    /// The wrapped concrete instance
    pub fn instance(&self) -> &Value {
        &self.instance
    }

    /// The shared plan (two handles for the same pair share one plan)
    pub fn plan(&self) -> &Arc<AdapterPlan> {
        &self.plan
    }
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("plan", &self.plan)
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy)]
pub struct ProxyStats {
    /// Number of synthesized plans alive in the cache
    pub cached_plans: usize,
}

// ============================================================================
// Factory
// ============================================================================

struct MemberBinding {
    concrete: MemberDesc,
    arg_convs: Vec<Conversion>,
    ret_conv: Conversion,
}

/// Synthesizes and caches shape adapters.
pub struct ProxyFactory {
    types: Arc<TypeRegistry>,
    plans: DashMap<(ClassId, ShapeId), Arc<AdapterPlan>>,
}

impl ProxyFactory {
    /// Create a factory over a type registry
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            plans: DashMap::new(),
        }
    }

    /// The underlying type registry
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Adapt a concrete instance to a registered shape.
    ///
    /// Unboxed primitives adapt through their box class; a primitive
    /// and its boxed form share one plan.
    pub fn adapt(&self, instance: &Value, shape: ShapeId) -> Result<AdapterHandle, DuckError> {
        let class = self
            .types
            .runtime_class_of(instance)
            .ok_or(DuckError::NullInstance)?;

        if let Some(plan) = self.plans.get(&(class, shape)) {
            return Ok(AdapterHandle {
                plan: plan.value().clone(),
                instance: instance.clone(),
                types: self.types.clone(),
            });
        }

        let plan = match self.plans.entry((class, shape)) {
            Entry::Occupied(entry) => entry.get().clone(),
            // Synthesis runs under the shard lock: concurrent requests
            // for the same pair converge on one construction. Failures
            // leave the slot vacant.
            Entry::Vacant(entry) => {
                let plan = self.build_plan(class, shape)?;
                entry.insert(plan.clone());
                plan
            }
        };

        Ok(AdapterHandle {
            plan,
            instance: instance.clone(),
            types: self.types.clone(),
        })
    }

    /// Non-emitting compatibility probe: would `adapt` succeed for this
    /// (class, shape) pair? Performs no synthesis and caches nothing.
    pub fn validate(&self, class: ClassId, shape: ShapeId) -> Result<(), DuckError> {
        self.bind_members(class, shape).map(|_| ())
    }

    /// Cache statistics
    pub fn stats(&self) -> ProxyStats {
        ProxyStats {
            cached_plans: self.plans.len(),
        }
    }

    fn bind_members(
        &self,
        class: ClassId,
        shape: ShapeId,
    ) -> Result<(Vec<ShapeMember>, Vec<MemberBinding>), DuckError> {
        let descriptor = self
            .types
            .shape(shape)
            .ok_or(DuckError::UnknownShape(shape.0))?;
        let class_name = self
            .types
            .class_name(class)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("class#{}", class.0));

        let mut bindings = Vec::with_capacity(descriptor.members.len());
        for member in &descriptor.members {
            let concrete = self
                .types
                .find_member(class, &member.name, member.params.len(), member.is_static)
                .ok_or_else(|| DuckError::MemberNotFound {
                    shape: descriptor.name.to_string(),
                    class: class_name.clone(),
                    member: member.name.to_string(),
                })?;

            // Arguments arrive typed by the shape and must convert to
            // what the concrete member expects.
            let mut arg_convs = Vec::with_capacity(member.params.len());
            for (index, (shape_param, concrete_param)) in
                member.params.iter().zip(&concrete.params).enumerate()
            {
                let conv = convert::plan(shape_param, concrete_param, &self.types).map_err(
                    |source| DuckError::IncompatibleParameter {
                        shape: descriptor.name.to_string(),
                        member: member.name.to_string(),
                        index,
                        source,
                    },
                )?;
                arg_convs.push(conv);
            }

            // The concrete result must convert to what the shape
            // promises.
            let ret_conv = convert::plan(&concrete.ret, &member.ret, &self.types).map_err(
                |source| DuckError::IncompatibleReturn {
                    shape: descriptor.name.to_string(),
                    member: member.name.to_string(),
                    source,
                },
            )?;

            bindings.push(MemberBinding {
                concrete,
                arg_convs,
                ret_conv,
            });
        }

        Ok((descriptor.members, bindings))
    }

    fn build_plan(&self, class: ClassId, shape: ShapeId) -> Result<Arc<AdapterPlan>, DuckError> {
        // Validation first: no emission happens for a shape the policy
        // rejects anywhere.
        let (members, bindings) = self.bind_members(class, shape)?;

        let mut thunks = Vec::with_capacity(bindings.len());
        let mut by_name = FxHashMap::default();
        for (index, (shape_member, binding)) in members.iter().zip(&bindings).enumerate() {
            thunks.push(Arc::new(Self::emit_member(shape_member, binding)?));
            by_name.insert(shape_member.name.clone(), index);
        }

        Ok(Arc::new(AdapterPlan {
            class,
            shape,
            members,
            thunks,
            by_name,
        }))
    }

    fn emit_member(shape_member: &ShapeMember, binding: &MemberBinding) -> Result<Thunk, EmitError> {
        let mut builder = ThunkBuilder::new();
        let argc = shape_member.params.len() as u8;

        if !shape_member.is_static {
            builder.emit(Op::LoadSelf);
        }
        for (index, conv) in binding.arg_convs.iter().enumerate() {
            builder.emit(Op::LoadArg(index as u8));
            Self::emit_conversion(&mut builder, conv);
        }

        match &binding.concrete.kind {
            MemberKind::Direct(_) => {
                let slot = builder.add_member(binding.concrete.clone());
                builder.emit(Op::CallMember { slot, argc });
            }
            MemberKind::Delegate(index) => {
                builder.emit(Op::CallIndirect {
                    index: *index,
                    argc,
                    has_receiver: !binding.concrete.is_static,
                });
            }
        }

        Self::emit_conversion(&mut builder, &binding.ret_conv);
        builder.emit(Op::Ret);
        builder.build()
    }

    fn emit_conversion(builder: &mut ThunkBuilder, conversion: &Conversion) {
        match conversion {
            Conversion::Identity => {}
            Conversion::Box => {
                builder.emit(Op::Box);
            }
            Conversion::BoxCast(class) => {
                builder.emit(Op::BoxCast(*class));
            }
            Conversion::UnboxChecked(kind) => {
                builder.emit(Op::Unbox(*kind));
            }
            Conversion::CastRef(class) => {
                builder.emit(Op::CastRef(*class));
            }
        }
    }
}
