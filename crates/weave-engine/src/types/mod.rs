//! Type model: classes, members, shapes, and the type registry
//!
//! The registry is the engine's reflection surface, built once at
//! startup by host registration calls. Classes carry member tables and
//! inheritance/interface edges; shapes are the structural contracts the
//! proxy generator satisfies. Each primitive kind owns a builtin box
//! class whose capability set governs boxed conversions.
//!
//! Shapes are deduplicated structurally: registering the same
//! descriptor twice yields the same `ShapeId`, which keys the adapter
//! cache.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use weave_sdk::{ClassId, PrimKind, ShapeId, TypeSig, Value};

use crate::registry::{self, DelegateFn, DelegateIndex};
use crate::RuntimeError;

/// A concrete member body: receiver (None for statics) plus arguments.
pub type MemberFn =
    Arc<dyn Fn(Option<&Value>, &[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Type registration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    /// A class with this name is already registered
    #[error("Duplicate class: {0}")]
    DuplicateClass(String),

    /// The class id does not resolve
    #[error("Unknown class id: {0}")]
    UnknownClass(u32),
}

// ============================================================================
// Classes and members
// ============================================================================

/// What kind of class a descriptor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Ordinary instantiable class
    Concrete,
    /// Interface: a capability with no member bodies
    Interface,
    /// Builtin box class of a primitive kind
    PrimitiveBox(PrimKind),
}

/// How a member is invoked.
#[derive(Clone)]
pub enum MemberKind {
    /// Ordinary call through the member's own body
    Direct(MemberFn),
    /// Indirect call through the generated-artifact registry, used when
    /// the original calling location must be preserved (e.g. members
    /// invoked on an unboxed primitive receiver)
    Delegate(DelegateIndex),
}

impl std::fmt::Debug for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberKind::Direct(_) => f.write_str("Direct"),
            MemberKind::Delegate(idx) => f.debug_tuple("Delegate").field(idx).finish(),
        }
    }
}

/// A named, invocable member of a concrete class.
#[derive(Debug, Clone)]
pub struct MemberDesc {
    /// Member name
    pub name: Arc<str>,
    /// Parameter types, in order
    pub params: Vec<TypeSig>,
    /// Return type (`Unit` for void members)
    pub ret: TypeSig,
    /// True for static members (no receiver)
    pub is_static: bool,
    /// Invocation strategy
    pub kind: MemberKind,
}

impl MemberDesc {
    /// An instance method with an ordinary body
    pub fn method(
        name: &str,
        params: Vec<TypeSig>,
        ret: TypeSig,
        body: impl Fn(Option<&Value>, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name),
            params,
            ret,
            is_static: false,
            kind: MemberKind::Direct(Arc::new(body)),
        }
    }

    /// A static method with an ordinary body
    pub fn static_method(
        name: &str,
        params: Vec<TypeSig>,
        ret: TypeSig,
        body: impl Fn(Option<&Value>, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name),
            params,
            ret,
            is_static: true,
            kind: MemberKind::Direct(Arc::new(body)),
        }
    }

    /// A zero-argument instance member modeling a property getter
    pub fn getter(
        name: &str,
        ret: TypeSig,
        body: impl Fn(Option<&Value>, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self::method(name, Vec::new(), ret, body)
    }

    /// An instance member whose body is registered in the process-wide
    /// artifact registry and called indirectly by index
    pub fn delegate(
        name: &str,
        params: Vec<TypeSig>,
        ret: TypeSig,
        body: impl Fn(Option<&Value>, &[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        let index = registry::global().register(Arc::new(body) as DelegateFn);
        Self {
            name: Arc::from(name),
            params,
            ret,
            is_static: false,
            kind: MemberKind::Delegate(index),
        }
    }

    /// Number of parameters
    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Declaration of a class: name, kind, inheritance and interface edges,
/// and the member table.
#[derive(Debug, Clone)]
pub struct ClassDesc {
    /// Class name, unique in the registry
    pub name: Arc<str>,
    /// Concrete, interface, or primitive box
    pub kind: ClassKind,
    /// Parent class, if any
    pub parent: Option<ClassId>,
    /// Implemented interfaces
    pub interfaces: Vec<ClassId>,
    /// Member table
    pub members: Vec<MemberDesc>,
}

impl ClassDesc {
    /// A concrete class with no parent
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            kind: ClassKind::Concrete,
            parent: None,
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }

    /// An interface
    pub fn interface(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            kind: ClassKind::Interface,
            parent: None,
            interfaces: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Set the parent class
    pub fn with_parent(mut self, parent: ClassId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Declare an implemented interface
    pub fn implements(mut self, interface: ClassId) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Add a member
    pub fn with_member(mut self, member: MemberDesc) -> Self {
        self.members.push(member);
        self
    }
}

// ============================================================================
// Shapes
// ============================================================================

/// One named member signature a shape requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeMember {
    /// Member name
    pub name: Arc<str>,
    /// Parameter types, in order
    pub params: Vec<TypeSig>,
    /// Return type
    pub ret: TypeSig,
    /// True for static members
    pub is_static: bool,
}

impl ShapeMember {
    /// An instance method signature
    pub fn method(name: &str, params: Vec<TypeSig>, ret: TypeSig) -> Self {
        Self {
            name: Arc::from(name),
            params,
            ret,
            is_static: false,
        }
    }

    /// A static method signature
    pub fn static_method(name: &str, params: Vec<TypeSig>, ret: TypeSig) -> Self {
        Self {
            name: Arc::from(name),
            params,
            ret,
            is_static: true,
        }
    }

    /// A zero-argument getter signature
    pub fn getter(name: &str, ret: TypeSig) -> Self {
        Self::method(name, Vec::new(), ret)
    }
}

/// The expected interface a caller requests from the proxy generator:
/// an ordered set of named member signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeDescriptor {
    /// Shape name (diagnostics only; identity is structural)
    pub name: Arc<str>,
    /// Required members, in order
    pub members: Vec<ShapeMember>,
}

impl ShapeDescriptor {
    /// An empty shape
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            members: Vec::new(),
        }
    }

    /// Add a required member
    pub fn with_member(mut self, member: ShapeMember) -> Self {
        self.members.push(member);
        self
    }
}

// ============================================================================
// Registry
// ============================================================================

struct Tables {
    classes: Vec<ClassDesc>,
    by_name: FxHashMap<Arc<str>, ClassId>,
    shapes: Vec<ShapeDescriptor>,
    shape_ids: FxHashMap<ShapeDescriptor, ShapeId>,
    boxes: [ClassId; PrimKind::ALL.len()],
    string_class: ClassId,
}

/// Process-wide table of classes and shapes.
///
/// Created on demand, lives for the process lifetime, never evicted.
/// All methods take `&self`; the tables are guarded by one `RwLock`.
pub struct TypeRegistry {
    inner: RwLock<Tables>,
}

impl TypeRegistry {
    /// Create a registry with the builtin string and box classes.
    pub fn new() -> Self {
        let mut classes = Vec::new();
        let mut by_name = FxHashMap::default();

        let mut add = |desc: ClassDesc| -> ClassId {
            let id = ClassId(classes.len() as u32);
            by_name.insert(desc.name.clone(), id);
            classes.push(desc);
            id
        };

        let string_class = add(ClassDesc::new("string"));
        let mut boxes = [string_class; PrimKind::ALL.len()];
        for kind in PrimKind::ALL {
            let mut desc = ClassDesc::new(&format!("boxed:{}", kind.name()));
            desc.kind = ClassKind::PrimitiveBox(kind);
            boxes[kind.index()] = add(desc);
        }

        Self {
            inner: RwLock::new(Tables {
                classes,
                by_name,
                shapes: Vec::new(),
                shape_ids: FxHashMap::default(),
                boxes,
                string_class,
            }),
        }
    }

    /// Register a class. Names are unique.
    pub fn register_class(&self, desc: ClassDesc) -> Result<ClassId, TypeError> {
        let mut tables = self.inner.write();
        if tables.by_name.contains_key(&desc.name) {
            return Err(TypeError::DuplicateClass(desc.name.to_string()));
        }
        let id = ClassId(tables.classes.len() as u32);
        tables.by_name.insert(desc.name.clone(), id);
        tables.classes.push(desc);
        Ok(id)
    }

    /// Add a member to a registered class (used to extend builtin box
    /// classes with host members).
    pub fn add_member(&self, class: ClassId, member: MemberDesc) -> Result<(), TypeError> {
        let mut tables = self.inner.write();
        let desc = tables
            .classes
            .get_mut(class.index())
            .ok_or(TypeError::UnknownClass(class.0))?;
        desc.members.push(member);
        Ok(())
    }

    /// Declare that a registered class implements an interface.
    pub fn add_interface(&self, class: ClassId, interface: ClassId) -> Result<(), TypeError> {
        let mut tables = self.inner.write();
        if tables.classes.get(interface.index()).is_none() {
            return Err(TypeError::UnknownClass(interface.0));
        }
        let desc = tables
            .classes
            .get_mut(class.index())
            .ok_or(TypeError::UnknownClass(class.0))?;
        desc.interfaces.push(interface);
        Ok(())
    }

    /// Register a shape, deduplicated structurally: the same descriptor
    /// always yields the same id.
    pub fn register_shape(&self, desc: ShapeDescriptor) -> ShapeId {
        let mut tables = self.inner.write();
        if let Some(id) = tables.shape_ids.get(&desc) {
            return *id;
        }
        let id = ShapeId(tables.shapes.len() as u32);
        tables.shape_ids.insert(desc.clone(), id);
        tables.shapes.push(desc);
        id
    }

    /// Resolve a shape id
    pub fn shape(&self, id: ShapeId) -> Option<ShapeDescriptor> {
        self.inner.read().shapes.get(id.index()).cloned()
    }

    /// Resolve a class name
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.inner.read().by_name.get(name).copied()
    }

    /// A registered class's name
    pub fn class_name(&self, id: ClassId) -> Option<Arc<str>> {
        self.inner
            .read()
            .classes
            .get(id.index())
            .map(|c| c.name.clone())
    }

    /// The builtin box class of a primitive kind
    pub fn box_class(&self, kind: PrimKind) -> ClassId {
        self.inner.read().boxes[kind.index()]
    }

    /// The primitive kind a box class wraps, if it is one
    pub fn boxed_kind(&self, class: ClassId) -> Option<PrimKind> {
        match self.inner.read().classes.get(class.index())?.kind {
            ClassKind::PrimitiveBox(kind) => Some(kind),
            _ => None,
        }
    }

    /// The builtin string class
    pub fn string_class(&self) -> ClassId {
        self.inner.read().string_class
    }

    /// True when `from` is `to` or reaches it through parent/interface
    /// edges.
    pub fn assignable(&self, from: ClassId, to: ClassId) -> bool {
        if from == to {
            return true;
        }
        let tables = self.inner.read();
        let mut pending = vec![from];
        let mut seen = vec![false; tables.classes.len()];
        while let Some(current) = pending.pop() {
            if current == to {
                return true;
            }
            let Some(desc) = tables.classes.get(current.index()) else {
                continue;
            };
            if std::mem::replace(&mut seen[current.index()], true) {
                continue;
            }
            if let Some(parent) = desc.parent {
                pending.push(parent);
            }
            pending.extend(desc.interfaces.iter().copied());
        }
        false
    }

    /// Find a member by name, arity, and staticness, walking the parent
    /// chain. Interfaces carry no bodies and are not searched.
    pub fn find_member(
        &self,
        class: ClassId,
        name: &str,
        arity: usize,
        is_static: bool,
    ) -> Option<MemberDesc> {
        let tables = self.inner.read();
        let mut current = Some(class);
        while let Some(id) = current {
            let desc = tables.classes.get(id.index())?;
            if let Some(member) = desc
                .members
                .iter()
                .find(|m| &*m.name == name && m.arity() == arity && m.is_static == is_static)
            {
                return Some(member.clone());
            }
            current = desc.parent;
        }
        None
    }

    /// The static type of a runtime value. Null types as `Object`.
    pub fn sig_of(&self, value: &Value) -> TypeSig {
        match value {
            Value::Null => TypeSig::Object,
            Value::Str(_) => TypeSig::Class(self.string_class()),
            Value::Obj(obj) => TypeSig::Class(obj.class()),
            prim => TypeSig::Prim(prim.prim_kind().expect("primitive variant")),
        }
    }

    /// The class a value adapts through: its own class for instances,
    /// the string class for strings, the box class for unboxed
    /// primitives. Null has none.
    pub fn runtime_class_of(&self, value: &Value) -> Option<ClassId> {
        match value {
            Value::Null => None,
            Value::Str(_) => Some(self.string_class()),
            Value::Obj(obj) => Some(obj.class()),
            prim => Some(self.box_class(prim.prim_kind()?)),
        }
    }

    /// Substitute enumeration types with their underlying primitive.
    pub fn normalize(&self, sig: &TypeSig) -> TypeSig {
        match sig {
            TypeSig::Enum { underlying, .. } => TypeSig::Prim(*underlying),
            other => other.clone(),
        }
    }

    /// Human-readable name of a type signature, for diagnostics.
    pub fn describe(&self, sig: &TypeSig) -> String {
        match sig {
            TypeSig::Unit => "unit".to_string(),
            TypeSig::Object => "object".to_string(),
            TypeSig::Prim(kind) => kind.name().to_string(),
            TypeSig::Class(id) => self
                .class_name(*id)
                .map(|n| n.to_string())
                .unwrap_or_else(|| format!("class#{}", id.0)),
            TypeSig::Enum { class, underlying } => {
                let name = self
                    .class_name(*class)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("class#{}", class.0));
                format!("{} (enum: {})", name, underlying.name())
            }
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
