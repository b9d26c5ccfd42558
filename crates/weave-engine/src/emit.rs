//! Low-level code emission
//!
//! Primitive operations for building a *thunk* — a small unit of
//! executable logic the proxy generator synthesizes per adapted member.
//! `ThunkBuilder` provides label definition/marking with jump patching
//! and validates the op sequence before producing an immutable `Thunk`;
//! a compact evaluator executes thunks against a frame of receiver plus
//! argument slots.
//!
//! Calls come in two forms: `CallMember` goes through the thunk's own
//! member table (an ordinary call), `CallIndirect` resolves a callable
//! from the process-wide artifact registry by index, preserving the
//! member's original calling location.

use weave_sdk::{PrimKind, Value};

use crate::convert;
use crate::registry::{self, DelegateIndex};
use crate::types::{MemberDesc, MemberKind, TypeRegistry};
use crate::{ClassId, RuntimeError};

// ============================================================================
// Ops and labels
// ============================================================================

/// A jump target handle, resolved when the builder patches the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    id: u32,
}

/// One emitted instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Push a copy of argument slot `n`
    LoadArg(u8),
    /// Push a copy of the bound receiver
    LoadSelf,
    /// Push a copy of local slot `n`
    LoadLocal(u8),
    /// Pop into local slot `n`
    StoreLocal(u8),
    /// Push an integer constant
    PushI32(i32),
    /// Unconditional branch to an op index
    Jump(u32),
    /// Pop; branch when the popped value is null
    JumpIfNull(u32),
    /// Pop a bool; branch when true
    JumpIfTrue(u32),
    /// Pop a primitive, push it boxed
    Box,
    /// Pop a primitive, push it boxed and narrowed to an interface
    BoxCast(ClassId),
    /// Pop a reference, push the unboxed primitive; cast error when the
    /// runtime value is not a box of this kind
    Unbox(PrimKind),
    /// Pop a reference, push it narrowed; cast error when the runtime
    /// class is incompatible
    CastRef(ClassId),
    /// Pop `argc` arguments (and the receiver for instance members),
    /// invoke the member at `slot` in the thunk's member table, push
    /// the result
    CallMember {
        /// Member table slot
        slot: u16,
        /// Argument count to pop
        argc: u8,
    },
    /// Pop `argc` arguments (and the receiver when `has_receiver`),
    /// invoke the artifact registered at `index`, push the result
    CallIndirect {
        /// Artifact registry index
        index: DelegateIndex,
        /// Argument count to pop
        argc: u8,
        /// Whether a receiver is popped below the arguments
        has_receiver: bool,
    },
    /// Pop the result and finish
    Ret,
}

/// Builder validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmitError {
    /// A label was jumped to but never marked
    #[error("Label {0} was never marked")]
    UnmarkedLabel(u32),

    /// The body is empty
    #[error("Thunk body is empty")]
    EmptyBody,

    /// The body does not end with Ret
    #[error("Thunk body does not end with Ret")]
    MissingReturn,

    /// An op would pop from an empty operand stack
    #[error("Operand stack underflow at op {0}")]
    StackUnderflow(usize),

    /// A CallMember slot has no member table entry
    #[error("Member slot {0} out of range")]
    BadMemberSlot(u16),

    /// A local slot was never declared
    #[error("Local slot {0} out of range")]
    BadLocalSlot(u8),
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles and validates an op sequence into a `Thunk`.
pub struct ThunkBuilder {
    ops: Vec<Op>,
    label_positions: Vec<Option<u32>>,
    pending_jumps: Vec<(usize, u32)>,
    members: Vec<MemberDesc>,
    locals: u8,
}

impl ThunkBuilder {
    /// Start an empty thunk
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            label_positions: Vec::new(),
            pending_jumps: Vec::new(),
            members: Vec::new(),
            locals: 0,
        }
    }

    /// Declare a local variable, returning its slot
    pub fn declare_local(&mut self) -> u8 {
        let slot = self.locals;
        self.locals += 1;
        slot
    }

    /// Append a non-branching op
    pub fn emit(&mut self, op: Op) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Define a label for a future jump target
    pub fn define_label(&mut self) -> Label {
        let id = self.label_positions.len() as u32;
        self.label_positions.push(None);
        Label { id }
    }

    /// Mark a label at the current position
    pub fn mark_label(&mut self, label: Label) {
        self.label_positions[label.id as usize] = Some(self.ops.len() as u32);
    }

    /// Emit an unconditional jump to `label`
    pub fn emit_jump(&mut self, label: Label) {
        self.pending_jumps.push((self.ops.len(), label.id));
        self.ops.push(Op::Jump(u32::MAX));
    }

    /// Emit a branch taken when the popped value is null
    pub fn emit_jump_if_null(&mut self, label: Label) {
        self.pending_jumps.push((self.ops.len(), label.id));
        self.ops.push(Op::JumpIfNull(u32::MAX));
    }

    /// Emit a branch taken when the popped bool is true
    pub fn emit_jump_if_true(&mut self, label: Label) {
        self.pending_jumps.push((self.ops.len(), label.id));
        self.ops.push(Op::JumpIfTrue(u32::MAX));
    }

    /// Add a member to the thunk's member table, returning its slot
    pub fn add_member(&mut self, member: MemberDesc) -> u16 {
        let slot = self.members.len() as u16;
        self.members.push(member);
        slot
    }

    /// Patch jumps, validate, and produce the immutable thunk.
    pub fn build(mut self) -> Result<Thunk, EmitError> {
        if self.ops.is_empty() {
            return Err(EmitError::EmptyBody);
        }

        for (op_index, label_id) in &self.pending_jumps {
            let target = self.label_positions[*label_id as usize]
                .ok_or(EmitError::UnmarkedLabel(*label_id))?;
            match &mut self.ops[*op_index] {
                Op::Jump(t) | Op::JumpIfNull(t) | Op::JumpIfTrue(t) => *t = target,
                _ => unreachable!("pending jump records only point at jump ops"),
            }
        }

        if !matches!(self.ops.last(), Some(Op::Ret)) {
            return Err(EmitError::MissingReturn);
        }

        // Straight-line depth simulation: branches are treated as
        // fallthrough, which is conservative for the bodies this
        // builder produces (forward jumps between depth-balanced
        // sections).
        let mut depth: usize = 0;
        let mut max_depth: usize = 0;
        for (at, op) in self.ops.iter().enumerate() {
            let (pops, pushes) = match op {
                Op::LoadLocal(slot) => {
                    if *slot >= self.locals {
                        return Err(EmitError::BadLocalSlot(*slot));
                    }
                    (0, 1)
                }
                Op::StoreLocal(slot) => {
                    if *slot >= self.locals {
                        return Err(EmitError::BadLocalSlot(*slot));
                    }
                    (1, 0)
                }
                Op::LoadArg(_) | Op::LoadSelf | Op::PushI32(_) => (0, 1),
                Op::Jump(_) => (0, 0),
                Op::JumpIfNull(_) | Op::JumpIfTrue(_) => (1, 0),
                Op::Box | Op::BoxCast(_) | Op::Unbox(_) | Op::CastRef(_) => (1, 1),
                Op::CallMember { slot, argc } => {
                    let member = self
                        .members
                        .get(*slot as usize)
                        .ok_or(EmitError::BadMemberSlot(*slot))?;
                    let receiver = usize::from(!member.is_static);
                    (*argc as usize + receiver, 1)
                }
                Op::CallIndirect {
                    argc, has_receiver, ..
                } => (*argc as usize + usize::from(*has_receiver), 1),
                Op::Ret => (1, 0),
            };
            if depth < pops {
                return Err(EmitError::StackUnderflow(at));
            }
            depth = depth - pops + pushes;
            max_depth = max_depth.max(depth);
        }

        Ok(Thunk {
            ops: self.ops.into_boxed_slice(),
            members: self.members.into_boxed_slice(),
            max_stack: max_depth,
            locals: self.locals,
        })
    }
}

impl Default for ThunkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Thunk + evaluator
// ============================================================================

/// An immutable, executable op sequence with its member table.
pub struct Thunk {
    ops: Box<[Op]>,
    members: Box<[MemberDesc]>,
    max_stack: usize,
    locals: u8,
}

impl Thunk {
    /// Number of ops in the body
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when the body is empty (never produced by the builder)
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Execute against a receiver and argument slots.
    pub fn eval(
        &self,
        receiver: Option<&Value>,
        args: &[Value],
        types: &TypeRegistry,
    ) -> Result<Value, RuntimeError> {
        let mut stack: Vec<Value> = Vec::with_capacity(self.max_stack);
        let mut locals: Vec<Value> = vec![Value::Null; self.locals as usize];
        let mut pc: usize = 0;

        while pc < self.ops.len() {
            match &self.ops[pc] {
                Op::LoadLocal(slot) => {
                    stack.push(locals[*slot as usize].clone());
                }
                Op::StoreLocal(slot) => {
                    let value = stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                    locals[*slot as usize] = value;
                }
                Op::LoadArg(n) => {
                    let value = args
                        .get(*n as usize)
                        .ok_or(RuntimeError::ArgOutOfRange(*n))?;
                    stack.push(value.clone());
                }
                Op::LoadSelf => {
                    let value = receiver.ok_or(RuntimeError::NullReceiver)?;
                    stack.push(value.clone());
                }
                Op::PushI32(v) => stack.push(Value::I32(*v)),
                Op::Jump(target) => {
                    pc = *target as usize;
                    continue;
                }
                Op::JumpIfNull(target) => {
                    let value = stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                    if value.is_null() {
                        pc = *target as usize;
                        continue;
                    }
                }
                Op::JumpIfTrue(target) => {
                    let value = stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                    let flag = value.as_bool().ok_or_else(|| {
                        RuntimeError::TypeError(format!(
                            "JumpIfTrue on {}",
                            value.kind_name()
                        ))
                    })?;
                    if flag {
                        pc = *target as usize;
                        continue;
                    }
                }
                Op::Box => {
                    let value = stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                    stack.push(convert::box_value(&value, types)?);
                }
                Op::BoxCast(class) => {
                    let value = stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                    let boxed = convert::box_value(&value, types)?;
                    stack.push(convert::cast_ref(&boxed, *class, types)?);
                }
                Op::Unbox(kind) => {
                    let value = stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                    stack.push(convert::unbox_value(&value, *kind, types)?);
                }
                Op::CastRef(class) => {
                    let value = stack.pop().ok_or(RuntimeError::StackUnderflow)?;
                    stack.push(convert::cast_ref(&value, *class, types)?);
                }
                Op::CallMember { slot, argc } => {
                    let member = self
                        .members
                        .get(*slot as usize)
                        .ok_or(RuntimeError::UnknownMember(format!("slot {slot}")))?;
                    let result = Self::call(member, &mut stack, *argc, !member.is_static)?;
                    stack.push(result);
                }
                Op::CallIndirect {
                    index,
                    argc,
                    has_receiver,
                } => {
                    let delegate = registry::global()
                        .lookup(*index)
                        .ok_or(RuntimeError::MissingDelegate(index.0))?;
                    let call_args = Self::split_args(&mut stack, *argc)?;
                    let recv = if *has_receiver {
                        Some(stack.pop().ok_or(RuntimeError::StackUnderflow)?)
                    } else {
                        None
                    };
                    stack.push(delegate(recv.as_ref(), &call_args)?);
                }
                Op::Ret => {
                    return stack.pop().ok_or(RuntimeError::StackUnderflow);
                }
            }
            pc += 1;
        }

        // Validated bodies always end with Ret
        Err(RuntimeError::TypeError("thunk body fell off the end".into()))
    }

    fn split_args(stack: &mut Vec<Value>, argc: u8) -> Result<Vec<Value>, RuntimeError> {
        let argc = argc as usize;
        if stack.len() < argc {
            return Err(RuntimeError::StackUnderflow);
        }
        Ok(stack.split_off(stack.len() - argc))
    }

    fn call(
        member: &MemberDesc,
        stack: &mut Vec<Value>,
        argc: u8,
        has_receiver: bool,
    ) -> Result<Value, RuntimeError> {
        let call_args = Self::split_args(stack, argc)?;
        let recv = if has_receiver {
            Some(stack.pop().ok_or(RuntimeError::StackUnderflow)?)
        } else {
            None
        };
        match &member.kind {
            MemberKind::Direct(body) => body(recv.as_ref(), &call_args),
            MemberKind::Delegate(index) => {
                let delegate = registry::global()
                    .lookup(*index)
                    .ok_or(RuntimeError::MissingDelegate(index.0))?;
                delegate(recv.as_ref(), &call_args)
            }
        }
    }
}

impl std::fmt::Debug for Thunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thunk")
            .field("ops", &self.ops.len())
            .field("members", &self.members.len())
            .field("max_stack", &self.max_stack)
            .finish()
    }
}
