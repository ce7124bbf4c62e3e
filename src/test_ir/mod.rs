//! Test IR (TIR) for exercising the register file without LLVM.
//!
//! This module provides a small arena-allocated SSA IR with exactly the
//! instructions the register file emits, plus opaque calls for everything an
//! instruction handler would build. Values are compared by identity, so a
//! test can assert that a read returned *the same* value that was written.
//!
//! The [`parser`] and [`runner`] turn lift scripts into register-file calls:
//!
//! ```text
//! ; Comments start with semicolon
//! arch x86_64
//! arg %a : i64
//! block entry
//!     set rax = %a
//!     get %low = r0:i8
//!     set al = 7
//!     get %full = rax
//! ```
//!
//! [`check`] validates runner output against FileCheck-style directives.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr;

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;

use crate::core::TypeContext;

pub mod builder;
pub mod check;
pub mod parser;
pub mod runner;

pub use builder::TirBuilder;
pub use check::{CheckDirective, CheckError, TestRunner, TestSpec};
pub use parser::{parse_script, Script, ScriptError, Stmt};
pub use runner::{run_script, run_source, RunOptions};

/// Scalar lane type of a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    Int(u32),
    Float(u32),
    Ptr,
}

impl Scalar {
    pub const fn bits(self) -> u32 {
        match self {
            Scalar::Int(bits) | Scalar::Float(bits) => bits,
            Scalar::Ptr => 64,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(bits) => write!(f, "i{bits}"),
            Scalar::Float(32) => f.write_str("float"),
            Scalar::Float(64) => f.write_str("double"),
            Scalar::Float(bits) => write!(f, "f{bits}"),
            Scalar::Ptr => f.write_str("ptr"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int(u32),
    Float(u32),
    Ptr,
    Vector(Scalar, u32),
}

impl Type {
    pub const fn bits(self) -> u32 {
        match self {
            Type::Int(bits) | Type::Float(bits) => bits,
            Type::Ptr => 64,
            Type::Vector(lane, lanes) => lane.bits() * lanes,
        }
    }

    pub const fn is_int(self) -> bool {
        matches!(self, Type::Int(_))
    }

    const fn as_scalar(self) -> Option<Scalar> {
        match self {
            Type::Int(bits) => Some(Scalar::Int(bits)),
            Type::Float(bits) => Some(Scalar::Float(bits)),
            Type::Ptr => Some(Scalar::Ptr),
            Type::Vector(..) => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Float(bits) => Scalar::Float(*bits).fmt(f),
            Type::Ptr => f.write_str("ptr"),
            Type::Vector(lane, lanes) => write!(f, "<{lanes} x {lane}>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode<'a> {
    Trunc,
    ZExt,
    SExt,
    BitCast,
    LShr,
    IntToPtr,
    PtrToInt,
    /// Opaque operation built by an instruction handler.
    Custom(&'a str),
}

impl Opcode<'_> {
    pub fn name(&self) -> &str {
        match self {
            Opcode::Trunc => "trunc",
            Opcode::ZExt => "zext",
            Opcode::SExt => "sext",
            Opcode::BitCast => "bitcast",
            Opcode::LShr => "lshr",
            Opcode::IntToPtr => "inttoptr",
            Opcode::PtrToInt => "ptrtoint",
            Opcode::Custom(name) => name,
        }
    }

    const fn is_cast(&self) -> bool {
        !matches!(self, Opcode::LShr | Opcode::Custom(_))
    }
}

#[derive(Debug)]
enum ValueKind<'a> {
    Arg(&'a str),
    Const(u128),
    Undef,
    Inst {
        opcode: Opcode<'a>,
        operands: &'a [ValueRef<'a>],
    },
}

#[derive(Debug)]
pub struct ValueData<'a> {
    id: u32,
    ty: Type,
    kind: ValueKind<'a>,
}

/// Handle to an arena-allocated value. Equality is identity.
#[derive(Clone, Copy)]
pub struct ValueRef<'a>(&'a ValueData<'a>);

impl<'a> ValueRef<'a> {
    pub fn id(self) -> u32 {
        self.0.id
    }

    pub fn ty(self) -> Type {
        self.0.ty
    }

    pub fn opcode(self) -> Option<Opcode<'a>> {
        match self.0.kind {
            ValueKind::Inst { opcode, .. } => Some(opcode),
            _ => None,
        }
    }

    pub fn operands(self) -> &'a [ValueRef<'a>] {
        match self.0.kind {
            ValueKind::Inst { operands, .. } => operands,
            _ => &[],
        }
    }

    pub fn as_const(self) -> Option<u128> {
        match self.0.kind {
            ValueKind::Const(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_undef(self) -> bool {
        matches!(self.0.kind, ValueKind::Undef)
    }

    pub fn is_arg(self) -> bool {
        matches!(self.0.kind, ValueKind::Arg(_))
    }

    /// The instruction defining this value, as printed in a block listing.
    pub fn display_inst(self) -> String {
        let ValueKind::Inst { opcode, operands } = self.0.kind else {
            return format!("{} {}", self.ty(), self);
        };
        let typed = |value: &ValueRef<'a>| format!("{} {}", value.ty(), value);
        match opcode {
            op if op.is_cast() => {
                format!("{self} = {} {} to {}", op.name(), typed(&operands[0]), self.ty())
            }
            Opcode::LShr => {
                format!("{self} = lshr {}, {}", typed(&operands[0]), operands[1])
            }
            op => {
                let args: Vec<_> = operands.iter().map(typed).collect();
                format!("{self} = call {} @{}({})", self.ty(), op.name(), args.join(", "))
            }
        }
    }
}

impl PartialEq for ValueRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.0, other.0)
    }
}

impl Eq for ValueRef<'_> {}

impl std::hash::Hash for ValueRef<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        ptr::hash(self.0, state)
    }
}

impl fmt::Display for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.kind {
            ValueKind::Arg(name) => write!(f, "%{name}"),
            ValueKind::Const(value) => write!(f, "{value}"),
            ValueKind::Undef => f.write_str("undef"),
            ValueKind::Inst { .. } => write!(f, "%{}", self.0.id),
        }
    }
}

impl fmt::Debug for ValueRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty(), self)
    }
}

#[derive(Debug)]
pub struct BlockData<'a> {
    name: &'a str,
    insts: RefCell<BumpVec<'a, ValueRef<'a>>>,
}

/// Handle to an arena-allocated basic block. Equality is identity.
#[derive(Clone, Copy)]
pub struct BlockRef<'a>(&'a BlockData<'a>);

impl<'a> BlockRef<'a> {
    pub fn name(self) -> &'a str {
        self.0.name
    }

    pub fn len(self) -> usize {
        self.0.insts.borrow().len()
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn insts(self) -> Vec<ValueRef<'a>> {
        self.0.insts.borrow().iter().copied().collect()
    }

    fn push(self, inst: ValueRef<'a>) {
        self.0.insts.borrow_mut().push(inst);
    }
}

impl PartialEq for BlockRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.0, other.0)
    }
}

impl Eq for BlockRef<'_> {}

impl fmt::Debug for BlockRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{}", self.0.name)
    }
}

impl fmt::Display for BlockRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.0.name)?;
        for inst in self.0.insts.borrow().iter() {
            write!(f, "\n  {}", inst.display_inst())?;
        }
        Ok(())
    }
}

/// Allocation context for TIR values and blocks.
#[derive(Clone, Copy)]
pub struct IrContext<'a> {
    arena: &'a Bump,
    next_id: &'a Cell<u32>,
}

impl<'a> IrContext<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            arena,
            next_id: arena.alloc(Cell::new(0)),
        }
    }

    pub fn arena(self) -> &'a Bump {
        self.arena
    }

    /// A builder for this context with no insertion block.
    pub fn builder(self) -> TirBuilder<'a> {
        TirBuilder::new(self)
    }

    pub fn block(self, name: &str) -> BlockRef<'a> {
        let data = self.arena.alloc(BlockData {
            name: self.arena.alloc_str(name),
            insts: RefCell::new(BumpVec::new_in(self.arena)),
        });
        BlockRef(data)
    }

    fn value(self, ty: Type, kind: ValueKind<'a>) -> ValueRef<'a> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        ValueRef(self.arena.alloc(ValueData { id, ty, kind }))
    }

    pub fn arg(self, name: &str, ty: Type) -> ValueRef<'a> {
        self.value(ty, ValueKind::Arg(self.arena.alloc_str(name)))
    }

    /// An integer constant. Bits above the type width are dropped.
    pub fn const_int(self, ty: Type, value: u128) -> ValueRef<'a> {
        self.value(ty, ValueKind::Const(mask(value, ty.bits())))
    }

    pub fn undef(self, ty: Type) -> ValueRef<'a> {
        self.value(ty, ValueKind::Undef)
    }

    fn inst(self, block: BlockRef<'a>, opcode: Opcode<'a>, ty: Type, operands: &[ValueRef<'a>]) -> ValueRef<'a> {
        let operands = self.arena.alloc_slice_copy(operands);
        let inst = self.value(ty, ValueKind::Inst { opcode, operands });
        block.push(inst);
        inst
    }
}

fn mask(value: u128, bits: u32) -> u128 {
    if bits >= 128 {
        value
    } else {
        value & ((1u128 << bits) - 1)
    }
}

impl TypeContext for IrContext<'_> {
    type Type = Type;

    fn int_type(&self, bits: u32) -> Type {
        Type::Int(bits)
    }

    fn float_type(&self, bits: u32) -> Type {
        Type::Float(bits)
    }

    fn vector_type(&self, lane: Type, lanes: u32) -> Type {
        match lane.as_scalar() {
            Some(scalar) => Type::Vector(scalar, lanes),
            None => lane,
        }
    }

    fn ptr_type(&self) -> Type {
        Type::Ptr
    }
}

/// Parse a TIR type name (`i32`, `float`, `ptr`, `<4 x float>`).
pub fn parse_type(text: &str) -> Option<Type> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
        let (lanes, lane) = inner.split_once(" x ")?;
        let lanes: u32 = lanes.trim().parse().ok()?;
        let lane = parse_type(lane)?.as_scalar()?;
        return (lanes > 0).then_some(Type::Vector(lane, lanes));
    }
    match text {
        "float" => Some(Type::Float(32)),
        "double" => Some(Type::Float(64)),
        "ptr" => Some(Type::Ptr),
        _ => {
            let bits: u32 = text.strip_prefix('i')?.parse().ok()?;
            (bits > 0).then_some(Type::Int(bits))
        }
    }
}
