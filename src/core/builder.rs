// This module defines the boundary between the register file and the IR backend. The
// register file never owns IR: it holds Copy handles to values that live in the surrounding
// IR context, asks the backend for the type of a facet, and asks it to insert the handful
// of width conversions needed to derive one facet from another (truncate, zero/sign extend,
// bitcast, the pointer casts, and a logical shift for the legacy high-byte view). Arithmetic,
// logic, control flow and phi construction stay with the instruction handlers and the
// block-merge layer. Implementations exist for the arena-backed test IR and, behind the
// `llvm` feature, for inkwell.

//! IR backend traits consumed by the register file.

use std::fmt::Debug;

use super::error::BuildResult;

/// Type system keyed by facet layouts.
pub trait TypeContext {
    type Type: Copy + Eq + Debug;

    fn int_type(&self, bits: u32) -> Self::Type;

    /// `bits` is 32 or 64.
    fn float_type(&self, bits: u32) -> Self::Type;

    fn vector_type(&self, lane: Self::Type, lanes: u32) -> Self::Type;

    fn ptr_type(&self) -> Self::Type;
}

/// Instruction builder inserting into one basic block at a time.
///
/// All conversions are appended at the end of the block selected with
/// [`IrBuilder::position_at_end`]. Operand types are those produced by
/// [`Facet::ir_type`](super::Facet::ir_type) for the same context.
pub trait IrBuilder: TypeContext {
    type Value: Copy + Eq + Debug;
    type Block: Copy + Eq + Debug;

    fn position_at_end(&mut self, block: Self::Block);

    /// Type of an existing value.
    fn value_type(&self, value: Self::Value) -> Self::Type;

    fn build_trunc(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value>;

    fn build_zext(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value>;

    fn build_sext(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value>;

    /// Reinterpret between equally sized non-pointer types.
    fn build_bitcast(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value>;

    /// Logical right shift of a scalar integer by a constant.
    fn build_lshr(&mut self, value: Self::Value, amount: u32) -> BuildResult<Self::Value>;

    fn build_int_to_ptr(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value>;

    fn build_ptr_to_int(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value>;
}
