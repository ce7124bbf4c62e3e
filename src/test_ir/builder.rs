//! [`IrBuilder`] implementation for TIR.
//!
//! Operand types are checked the way an LLVM verifier would, so a wrong
//! conversion sequence fails the test that produced it instead of printing
//! plausible IR. Integer conversions of constants are folded.

use log::trace;

use super::{mask, BlockRef, IrContext, Opcode, Type, ValueRef};
use crate::core::{BuildError, BuildResult, IrBuilder, TypeContext};

/// Builder appending TIR instructions to one block at a time.
pub struct TirBuilder<'a> {
    ctx: IrContext<'a>,
    insert: Option<BlockRef<'a>>,
}

fn mismatch(op: &'static str, reason: String) -> BuildError {
    BuildError::TypeMismatch { op, reason }
}

fn sign_extend(value: u128, from: u32, to: u32) -> u128 {
    if from == 0 || from >= 128 {
        return mask(value, to);
    }
    let shift = 128 - from;
    mask((((value << shift) as i128) >> shift) as u128, to)
}

impl<'a> TirBuilder<'a> {
    pub fn new(ctx: IrContext<'a>) -> Self {
        Self { ctx, insert: None }
    }

    pub fn context(&self) -> IrContext<'a> {
        self.ctx
    }

    fn emit(&mut self, op: Opcode<'a>, ty: Type, operands: &[ValueRef<'a>]) -> BuildResult<ValueRef<'a>> {
        let block = self.insert.ok_or(BuildError::NoInsertPoint)?;
        let inst = self.ctx.inst(block, op, ty, operands);
        trace!("{}: {}", block.name(), inst.display_inst());
        Ok(inst)
    }

    /// Build an opaque call producing a value of type `ty`.
    pub fn build_custom(&mut self, name: &str, ty: Type, operands: &[ValueRef<'a>]) -> BuildResult<ValueRef<'a>> {
        let name = self.ctx.arena().alloc_str(name);
        self.emit(Opcode::Custom(name), ty, operands)
    }

    fn int_conversion(
        &mut self,
        op: Opcode<'a>,
        value: ValueRef<'a>,
        ty: Type,
    ) -> BuildResult<ValueRef<'a>> {
        let name = match op {
            Opcode::Trunc => "trunc",
            Opcode::ZExt => "zext",
            _ => "sext",
        };
        let (Type::Int(from), Type::Int(to)) = (value.ty(), ty) else {
            return Err(mismatch(name, format!("{} to {ty} is not an integer conversion", value.ty())));
        };
        let valid = match op {
            Opcode::Trunc => to < from,
            _ => to > from,
        };
        if !valid {
            return Err(mismatch(name, format!("cannot {name} i{from} to i{to}")));
        }
        if let (Some(constant), true) = (value.as_const(), to <= 128) {
            let folded = match op {
                Opcode::SExt => sign_extend(constant, from, to),
                _ => mask(constant, to),
            };
            return Ok(self.ctx.const_int(ty, folded));
        }
        self.emit(op, ty, &[value])
    }
}

impl<'a> TypeContext for TirBuilder<'a> {
    type Type = Type;

    fn int_type(&self, bits: u32) -> Type {
        self.ctx.int_type(bits)
    }

    fn float_type(&self, bits: u32) -> Type {
        self.ctx.float_type(bits)
    }

    fn vector_type(&self, lane: Type, lanes: u32) -> Type {
        self.ctx.vector_type(lane, lanes)
    }

    fn ptr_type(&self) -> Type {
        self.ctx.ptr_type()
    }
}

impl<'a> IrBuilder for TirBuilder<'a> {
    type Value = ValueRef<'a>;
    type Block = BlockRef<'a>;

    fn position_at_end(&mut self, block: BlockRef<'a>) {
        self.insert = Some(block);
    }

    fn value_type(&self, value: ValueRef<'a>) -> Type {
        value.ty()
    }

    fn build_trunc(&mut self, value: ValueRef<'a>, ty: Type) -> BuildResult<ValueRef<'a>> {
        self.int_conversion(Opcode::Trunc, value, ty)
    }

    fn build_zext(&mut self, value: ValueRef<'a>, ty: Type) -> BuildResult<ValueRef<'a>> {
        self.int_conversion(Opcode::ZExt, value, ty)
    }

    fn build_sext(&mut self, value: ValueRef<'a>, ty: Type) -> BuildResult<ValueRef<'a>> {
        self.int_conversion(Opcode::SExt, value, ty)
    }

    fn build_bitcast(&mut self, value: ValueRef<'a>, ty: Type) -> BuildResult<ValueRef<'a>> {
        let from = value.ty();
        if from == Type::Ptr || ty == Type::Ptr {
            return Err(mismatch("bitcast", format!("{from} to {ty} involves a pointer")));
        }
        if from.bits() != ty.bits() {
            return Err(mismatch("bitcast", format!("{from} and {ty} differ in size")));
        }
        if from == ty {
            return Ok(value);
        }
        self.emit(Opcode::BitCast, ty, &[value])
    }

    fn build_lshr(&mut self, value: ValueRef<'a>, amount: u32) -> BuildResult<ValueRef<'a>> {
        let ty = value.ty();
        let Type::Int(bits) = ty else {
            return Err(mismatch("lshr", format!("{ty} is not an integer")));
        };
        if amount >= bits {
            return Err(mismatch("lshr", format!("shift by {amount} exceeds {ty}")));
        }
        if let (Some(constant), true) = (value.as_const(), bits <= 128) {
            return Ok(self.ctx.const_int(ty, constant >> amount));
        }
        let amount = self.ctx.const_int(ty, u128::from(amount));
        self.emit(Opcode::LShr, ty, &[value, amount])
    }

    fn build_int_to_ptr(&mut self, value: ValueRef<'a>, ty: Type) -> BuildResult<ValueRef<'a>> {
        if !value.ty().is_int() || ty != Type::Ptr {
            return Err(mismatch("inttoptr", format!("{} to {ty}", value.ty())));
        }
        self.emit(Opcode::IntToPtr, ty, &[value])
    }

    fn build_ptr_to_int(&mut self, value: ValueRef<'a>, ty: Type) -> BuildResult<ValueRef<'a>> {
        if value.ty() != Type::Ptr || !ty.is_int() {
            return Err(mismatch("ptrtoint", format!("{} to {ty}", value.ty())));
        }
        self.emit(Opcode::PtrToInt, ty, &[value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_ir::Scalar;
    use bumpalo::Bump;

    #[test]
    fn test_requires_insert_point() {
        let arena = Bump::new();
        let ctx = IrContext::new(&arena);
        let mut b = ctx.builder();
        let a = ctx.arg("a", Type::Int(64));
        assert_eq!(b.build_trunc(a, Type::Int(8)), Err(BuildError::NoInsertPoint));
    }

    #[test]
    fn test_conversions_are_type_checked() {
        let arena = Bump::new();
        let ctx = IrContext::new(&arena);
        let mut b = ctx.builder();
        b.position_at_end(ctx.block("entry"));

        let a = ctx.arg("a", Type::Int(32));
        let f = ctx.arg("f", Type::Float(32));
        assert!(b.build_trunc(a, Type::Int(64)).is_err());
        assert!(b.build_zext(a, Type::Int(16)).is_err());
        assert!(b.build_zext(f, Type::Int(64)).is_err());
        assert!(b.build_bitcast(a, Type::Float(64)).is_err());
        assert!(b.build_bitcast(a, Type::Ptr).is_err());
        assert!(b.build_lshr(a, 32).is_err());
        assert!(b.build_int_to_ptr(f, Type::Ptr).is_err());
        assert!(b.build_ptr_to_int(a, Type::Int(64)).is_err());
        assert_eq!(b.build_bitcast(f, Type::Float(32)), Ok(f));
    }

    #[test]
    fn test_printed_instructions() {
        let arena = Bump::new();
        let ctx = IrContext::new(&arena);
        let block = ctx.block("entry");
        let mut b = ctx.builder();
        b.position_at_end(block);

        let a = ctx.arg("a", Type::Int(64));
        let v = ctx.arg("v", Type::Vector(Scalar::Float(32), 4));
        let t = b.build_trunc(a, Type::Int(32)).unwrap();
        let s = b.build_lshr(a, 8).unwrap();
        let c = b.build_bitcast(v, Type::Int(128)).unwrap();
        let m = b.build_custom("insert.i8", Type::Int(64), &[a, t]).unwrap();

        assert_eq!(t.display_inst(), format!("{t} = trunc i64 %a to i32"));
        assert_eq!(s.display_inst(), format!("{s} = lshr i64 %a, 8"));
        assert_eq!(c.display_inst(), format!("{c} = bitcast <4 x float> %v to i128"));
        assert_eq!(m.display_inst(), format!("{m} = call i64 @insert.i8(i64 %a, i32 {t})"));
        assert_eq!(block.insts(), vec![t, s, c, m]);
    }

    #[test]
    fn test_constant_folding() {
        let arena = Bump::new();
        let ctx = IrContext::new(&arena);
        let block = ctx.block("entry");
        let mut b = ctx.builder();
        b.position_at_end(block);

        let one = ctx.const_int(Type::Int(32), 1);
        let wide = b.build_zext(one, Type::Int(64)).unwrap();
        assert_eq!((wide.ty(), wide.as_const()), (Type::Int(64), Some(1)));

        let minus = ctx.const_int(Type::Int(8), 0xff);
        let sext = b.build_sext(minus, Type::Int(32)).unwrap();
        assert_eq!(sext.as_const(), Some(0xffff_ffff));

        let word = ctx.const_int(Type::Int(64), 0x1234);
        let high = b.build_lshr(word, 8).unwrap();
        let byte = b.build_trunc(high, Type::Int(8)).unwrap();
        assert_eq!(byte.as_const(), Some(0x12));
        assert!(block.is_empty());
    }
}
