//! LLVM backend for the register file.
//!
//! [`LlvmBuilder`] implements [`IrBuilder`] on top of an inkwell
//! [`Builder`], so a lifter emitting LLVM IR can keep one
//! [`RegisterFile`](crate::core::RegisterFile) per LLVM basic block.
//!
//! # Example
//! ```ignore
//! use inkwell::context::Context;
//! use lifter::core::{ArchConfig, Facet, Reg, RegisterFile};
//! use lifter::llvm::LlvmBuilder;
//!
//! let context = Context::create();
//! let mut builder = LlvmBuilder::new(&context);
//! let mut regs = RegisterFile::new(entry, ArchConfig::x86_64());
//! regs.set_reg(&mut builder, Reg::gp(0), Facet::I64, arg, true)?;
//! let al = regs.get_reg(&mut builder, Reg::gp(0), Facet::I8)?;
//! ```

use inkwell::basic_block::BasicBlock;
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::types::{BasicTypeEnum, IntType};
use inkwell::values::{BasicValue, BasicValueEnum, IntValue};
use inkwell::AddressSpace;

use crate::core::{BuildError, BuildResult, IrBuilder, TypeContext};

/// Register-file conversions emitted through inkwell.
pub struct LlvmBuilder<'ctx> {
    context: &'ctx Context,
    builder: Builder<'ctx>,
}

fn backend(err: BuilderError) -> BuildError {
    BuildError::Backend(err.to_string())
}

fn int_value<'ctx>(op: &'static str, value: BasicValueEnum<'ctx>) -> BuildResult<IntValue<'ctx>> {
    match value {
        BasicValueEnum::IntValue(value) => Ok(value),
        other => Err(BuildError::TypeMismatch {
            op,
            reason: format!("{:?} is not an integer", other.get_type()),
        }),
    }
}

fn int_type<'ctx>(op: &'static str, ty: BasicTypeEnum<'ctx>) -> BuildResult<IntType<'ctx>> {
    match ty {
        BasicTypeEnum::IntType(ty) => Ok(ty),
        other => Err(BuildError::TypeMismatch {
            op,
            reason: format!("{other:?} is not an integer type"),
        }),
    }
}

impl<'ctx> LlvmBuilder<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            builder: context.create_builder(),
        }
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    /// The underlying builder, for the instructions handlers emit themselves.
    pub fn builder(&self) -> &Builder<'ctx> {
        &self.builder
    }
}

impl<'ctx> TypeContext for LlvmBuilder<'ctx> {
    type Type = BasicTypeEnum<'ctx>;

    fn int_type(&self, bits: u32) -> Self::Type {
        self.context.custom_width_int_type(bits).into()
    }

    fn float_type(&self, bits: u32) -> Self::Type {
        match bits {
            32 => self.context.f32_type().into(),
            _ => self.context.f64_type().into(),
        }
    }

    fn vector_type(&self, lane: Self::Type, lanes: u32) -> Self::Type {
        match lane {
            BasicTypeEnum::IntType(ty) => ty.vec_type(lanes).into(),
            BasicTypeEnum::FloatType(ty) => ty.vec_type(lanes).into(),
            BasicTypeEnum::PointerType(ty) => ty.vec_type(lanes).into(),
            other => other,
        }
    }

    fn ptr_type(&self) -> Self::Type {
        self.context.ptr_type(AddressSpace::default()).into()
    }
}

impl<'ctx> IrBuilder for LlvmBuilder<'ctx> {
    type Value = BasicValueEnum<'ctx>;
    type Block = BasicBlock<'ctx>;

    fn position_at_end(&mut self, block: Self::Block) {
        self.builder.position_at_end(block);
    }

    fn value_type(&self, value: Self::Value) -> Self::Type {
        value.get_type()
    }

    fn build_trunc(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value> {
        let value = int_value("trunc", value)?;
        let ty = int_type("trunc", ty)?;
        let result = self.builder.build_int_truncate(value, ty, "").map_err(backend)?;
        Ok(result.as_basic_value_enum())
    }

    fn build_zext(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value> {
        let value = int_value("zext", value)?;
        let ty = int_type("zext", ty)?;
        let result = self.builder.build_int_z_extend(value, ty, "").map_err(backend)?;
        Ok(result.as_basic_value_enum())
    }

    fn build_sext(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value> {
        let value = int_value("sext", value)?;
        let ty = int_type("sext", ty)?;
        let result = self.builder.build_int_s_extend(value, ty, "").map_err(backend)?;
        Ok(result.as_basic_value_enum())
    }

    fn build_bitcast(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value> {
        if value.get_type() == ty {
            return Ok(value);
        }
        self.builder.build_bit_cast(value, ty, "").map_err(backend)
    }

    fn build_lshr(&mut self, value: Self::Value, amount: u32) -> BuildResult<Self::Value> {
        let value = int_value("lshr", value)?;
        let amount = value.get_type().const_int(u64::from(amount), false);
        let result = self
            .builder
            .build_right_shift(value, amount, false, "")
            .map_err(backend)?;
        Ok(result.as_basic_value_enum())
    }

    fn build_int_to_ptr(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value> {
        let value = int_value("inttoptr", value)?;
        let BasicTypeEnum::PointerType(ty) = ty else {
            return Err(BuildError::TypeMismatch {
                op: "inttoptr",
                reason: format!("{ty:?} is not a pointer type"),
            });
        };
        let result = self.builder.build_int_to_ptr(value, ty, "").map_err(backend)?;
        Ok(result.as_basic_value_enum())
    }

    fn build_ptr_to_int(&mut self, value: Self::Value, ty: Self::Type) -> BuildResult<Self::Value> {
        let BasicValueEnum::PointerValue(value) = value else {
            return Err(BuildError::TypeMismatch {
                op: "ptrtoint",
                reason: format!("{:?} is not a pointer", value.get_type()),
            });
        };
        let ty = int_type("ptrtoint", ty)?;
        let result = self.builder.build_ptr_to_int(value, ty, "").map_err(backend)?;
        Ok(result.as_basic_value_enum())
    }
}
