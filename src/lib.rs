//! Lifter - per-block architectural register state for SSA lifting.
//!
//! A machine-code lifter translates one guest basic block at a time into SSA
//! IR. Guest registers are read and written through many views (`al`, `ah`,
//! `eax`, `rax`, `xmm0` as four floats, ...). This crate keeps one
//! [`RegisterFile`] per block that caches every view it has produced, derives
//! narrower views from wider ones with the cheapest conversion, and tells the
//! caller when a read needs a merge of partial writes instead of guessing.
//!
//! # Primary Usage
//!
//! ```ignore
//! use lifter::core::{ArchConfig, Facet, Reg, RegisterFile};
//! use lifter::test_ir::IrContext;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let ctx = IrContext::new(&arena);
//! let entry = ctx.block("entry");
//! let mut builder = ctx.builder();
//!
//! let mut regs = RegisterFile::new(entry, ArchConfig::x86_64());
//! regs.set_reg(&mut builder, Reg::gp(0), Facet::I64, rax, true)?;
//! let al = regs.get_reg(&mut builder, Reg::gp(0), Facet::I8)?;
//! let live_out = regs.seal();
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Facets, write policies, the register file and live-out snapshots
//! - [`x64`] - Mapping of x86-64 operands onto registers and facets
//! - [`test_ir`] - Arena IR, lift-script interpreter and CHECK-style validation
//! - `llvm` - inkwell-backed builder (feature `llvm`)

pub mod core;
pub mod test_ir;
pub mod x64;

#[cfg(feature = "llvm")]
pub mod llvm;

// Re-export common types from organized modules
pub use self::core::{
    // Facets
    Facet, FacetMask, FacetSet, LaneKind, Layout, VectorWidth,
    // Write policy
    Extension, RegClass, WriteMode, WritePolicy,
    // Register state
    ArchConfig, Flag, FlagCache, LiveOut, MergeBase, PendingMerge, Reg, RegFileStats, RegisterFile,
    // Builder seam
    IrBuilder, TypeContext,
    // Errors
    BuildError, FacetError, RegFileError,
};
