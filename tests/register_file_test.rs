//! Register file behaviour over the test IR.

use bumpalo::Bump;
use lifter::core::{
    ArchConfig, Facet, Flag, MergeBase, PendingMerge, Reg, RegFileError, RegFileResult, RegisterFile, VectorWidth,
};
use lifter::test_ir::{IrContext, Opcode, TirBuilder, Type, ValueRef};

const RAX: Reg = Reg::gp(0);
const RCX: Reg = Reg::gp(1);
const RDX: Reg = Reg::gp(2);

const PATTERN: u128 = 0x1122_3344_5566_7788;

fn mask(value: u128, bits: u32) -> u128 {
    value & ((1u128 << bits) - 1)
}

fn combine<'a>(b: &mut TirBuilder<'a>, pending: &PendingMerge<ValueRef<'a>>) -> RegFileResult<ValueRef<'a>> {
    let ty = pending.full.ir_type(&*b)?;
    let mut merged = pending.base.value().unwrap_or_else(|| b.context().undef(ty));
    for &(facet, part) in &pending.parts {
        merged = b.build_custom(&format!("insert.{facet}"), ty, &[merged, part])?;
    }
    Ok(merged)
}

/// Put `reg` into a messy state: cached derived views and a pending partial write.
fn scramble<'a>(ctx: IrContext<'a>, b: &mut TirBuilder<'a>, rf: &mut RegisterFile<TirBuilder<'a>>, reg: Reg) {
    let junk = ctx.arg("junk", Type::Int(64));
    let word = ctx.arg("word", Type::Int(16));
    rf.set_reg(b, reg, Facet::I64, junk, true).unwrap();
    rf.get_reg(b, reg, Facet::I8H).unwrap();
    rf.get_reg(b, reg, Facet::Ptr).unwrap();
    rf.set_reg(b, reg, Facet::I16, word, false).unwrap();
    assert!(rf.pending_merge(reg).unwrap().is_some());
}

#[test]
fn test_round_trip_truncation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let scalars = [Facet::I8, Facet::I16, Facet::I32, Facet::I64];

    for wide in scalars {
        let wide_bits = wide.bits().unwrap();
        for narrow in scalars.into_iter().filter(|f| f.bits().unwrap() <= wide_bits) {
            let arena = Bump::new();
            let ctx = IrContext::new(&arena);
            let block = ctx.block("entry");
            let mut b = ctx.builder();
            let mut rf = RegisterFile::<TirBuilder>::new(block, ArchConfig::x86_64());

            scramble(ctx, &mut b, &mut rf, RAX);
            let before = block.len();

            let value = ctx.const_int(Type::Int(wide_bits), PATTERN);
            rf.set_reg(&mut b, RAX, wide, value, true).unwrap();
            let read = rf.get_reg(&mut b, RAX, narrow).unwrap();

            let narrow_bits = narrow.bits().unwrap();
            assert_eq!(read.ty(), Type::Int(narrow_bits), "{wide} -> {narrow}");
            assert_eq!(read.as_const(), Some(mask(PATTERN, narrow_bits)), "{wide} -> {narrow}");
            assert_eq!(block.len(), before, "{wide} -> {narrow} emitted IR for constants");
        }
    }
}

#[test]
fn test_round_trip_high_byte() {
    let arena = Bump::new();
    let ctx = IrContext::new(&arena);
    let block = ctx.block("entry");
    let mut b = ctx.builder();
    let mut rf = RegisterFile::<TirBuilder>::new(block, ArchConfig::x86_64());

    for wide in [Facet::I16, Facet::I32, Facet::I64] {
        let bits = wide.bits().unwrap();
        let value = ctx.const_int(Type::Int(bits), PATTERN);
        rf.set_reg(&mut b, RAX, wide, value, true).unwrap();
        let ah = rf.get_reg(&mut b, RAX, Facet::I8H).unwrap();
        assert_eq!(ah.as_const(), Some(0x77), "{wide}");
    }
    assert!(block.is_empty());
}

#[test]
fn test_partial_write_is_never_stale() {
    let arena = Bump::new();
    let ctx = IrContext::new(&arena);
    let block = ctx.block("entry");
    let mut b = ctx.builder();
    let mut rf = RegisterFile::<TirBuilder>::new(block, ArchConfig::x86_64());

    let a = ctx.arg("a", Type::Int(64));
    let byte = ctx.arg("b", Type::Int(8));
    rf.set_reg(&mut b, RAX, Facet::I64, a, false).unwrap();
    rf.set_reg(&mut b, RAX, Facet::I8, byte, false).unwrap();

    assert_eq!(rf.cached(RAX, Facet::I64).unwrap(), None);
    assert_eq!(rf.get_reg(&mut b, RAX, Facet::I8).unwrap(), byte);
    assert_eq!(
        rf.get_reg(&mut b, RAX, Facet::I64),
        Err(RegFileError::CombineRequired { reg: RAX, facet: Facet::I64 })
    );

    let full = rf.get_reg_with(&mut b, RAX, Facet::I64, combine).unwrap();
    assert_ne!(full, a);
    assert_eq!(full.operands(), &[a, byte]);
    assert_eq!(rf.get_reg(&mut b, RAX, Facet::I8).unwrap(), byte);
    assert!(rf.pending_merge(RAX).unwrap().is_none());
    assert_eq!(rf.stats().merges, 1);
}

#[test]
fn test_successive_partial_writes_keep_order() {
    let arena = Bump::new();
    let ctx = IrContext::new(&arena);
    let block = ctx.block("entry");
    let mut b = ctx.builder();
    let mut rf = RegisterFile::<TirBuilder>::new(block, ArchConfig::x86_64());

    let a = ctx.arg("a", Type::Int(64));
    let lo = ctx.arg("lo", Type::Int(8));
    let hi = ctx.arg("hi", Type::Int(8));
    rf.set_reg(&mut b, RAX, Facet::I64, a, true).unwrap();
    rf.set_reg(&mut b, RAX, Facet::I8, lo, false).unwrap();
    rf.set_reg(&mut b, RAX, Facet::I8H, hi, false).unwrap();

    let pending = rf.pending_merge(RAX).unwrap().unwrap();
    assert_eq!(pending.base, MergeBase::Value(a));
    assert_eq!(pending.parts, vec![(Facet::I8, lo), (Facet::I8H, hi)]);

    let word = rf.get_reg_with(&mut b, RAX, Facet::I16, combine).unwrap();
    assert_eq!(word.opcode(), Some(Opcode::Trunc));
    let merged = word.operands()[0];
    assert_eq!(merged.operands()[1], hi);
    assert_eq!(merged.operands()[0].operands(), &[a, lo]);
}

#[test]
fn test_rename_aliases_without_new_ir() {
    let arena = Bump::new();
    let ctx = IrContext::new(&arena);
    let block = ctx.block("entry");
    let mut b = ctx.builder();
    let mut rf = RegisterFile::<TirBuilder>::new(block, ArchConfig::x86_64());

    let a = ctx.arg("a", Type::Int(64));
    rf.set_reg(&mut b, RCX, Facet::I64, a, true).unwrap();
    for facet in [Facet::I32, Facet::I8H, Facet::Ptr] {
        rf.get_reg(&mut b, RCX, facet).unwrap();
    }
    let emitted = block.len();

    rf.rename(RDX, RCX).unwrap();
    for facet in [Facet::I64, Facet::I32, Facet::I8H, Facet::Ptr] {
        let src = rf.cached(RCX, facet).unwrap().unwrap();
        assert_eq!(rf.get_reg(&mut b, RDX, facet).unwrap(), src, "{facet}");
    }
    assert_eq!(block.len(), emitted);

    assert_eq!(
        rf.rename(RDX, Reg::vector(0)),
        Err(RegFileError::ClassMismatch { dst: RDX, src: Reg::vector(0) })
    );
}

#[test]
fn test_flag_cache_lifecycle() {
    let arena = Bump::new();
    let ctx = IrContext::new(&arena);
    let block = ctx.block("entry");
    let mut rf = RegisterFile::<TirBuilder>::new(block, ArchConfig::x86_64());

    let lhs = ctx.arg("lhs", Type::Int(32));
    let rhs = ctx.arg("rhs", Type::Int(32));
    let zf = ctx.arg("zf", Type::Int(1));
    let cf = ctx.arg("cf", Type::Int(1));
    assert!(!rf.flag_cache().valid);

    rf.set_flags_from_compare(lhs, rhs, [(Flag::Zf, zf), (Flag::Cf, cf)]);
    assert!(rf.flag_cache().valid);
    assert_eq!(rf.flag_cache().operands(), Some((lhs, rhs)));
    assert_eq!(rf.get_flag(Flag::Zf).unwrap(), zf);

    rf.set_flag(Flag::Cf, zf);
    assert!(!rf.flag_cache().valid);
    assert_eq!(rf.flag_cache().operands(), None);

    rf.set_flags_from_compare(lhs, rhs, Vec::<(Flag, ValueRef<'_>)>::new());
    rf.flag_cache_mut().invalidate();
    assert!(!rf.flag_cache().valid);
    assert_eq!(rf.get_flag(Flag::Of), Err(RegFileError::UninitializedFlag(Flag::Of)));
}

#[test]
fn test_resolve_is_total_on_supported_widths() {
    for bits in [8, 16, 32, 64, 128] {
        let facet = Facet::for_width(bits, VectorWidth::V128).unwrap();
        assert_eq!(facet.bits(), Some(bits));
        assert_eq!(Facet::for_width(bits, VectorWidth::V256), Ok(facet));
    }
    assert_eq!(Facet::for_width(256, VectorWidth::V256), Ok(Facet::I256));
    for bits in [0, 1, 12, 24, 48, 96, 512] {
        assert!(Facet::for_width(bits, VectorWidth::V256).is_err(), "{bits}");
    }
    assert!(Facet::for_width(256, VectorWidth::V128).is_err());
}

#[test]
fn test_zero_extended_constant_scenario() {
    let arena = Bump::new();
    let ctx = IrContext::new(&arena);
    let block = ctx.block("entry");
    let mut b = ctx.builder();
    let mut rf = RegisterFile::<TirBuilder>::new(block, ArchConfig::x86_64());

    let one = ctx.const_int(Type::Int(32), 1);
    rf.set_reg(&mut b, RAX, Facet::I32, one, true).unwrap();
    let full = rf.get_reg(&mut b, RAX, Facet::I64).unwrap();
    let low = rf.get_reg(&mut b, RAX, Facet::I8).unwrap();
    assert_eq!((full.ty(), full.as_const()), (Type::Int(64), Some(1)));
    assert_eq!((low.ty(), low.as_const()), (Type::Int(8), Some(1)));
}

#[test]
fn test_live_out_after_seal() {
    let arena = Bump::new();
    let ctx = IrContext::new(&arena);
    let block = ctx.block("entry");
    let mut b = ctx.builder();
    let mut rf = RegisterFile::<TirBuilder>::new(block, ArchConfig::x86_64());

    let a = ctx.arg("a", Type::Int(64));
    let byte = ctx.arg("b", Type::Int(8));
    let ip = ctx.const_int(Type::Int(64), 0x401000);
    rf.set_reg(&mut b, RAX, Facet::I64, a, true).unwrap();
    rf.set_reg(&mut b, RDX, Facet::I8, byte, false).unwrap();
    rf.set_ip(ip);

    let live_out = rf.seal();
    assert_eq!(live_out.get(RAX, Facet::I64), Some(a));
    assert_eq!(live_out.get(RDX, Facet::I8), Some(byte));
    assert_eq!(live_out.registers(), vec![RAX, RDX]);
    assert_eq!(live_out.ip(), Some(ip));
    assert_eq!(live_out.pending_registers(), vec![RDX]);
    assert_eq!(live_out.pending_merge(RDX).unwrap().base, MergeBase::Unknown);
}
