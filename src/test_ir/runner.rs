//! Lift script execution.
//!
//! The runner plays the instruction-handler layer: it owns the IR context,
//! creates one register file per script block, supplies `undef` for reads the
//! register file reports as uninitialized and folds pending partial writes
//! into opaque `insert.<facet>` calls. The output lists, per block, the reads
//! in script order, the emitted IR and the live-out snapshot.

use std::collections::HashMap;
use std::fmt::Write as _;

use bumpalo::Bump;
use log::{debug, info};

use super::parser::{parse_script, RegSpec, Script, ScriptBlock, ScriptError, Stmt, ValueExpr};
use super::{IrContext, TirBuilder, Type, ValueRef};
use crate::core::{
    ArchConfig, BuildError, Flag, IrBuilder, LiveOut, MergeBase, PendingMerge, RegFileError, RegFileResult,
    RegisterFile,
};

/// Options overriding what the script itself selects.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub arch: Option<ArchConfig>,
    /// Append register-file statistics to every block.
    pub stats: bool,
}

impl RunOptions {
    /// These options with everything `overrides` sets taking precedence.
    pub fn overridden_by(mut self, overrides: &RunOptions) -> Self {
        if let Some(arch) = &overrides.arch {
            self.arch = Some(arch.clone());
        }
        self.stats |= overrides.stats;
        self
    }
}

pub fn run_source(text: &str, options: &RunOptions) -> Result<String, ScriptError> {
    let script = parse_script(text)?;
    run_script(&script, options)
}

pub fn run_script(script: &Script, options: &RunOptions) -> Result<String, ScriptError> {
    let arena = Bump::new();
    let ctx = IrContext::new(&arena);
    let arch = options.arch.clone().unwrap_or_else(|| script.arch.clone());
    info!("running lift script for {} ({} blocks)", arch.name(), script.blocks.len());

    let mut runner = Runner {
        ctx,
        builder: ctx.builder(),
        values: HashMap::new(),
        out: String::new(),
    };
    for arg in &script.args {
        runner.values.insert(arg.name.clone(), ctx.arg(&arg.name, arg.ty));
    }
    for block in &script.blocks {
        runner.run_block(block, &arch, options)?;
    }
    Ok(runner.out)
}

/// Combine partial writes over the base value, or `undef` when the content
/// before the first partial write was unknown.
fn combine_parts<'a>(
    builder: &mut TirBuilder<'a>,
    pending: &PendingMerge<ValueRef<'a>>,
) -> RegFileResult<ValueRef<'a>> {
    let ty = pending.full.ir_type(&*builder)?;
    let mut merged = match pending.base.value() {
        Some(base) => base,
        None => builder.context().undef(ty),
    };
    for &(facet, part) in &pending.parts {
        merged = builder.build_custom(&format!("insert.{facet}"), ty, &[merged, part])?;
    }
    Ok(merged)
}

struct Runner<'a> {
    ctx: IrContext<'a>,
    builder: TirBuilder<'a>,
    values: HashMap<String, ValueRef<'a>>,
    out: String,
}

fn reg_err(line: usize) -> impl Fn(RegFileError) -> ScriptError {
    move |source| ScriptError::RegFile { line, source }
}

fn build_err(line: usize) -> impl Fn(BuildError) -> ScriptError {
    move |source| ScriptError::Build { line, source }
}

impl<'a> Runner<'a> {
    fn run_block(&mut self, block: &ScriptBlock, arch: &ArchConfig, options: &RunOptions) -> Result<(), ScriptError> {
        let ir_block = self.ctx.block(&block.name);
        let mut rf: RegisterFile<TirBuilder<'a>> = RegisterFile::new(ir_block, arch.clone());

        let _ = writeln!(self.out, "block {}", block.name);
        for (line, stmt) in &block.stmts {
            self.exec(&mut rf, *line, stmt)?;
        }

        let _ = writeln!(self.out, "ir {}", block.name);
        for inst in ir_block.insts() {
            let _ = writeln!(self.out, "  {}", inst.display_inst());
        }
        if options.stats {
            let _ = writeln!(self.out, "stats {}", block.name);
            for line in rf.stats().to_string().lines() {
                let _ = writeln!(self.out, "  {line}");
            }
        }

        let live_out = rf.seal();
        let _ = writeln!(self.out, "live-out {}", block.name);
        self.print_live_out(&live_out);
        Ok(())
    }

    fn print_live_out(&mut self, live_out: &LiveOut<ValueRef<'a>>) {
        for binding in live_out.bindings() {
            let _ = writeln!(self.out, "  {}:{} = {}", binding.reg, binding.facet, binding.value);
        }
        for (flag, value) in live_out.flags() {
            let _ = writeln!(self.out, "  {flag} = {value}");
        }
        if let Some((lhs, rhs)) = live_out.compare_operands() {
            let _ = writeln!(self.out, "  cmp = {lhs}, {rhs}");
        }
        if let Some(ip) = live_out.ip() {
            let _ = writeln!(self.out, "  ip = {ip}");
        }
        for reg in live_out.pending_registers() {
            let Some(pending) = live_out.pending_merge(reg) else { continue };
            let base = match pending.base {
                MergeBase::Unknown => "none".to_string(),
                MergeBase::Value(base) => base.to_string(),
                MergeBase::Deferred { facet, value, .. } => format!("{facet} {value}"),
            };
            let parts: Vec<_> = pending.parts.iter().map(|(facet, value)| format!("{facet} {value}")).collect();
            let _ = writeln!(
                self.out,
                "  pending {reg}: {} base={base} parts=[{}]",
                pending.full,
                parts.join(", ")
            );
        }
    }

    fn define(&mut self, line: usize, name: &str, value: ValueRef<'a>) -> Result<(), ScriptError> {
        if self.values.contains_key(name) {
            return Err(ScriptError::Redefined { line, name: name.to_string() });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn lookup(&self, line: usize, name: &str) -> Result<ValueRef<'a>, ScriptError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| ScriptError::UnknownValue { line, name: name.to_string() })
    }

    /// Resolve an operand; literals take the type `ty`, which must be an integer.
    fn operand(&self, line: usize, expr: &ValueExpr, ty: Type) -> Result<ValueRef<'a>, ScriptError> {
        let value = match expr {
            ValueExpr::Named(name) => self.lookup(line, name)?,
            ValueExpr::Int(bits) => {
                if !ty.is_int() {
                    return Err(ScriptError::Type { line, message: format!("integer literal used as {ty}") });
                }
                self.ctx.const_int(ty, *bits)
            }
        };
        if value.ty() != ty {
            return Err(ScriptError::Type {
                line,
                message: format!("{value} has type {}, expected {ty}", value.ty()),
            });
        }
        Ok(value)
    }

    fn facet_type(
        &self,
        rf: &RegisterFile<TirBuilder<'a>>,
        line: usize,
        spec: RegSpec,
    ) -> Result<Type, ScriptError> {
        let facet = rf.canonical_facet(spec.reg, spec.facet).map_err(reg_err(line))?;
        let ty = facet.ir_type(&self.ctx).map_err(|err| reg_err(line)(err.into()))?;
        Ok(ty)
    }

    fn exec(&mut self, rf: &mut RegisterFile<TirBuilder<'a>>, line: usize, stmt: &Stmt) -> Result<(), ScriptError> {
        match stmt {
            Stmt::Set { target, value, clear } => {
                let ty = self.facet_type(rf, line, *target)?;
                let value = self.operand(line, value, ty)?;
                rf.set_reg(&mut self.builder, target.reg, target.facet, value, *clear)
                    .map_err(reg_err(line))?;
            }
            Stmt::Get { name, source } => {
                let ty = self.facet_type(rf, line, *source)?;
                let value = match rf.get_reg_with(&mut self.builder, source.reg, source.facet, combine_parts) {
                    Ok(value) => value,
                    Err(RegFileError::Uninitialized { reg, facet }) => {
                        debug!("line {line}: {reg} read as {facet} before any write");
                        self.ctx.undef(ty)
                    }
                    Err(err) => return Err(reg_err(line)(err)),
                };
                let _ = writeln!(self.out, "  read %{name} = {}:{} -> {value:?}", source.reg, source.facet);
                self.define(line, name, value)?;
            }
            Stmt::Rename { dst, src } => {
                rf.rename(*dst, *src).map_err(reg_err(line))?;
            }
            Stmt::Merge { reg } => {
                let merged = rf
                    .resolve_merge(&mut self.builder, *reg, combine_parts)
                    .map_err(reg_err(line))?;
                let _ = writeln!(self.out, "  merge {reg} -> {merged:?}");
            }
            Stmt::SetFlag { flag, value } => {
                let value = self.operand(line, value, Type::Int(1))?;
                rf.set_flag(*flag, value);
            }
            Stmt::GetFlag { name, flag } => {
                let value = match rf.get_flag(*flag) {
                    Ok(value) => value,
                    Err(_) => self.ctx.undef(Type::Int(1)),
                };
                let _ = writeln!(self.out, "  read %{name} = {flag} -> {value:?}");
                self.define(line, name, value)?;
            }
            Stmt::Compare { lhs, rhs, flags } => {
                let (lhs, rhs) = self.compare_operands(line, lhs, rhs)?;
                let defined = self.compare_flags(rf, line, lhs, rhs, flags)?;
                rf.set_flags_from_compare(lhs, rhs, defined);
            }
            Stmt::SetIp { value } => {
                let value = self.operand(line, value, Type::Int(64))?;
                rf.set_ip(value);
            }
            Stmt::GetIp { name } => {
                let value = rf.get_ip().unwrap_or_else(|_| self.ctx.undef(Type::Int(64)));
                let _ = writeln!(self.out, "  read %{name} = ip -> {value:?}");
                self.define(line, name, value)?;
            }
        }
        Ok(())
    }

    fn compare_operands(
        &self,
        line: usize,
        lhs: &ValueExpr,
        rhs: &ValueExpr,
    ) -> Result<(ValueRef<'a>, ValueRef<'a>), ScriptError> {
        let ty = match (lhs, rhs) {
            (ValueExpr::Named(name), _) | (_, ValueExpr::Named(name)) => self.lookup(line, name)?.ty(),
            _ => {
                return Err(ScriptError::Type { line, message: "comparison of two literals".to_string() });
            }
        };
        Ok((self.operand(line, lhs, ty)?, self.operand(line, rhs, ty)?))
    }

    /// Emit one opaque `cmp.<flag>` per defined flag.
    fn compare_flags(
        &mut self,
        rf: &RegisterFile<TirBuilder<'a>>,
        line: usize,
        lhs: ValueRef<'a>,
        rhs: ValueRef<'a>,
        flags: &[Flag],
    ) -> Result<Vec<(Flag, ValueRef<'a>)>, ScriptError> {
        self.builder.position_at_end(rf.block());
        flags
            .iter()
            .map(|&flag| {
                self.builder
                    .build_custom(&format!("cmp.{flag}"), Type::Int(1), &[lhs, rhs])
                    .map(|value| (flag, value))
                    .map_err(build_err(line))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> String {
        run_source(text, &RunOptions::default()).unwrap()
    }

    #[test]
    fn test_zero_extended_constant() {
        let out = run("block entry\nset eax = 1\nget %r = rax\n");
        assert!(out.contains("read %r = r0:i64 -> i64 1"), "{out}");
        assert!(out.contains("ir entry\nlive-out entry"), "{out}");
    }

    #[test]
    fn test_uninitialized_reads_are_undef() {
        let out = run("block entry\nget %x = r5:i32\ngetflag %z = zf\ngetip %pc\n");
        assert!(out.contains("read %x = r5:i32 -> i32 undef"), "{out}");
        assert!(out.contains("read %z = zf -> i1 undef"), "{out}");
        assert!(out.contains("read %pc = ip -> i64 undef"), "{out}");
    }

    #[test]
    fn test_partial_write_is_merged_on_read() {
        let out = run(
            "arg %a : i64\narg %b : i8\nblock entry\nset rax = %a\nset al = %b\nget %r = rax\n",
        );
        assert!(out.contains("= call i64 @insert.i8(i64 %a, i8 %b)"), "{out}");
        assert!(!out.contains("pending"), "{out}");
    }

    #[test]
    fn test_preserving_write_after_dword_emits_nothing() {
        let options = RunOptions { arch: None, stats: true };
        let script = "arg %e : i32\narg %b : i8\nblock entry\nset eax = %e\nset al = %b\n";
        let out = run_source(script, &options).unwrap();
        assert!(out.contains("ir entry\nstats entry"), "{out}");
        assert!(out.contains("Reads: 0 (0 cached)"), "{out}");
        assert!(out.contains("  pending r0: i64 base=i32 %e parts=[i8 %b]"), "{out}");
    }

    #[test]
    fn test_options_override() {
        let script = RunOptions { arch: ArchConfig::by_name("aarch64"), stats: false };
        let merged = script.clone().overridden_by(&RunOptions { arch: None, stats: true });
        assert_eq!(merged.arch.as_ref().map(ArchConfig::name), Some("aarch64"));
        assert!(merged.stats);

        let merged = script.overridden_by(&RunOptions { arch: ArchConfig::by_name("x86_64"), stats: false });
        assert_eq!(merged.arch.as_ref().map(ArchConfig::name), Some("x86_64"));
        assert!(!merged.stats);
    }

    #[test]
    fn test_pending_merge_is_live_out() {
        let out = run("arg %b : i8\nblock entry\nset bl = %b\n");
        assert!(out.contains("  pending r3: i64 base=none parts=[i8 %b]"), "{out}");
    }

    #[test]
    fn test_script_errors() {
        let options = RunOptions::default();
        assert!(matches!(
            run_source("block entry\nset eax = %nope\n", &options),
            Err(ScriptError::UnknownValue { line: 2, .. })
        ));
        assert!(matches!(
            run_source("arg %a : i64\nblock entry\nset eax = %a\n", &options),
            Err(ScriptError::Type { line: 3, .. })
        ));
        assert!(matches!(
            run_source("block entry\nset xmm0:i8h = 1\n", &options),
            Err(ScriptError::RegFile { line: 2, .. })
        ));
        assert!(matches!(
            run_source("block entry\nmerge r0\n", &options),
            Err(ScriptError::RegFile { line: 2, source: RegFileError::NoPendingMerge { .. } })
        ));
    }

    #[test]
    fn test_arch_override() {
        let options = RunOptions { arch: ArchConfig::by_name("aarch64"), stats: true };
        let out = run_source("block b\nset r31:i32 = 3\n", &options).unwrap();
        assert!(out.contains("stats b"), "{out}");
        assert!(out.contains("Writes: 1 (0 partial)"), "{out}");
    }
}
