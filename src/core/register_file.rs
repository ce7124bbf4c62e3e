//! Per-basic-block architectural register file.
//!
//! The [`RegisterFile`] tracks, for every architectural register, which facets
//! currently hold an IR value. Reads return the cached value or derive it from
//! another present facet of the same register; writes invalidate exactly the
//! facets that can no longer be trusted. One instance exists per basic block
//! under construction, and its final state is read out as a [`LiveOut`] when
//! the block is sealed.
//!
//! Every facet slot is either absent or present, and all present facets of a
//! register agree on the register's content after every operation. A read of
//! an absent facet resolves in this order:
//!
//! 1. derive it from the widest present facet covering its bits
//!    (pointer/bit casts, a shift for the high byte, truncation);
//! 2. widen the value of the last defining write by zero or sign extension,
//!    as the architecture's [`WritePolicy`] prescribes;
//! 3. otherwise hand the decision back to the caller:
//!    [`RegFileError::Uninitialized`] if the register was never written,
//!    [`RegFileError::CombineRequired`] if preserving partial writes have to
//!    be folded into a full-width value first.

use std::fmt;
use std::sync::Arc;

use log::{debug, trace};

use super::builder::IrBuilder;
use super::error::{FacetError, RegFileError, RegFileResult};
use super::facet::{Facet, LaneKind, VectorWidth};
use super::live_out::LiveOut;
use super::value_map::{FacetSet, ValueMap, GP_FACETS, VECTOR128_FACETS, VECTOR256_FACETS};
use super::write_policy::{Extension, InvalidationTable, RegClass, WritePolicy};

/// Register number within its class.
pub type RegIndex = u8;

/// An architectural register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg {
    pub class: RegClass,
    pub index: RegIndex,
}

impl Reg {
    pub const fn gp(index: RegIndex) -> Self {
        Self { class: RegClass::Gp, index }
    }

    pub const fn vector(index: RegIndex) -> Self {
        Self { class: RegClass::Vector, index }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            RegClass::Gp => write!(f, "r{}", self.index),
            RegClass::Vector => write!(f, "v{}", self.index),
        }
    }
}

/// Condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flag {
    Zf,
    Sf,
    Pf,
    Cf,
    Of,
    Af,
}

impl Flag {
    pub const COUNT: usize = 6;

    pub const ALL: [Flag; Flag::COUNT] = [Flag::Zf, Flag::Sf, Flag::Pf, Flag::Cf, Flag::Of, Flag::Af];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Flag::Zf => "zf",
            Flag::Sf => "sf",
            Flag::Pf => "pf",
            Flag::Cf => "cf",
            Flag::Of => "of",
            Flag::Af => "af",
        }
    }

    pub fn from_name(name: &str) -> Option<Flag> {
        Flag::ALL.into_iter().find(|flag| flag.name() == name)
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operands of the last flag-defining comparison.
///
/// Handlers use the cached operands to rebuild a condition directly
/// (`icmp ult lhs, rhs` for "below") instead of combining materialized flag
/// bits. Only valid until the next flag write outside a recorded comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagCache<V> {
    pub valid: bool,
    pub lhs: Option<V>,
    pub rhs: Option<V>,
}

impl<V: Copy> FlagCache<V> {
    pub fn new() -> Self {
        Self { valid: false, lhs: None, rhs: None }
    }

    pub fn update(&mut self, lhs: V, rhs: V) {
        self.lhs = Some(lhs);
        self.rhs = Some(rhs);
        self.valid = true;
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// The cached operand pair, if still valid.
    pub fn operands(&self) -> Option<(V, V)> {
        match (self.valid, self.lhs, self.rhs) {
            (true, Some(lhs), Some(rhs)) => Some((lhs, rhs)),
            _ => None,
        }
    }
}

impl<V: Copy> Default for FlagCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Register layout and write semantics of a source architecture.
///
/// The invalidation tables are built with the configuration and shared by
/// every register file created from a clone of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchConfig {
    name: &'static str,
    gp_count: usize,
    vector_count: usize,
    vector_width: VectorWidth,
    policy: WritePolicy,
    tables: Arc<ArchTables>,
}

#[derive(Debug, PartialEq, Eq)]
struct ArchTables {
    gp: InvalidationTable,
    vector: InvalidationTable,
}

impl ArchTables {
    fn build(policy: &WritePolicy, width: VectorWidth) -> Self {
        let table =
            |class| InvalidationTable::build(policy, class, facet_set(class, width), register_bits(class, width));
        Self {
            gp: table(RegClass::Gp),
            vector: table(RegClass::Vector),
        }
    }
}

fn facet_set(class: RegClass, width: VectorWidth) -> &'static FacetSet {
    match (class, width) {
        (RegClass::Gp, _) => &GP_FACETS,
        (RegClass::Vector, VectorWidth::V128) => &VECTOR128_FACETS,
        (RegClass::Vector, VectorWidth::V256) => &VECTOR256_FACETS,
    }
}

fn register_bits(class: RegClass, width: VectorWidth) -> u32 {
    match class {
        RegClass::Gp => 64,
        RegClass::Vector => width.bits(),
    }
}

impl ArchConfig {
    pub fn new(
        name: &'static str,
        gp_count: usize,
        vector_count: usize,
        vector_width: VectorWidth,
        policy: WritePolicy,
    ) -> Self {
        let tables = Arc::new(ArchTables::build(&policy, vector_width));
        Self { name, gp_count, vector_count, vector_width, policy, tables }
    }

    pub fn x86_64() -> Self {
        Self::new("x86_64", 16, 16, VectorWidth::V128, WritePolicy::x86_64())
    }

    /// x86-64 with 256-bit YMM registers.
    pub fn x86_64_avx() -> Self {
        Self::new("x86_64-avx", 16, 16, VectorWidth::V256, WritePolicy::x86_64())
    }

    /// AArch64: x0-x30 plus sp, v0-v31.
    pub fn aarch64() -> Self {
        Self::new("aarch64", 32, 32, VectorWidth::V128, WritePolicy::aarch64())
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "x86_64" => Some(Self::x86_64()),
            "x86_64-avx" => Some(Self::x86_64_avx()),
            "aarch64" => Some(Self::aarch64()),
            _ => None,
        }
    }

    /// The same register layout with different write semantics.
    pub fn with_policy(self, policy: WritePolicy) -> Self {
        Self::new(self.name, self.gp_count, self.vector_count, self.vector_width, policy)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn vector_width(&self) -> VectorWidth {
        self.vector_width
    }

    pub fn policy(&self) -> &WritePolicy {
        &self.policy
    }

    pub fn facet_set(&self, class: RegClass) -> &'static FacetSet {
        facet_set(class, self.vector_width)
    }

    pub fn register_bits(&self, class: RegClass) -> u32 {
        register_bits(class, self.vector_width)
    }

    /// The facet covering a whole register of `class`.
    pub fn full_facet(&self, class: RegClass) -> Facet {
        match class {
            RegClass::Gp => Facet::I64,
            RegClass::Vector => Facet::ivec(self.vector_width),
        }
    }

    pub fn register_count(&self, class: RegClass) -> usize {
        match class {
            RegClass::Gp => self.gp_count,
            RegClass::Vector => self.vector_count,
        }
    }

    pub fn invalidation_table(&self, class: RegClass) -> &InvalidationTable {
        match class {
            RegClass::Gp => &self.tables.gp,
            RegClass::Vector => &self.tables.vector,
        }
    }
}

/// Full-width content of a register before its first preserving partial
/// write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeBase<V> {
    /// Nothing was known about the register.
    Unknown,
    /// The full-width value.
    Value(V),
    /// Not emitted yet: the full width is `value`, the `facet` view of the
    /// register, reinterpreted or extended with `extension` when narrower.
    /// [`RegisterFile::resolve_merge`] emits it before combining.
    Deferred { facet: Facet, value: V, extension: Extension },
}

impl<V: Copy> MergeBase<V> {
    /// The full-width value, if it exists as an IR value.
    pub fn value(&self) -> Option<V> {
        match *self {
            MergeBase::Value(value) => Some(value),
            MergeBase::Unknown | MergeBase::Deferred { .. } => None,
        }
    }
}

/// Preserving partial writes not yet folded into a full-width value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMerge<V> {
    /// Facet the combined value must have.
    pub full: Facet,
    pub base: MergeBase<V>,
    /// Partial writes in program order.
    pub parts: Vec<(Facet, V)>,
}

/// Last write that defined every bit of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Origin {
    facet: Facet,
    extension: Extension,
}

#[derive(Debug, Clone)]
struct RegState<V> {
    values: ValueMap<V>,
    origin: Option<Origin>,
    pending: Option<PendingMerge<V>>,
    written: bool,
}

/// Counters for register-file activity in one block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegFileStats {
    pub reads: usize,
    pub cache_hits: usize,
    /// Facets derived from a wider present facet.
    pub derived: usize,
    /// Facets obtained by extending a narrower defining write.
    pub widened: usize,
    pub writes: usize,
    pub partial_writes: usize,
    /// Cached values dropped by writes.
    pub invalidations: usize,
    pub renames: usize,
    pub merges: usize,
}

impl fmt::Display for RegFileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Register File Statistics:")?;
        writeln!(f, "  Reads: {} ({} cached)", self.reads, self.cache_hits)?;
        writeln!(f, "  Derived facets: {}", self.derived)?;
        writeln!(f, "  Widened facets: {}", self.widened)?;
        writeln!(f, "  Writes: {} ({} partial)", self.writes, self.partial_writes)?;
        writeln!(f, "  Invalidated facets: {}", self.invalidations)?;
        writeln!(f, "  Renames: {}", self.renames)?;
        writeln!(f, "  Merges: {}", self.merges)
    }
}

/// Register state of one basic block under construction.
pub struct RegisterFile<B: IrBuilder> {
    block: B::Block,
    config: ArchConfig,
    gp: Vec<RegState<B::Value>>,
    vector: Vec<RegState<B::Value>>,
    ip: Option<B::Value>,
    flags: [Option<B::Value>; Flag::COUNT],
    flag_cache: FlagCache<B::Value>,
    stats: RegFileStats,
}

impl<B: IrBuilder> RegisterFile<B> {
    /// Create an empty register file emitting into `block`.
    pub fn new(block: B::Block, config: ArchConfig) -> Self {
        let gp_set = config.facet_set(RegClass::Gp);
        let vector_set = config.facet_set(RegClass::Vector);
        debug!("register file for block {:?} ({})", block, config.name());

        Self {
            block,
            gp: (0..config.register_count(RegClass::Gp)).map(|_| RegState::new(gp_set)).collect(),
            vector: (0..config.register_count(RegClass::Vector))
                .map(|_| RegState::new(vector_set))
                .collect(),
            config,
            ip: None,
            flags: [None; Flag::COUNT],
            flag_cache: FlagCache::new(),
            stats: RegFileStats::default(),
        }
    }

    pub fn block(&self) -> B::Block {
        self.block
    }

    pub fn config(&self) -> &ArchConfig {
        &self.config
    }

    pub fn stats(&self) -> &RegFileStats {
        &self.stats
    }

    /// Resolve pseudo facets against the natural width of `reg` and check the
    /// result is tracked for its class.
    ///
    /// `I` resolves to the full register; packed pseudo facets resolve to
    /// 128-bit views (64-bit on general-purpose registers).
    pub fn canonical_facet(&self, reg: Reg, facet: Facet) -> RegFileResult<Facet> {
        let width = self.config.vector_width();
        let bits = self.config.register_bits(reg.class);
        let facet = match facet {
            Facet::I => Facet::I.resolve(bits, width)?,
            pseudo if pseudo.is_pseudo() => pseudo.resolve(bits.min(128), width)?,
            concrete => concrete,
        };
        self.config.facet_set(reg.class).check(facet)?;
        Ok(facet)
    }

    fn state(&self, reg: Reg) -> RegFileResult<&RegState<B::Value>> {
        let states = match reg.class {
            RegClass::Gp => &self.gp,
            RegClass::Vector => &self.vector,
        };
        states
            .get(reg.index as usize)
            .ok_or(RegFileError::RegisterOutOfRange { reg })
    }

    /// Read `reg` as `facet`, synthesizing and caching the view if needed.
    pub fn get_reg(&mut self, builder: &mut B, reg: Reg, facet: Facet) -> RegFileResult<B::Value> {
        let facet = self.canonical_facet(reg, facet)?;
        let block = self.block;
        self.stats.reads += 1;
        let state = state_mut(&mut self.gp, &mut self.vector, reg)?;
        state.read(builder, block, reg, facet, &mut self.stats)
    }

    /// Like [`RegisterFile::get_reg`], but folds pending partial writes with
    /// `combine` when the read needs them.
    pub fn get_reg_with<F>(
        &mut self,
        builder: &mut B,
        reg: Reg,
        facet: Facet,
        combine: F,
    ) -> RegFileResult<B::Value>
    where
        F: FnOnce(&mut B, &PendingMerge<B::Value>) -> RegFileResult<B::Value>,
    {
        match self.get_reg(builder, reg, facet) {
            Err(RegFileError::CombineRequired { .. }) => {
                self.resolve_merge(builder, reg, combine)?;
                self.get_reg(builder, reg, facet)
            }
            result => result,
        }
    }

    /// Write `value` as the `facet` view of `reg`.
    ///
    /// With `clear_facets`, or when the architecture defines the whole
    /// register for this write (full width, or zero/sign extending), every
    /// other facet is dropped and later reads re-derive from `value`.
    /// Otherwise the write preserves the untouched bits: facets overlapping
    /// the written bits are dropped, disjoint ones stay, and the write is
    /// recorded in the register's [`PendingMerge`] so a wider read can be
    /// rebuilt by the caller. A preserving write emits no IR.
    ///
    /// `value` must have the IR type of `facet`.
    pub fn set_reg(
        &mut self,
        builder: &mut B,
        reg: Reg,
        facet: Facet,
        value: B::Value,
        clear_facets: bool,
    ) -> RegFileResult<()> {
        let facet = self.canonical_facet(reg, facet)?;
        check_type(&*builder, facet, value)?;
        let layout = facet.concrete_layout()?;
        let full = self.config.full_facet(reg.class);
        let table = self.config.invalidation_table(reg.class);
        let defining = clear_facets || table.is_defining(facet);
        let invalidated = table.invalidated_by(facet);
        let extension = self
            .config
            .policy
            .mode(reg.class, facet)
            .extension()
            .unwrap_or(Extension::Zero);
        self.stats.writes += 1;

        let state = state_mut(&mut self.gp, &mut self.vector, reg)?;
        if defining {
            let dropped = state.values.present().filter(|(present, _)| *present != facet).count();
            state.values.clear();
            *state.values.at_mut(facet) = Some(value);
            if layout.offset == 0 {
                state.origin = Some(Origin { facet, extension });
                state.pending = None;
            } else {
                // Nothing below the view is known, so wider reads need a merge.
                state.origin = None;
                state.pending = Some(PendingMerge {
                    full,
                    base: MergeBase::Unknown,
                    parts: vec![(facet, value)],
                });
            }
            self.stats.invalidations += dropped;
            trace!("{reg}: defined by {facet} write, {dropped} facets dropped");
        } else {
            if state.pending.is_none() {
                let base = state.merge_base(full);
                state.pending = Some(PendingMerge { full, base, parts: Vec::new() });
            }
            if let Some(pending) = state.pending.as_mut() {
                pending.parts.push((facet, value));
            }
            let dropped = state.values.invalidate(invalidated);
            *state.values.at_mut(facet) = Some(value);
            state.origin = None;
            self.stats.partial_writes += 1;
            self.stats.invalidations += dropped;
            trace!("{reg}: partial {facet} write, {dropped} facets dropped");
        }
        state.written = true;
        Ok(())
    }

    /// Make `dst` an exact copy of `src`, reusing all of its cached values.
    pub fn rename(&mut self, dst: Reg, src: Reg) -> RegFileResult<()> {
        if dst.class != src.class {
            return Err(RegFileError::ClassMismatch { dst, src });
        }
        let copy = self.state(src)?.clone();
        let target = state_mut(&mut self.gp, &mut self.vector, dst)?;
        if dst != src {
            *target = copy;
            self.stats.renames += 1;
            debug!("{dst}: renamed from {src}");
        }
        Ok(())
    }

    /// The cached value of `facet`, without synthesizing anything.
    pub fn cached(&self, reg: Reg, facet: Facet) -> RegFileResult<Option<B::Value>> {
        let facet = self.canonical_facet(reg, facet)?;
        Ok(self.state(reg)?.values.get(facet)?)
    }

    pub fn is_cached(&self, reg: Reg, facet: Facet) -> RegFileResult<bool> {
        Ok(self.cached(reg, facet)?.is_some())
    }

    /// Partial writes of `reg` waiting to be combined, if any.
    pub fn pending_merge(&self, reg: Reg) -> RegFileResult<Option<&PendingMerge<B::Value>>> {
        Ok(self.state(reg)?.pending.as_ref())
    }

    /// Install `value` as the full-width content of `reg` after its pending
    /// partial writes were combined by the caller. Facets cached since the
    /// partial writes stay valid.
    pub fn commit_merge(&mut self, builder: &B, reg: Reg, value: B::Value) -> RegFileResult<()> {
        let state = state_mut(&mut self.gp, &mut self.vector, reg)?;
        let full = state
            .pending
            .as_ref()
            .map(|pending| pending.full)
            .ok_or(RegFileError::NoPendingMerge { reg })?;
        check_type(builder, full, value)?;
        let Some(pending) = state.pending.take() else {
            return Err(RegFileError::NoPendingMerge { reg });
        };
        *state.values.at_mut(pending.full) = Some(value);
        state.origin = Some(Origin { facet: pending.full, extension: Extension::Zero });
        self.stats.merges += 1;
        debug!("{reg}: merged {} partial writes", pending.parts.len());
        Ok(())
    }

    /// Combine the pending partial writes of `reg` with `combine`, emitting
    /// into this block, and commit the result.
    ///
    /// A deferred base is emitted first, so `combine` only ever sees
    /// [`MergeBase::Value`] or [`MergeBase::Unknown`].
    pub fn resolve_merge<F>(&mut self, builder: &mut B, reg: Reg, combine: F) -> RegFileResult<B::Value>
    where
        F: FnOnce(&mut B, &PendingMerge<B::Value>) -> RegFileResult<B::Value>,
    {
        let mut pending = self
            .pending_merge(reg)?
            .cloned()
            .ok_or(RegFileError::NoPendingMerge { reg })?;
        builder.position_at_end(self.block);
        if let MergeBase::Deferred { facet, value, extension } = pending.base {
            let base = materialize(builder, facet, value, pending.full, extension)?;
            trace!("{reg}: merge base {} built from {facet}", pending.full);
            pending.base = MergeBase::Value(base);
        }
        let merged = combine(builder, &pending)?;
        self.commit_merge(builder, reg, merged)?;
        Ok(merged)
    }

    pub fn get_flag(&self, flag: Flag) -> RegFileResult<B::Value> {
        self.flags[flag.index()].ok_or(RegFileError::UninitializedFlag(flag))
    }

    /// Write one flag. The flag cache no longer describes the flags afterwards.
    pub fn set_flag(&mut self, flag: Flag, value: B::Value) {
        self.flags[flag.index()] = Some(value);
        if self.flag_cache.valid {
            trace!("flag cache invalidated by {flag} write");
        }
        self.flag_cache.invalidate();
    }

    /// Write the flags of a comparison of `lhs` with `rhs` and record the
    /// operands in the flag cache.
    pub fn set_flags_from_compare<I>(&mut self, lhs: B::Value, rhs: B::Value, flags: I)
    where
        I: IntoIterator<Item = (Flag, B::Value)>,
    {
        for (flag, value) in flags {
            self.flags[flag.index()] = Some(value);
        }
        self.flag_cache.update(lhs, rhs);
    }

    pub fn flag_cache(&self) -> &FlagCache<B::Value> {
        &self.flag_cache
    }

    pub fn flag_cache_mut(&mut self) -> &mut FlagCache<B::Value> {
        &mut self.flag_cache
    }

    pub fn get_ip(&self) -> RegFileResult<B::Value> {
        self.ip.ok_or(RegFileError::UninitializedIp)
    }

    pub fn set_ip(&mut self, value: B::Value) {
        self.ip = Some(value);
    }

    /// Snapshot of every cached binding, the flags and the instruction
    /// pointer. Nothing is invalidated.
    pub fn live_out(&self) -> LiveOut<B::Value> {
        let mut live_out = LiveOut::new(self.ip, self.flags, self.flag_cache.operands());
        let regs = self
            .gp
            .iter()
            .enumerate()
            .map(|(index, state)| (Reg::gp(index as RegIndex), state))
            .chain(
                self.vector
                    .iter()
                    .enumerate()
                    .map(|(index, state)| (Reg::vector(index as RegIndex), state)),
            );
        for (reg, state) in regs {
            for (facet, value) in state.values.present() {
                live_out.bind(reg, facet, value);
            }
            if let Some(pending) = &state.pending {
                live_out.add_pending(reg, pending.clone());
            }
        }
        live_out
    }

    /// Finish the block and return its live-out state.
    pub fn seal(self) -> LiveOut<B::Value> {
        let live_out = self.live_out();
        debug!("sealed block {:?}: {} bindings", self.block, live_out.len());
        live_out
    }
}

fn state_mut<'s, V>(
    gp: &'s mut [RegState<V>],
    vector: &'s mut [RegState<V>],
    reg: Reg,
) -> RegFileResult<&'s mut RegState<V>> {
    let states = match reg.class {
        RegClass::Gp => gp,
        RegClass::Vector => vector,
    };
    states
        .get_mut(reg.index as usize)
        .ok_or(RegFileError::RegisterOutOfRange { reg })
}

impl<V: Copy> RegState<V> {
    fn new(set: &'static FacetSet) -> Self {
        Self {
            values: ValueMap::new(set),
            origin: None,
            pending: None,
            written: false,
        }
    }

    /// Widest present facet covering every bit of `facet`.
    fn widest_container(&self, facet: Facet) -> Option<(Facet, V)> {
        let target = facet.layout()?;
        let mut best: Option<(Facet, V, u32)> = None;
        for (present, value) in self.values.present() {
            let Some(layout) = present.layout() else { continue };
            if !layout.contains(&target) {
                continue;
            }
            if best.map_or(true, |(_, _, bits)| layout.bits() > bits) {
                best = Some((present, value, layout.bits()));
            }
        }
        best.map(|(present, value, _)| (present, value))
    }

    /// Full-width content to record when a preserving write starts a merge.
    fn merge_base(&self, full: Facet) -> MergeBase<V> {
        if let Some(value) = *self.values.at(full) {
            return MergeBase::Value(value);
        }
        if let Some((facet, value)) = self.widest_container(full) {
            return MergeBase::Deferred { facet, value, extension: Extension::Zero };
        }
        if let Some(origin) = self.origin {
            if let Some(value) = *self.values.at(origin.facet) {
                return MergeBase::Deferred { facet: origin.facet, value, extension: origin.extension };
            }
        }
        MergeBase::Unknown
    }

    fn read<B>(
        &mut self,
        builder: &mut B,
        block: B::Block,
        reg: Reg,
        facet: Facet,
        stats: &mut RegFileStats,
    ) -> RegFileResult<V>
    where
        B: IrBuilder<Value = V>,
    {
        if let Some(value) = *self.values.at(facet) {
            stats.cache_hits += 1;
            return Ok(value);
        }
        let layout = facet.concrete_layout()?;

        if let Some((source, value)) = self.widest_container(facet) {
            builder.position_at_end(block);
            let derived = derive(builder, source, value, facet)?;
            *self.values.at_mut(facet) = Some(derived);
            stats.derived += 1;
            trace!("{reg}: {facet} derived from {source}");
            return Ok(derived);
        }

        if self.pending.is_none() {
            if let Some(origin) = self.origin {
                let source = origin.facet.concrete_layout()?;
                if let Some(value) = *self.values.at(origin.facet) {
                    if source.offset == 0 && layout.end() > source.bits() {
                        builder.position_at_end(block);
                        let span = layout.end();
                        let wide = extend_to_int(builder, origin.facet, value, span, origin.extension)?;
                        let widened = extract(builder, wide, span, facet)?;
                        *self.values.at_mut(facet) = Some(widened);
                        stats.widened += 1;
                        trace!("{reg}: {facet} widened from {} ({:?})", origin.facet, origin.extension);
                        return Ok(widened);
                    }
                }
            }
        }

        if !self.written {
            return Err(RegFileError::Uninitialized { reg, facet });
        }
        debug!("{reg}: {facet} read needs a merge of partial writes");
        Err(RegFileError::CombineRequired { reg, facet })
    }
}

fn check_type<B: IrBuilder>(builder: &B, facet: Facet, value: B::Value) -> RegFileResult<()> {
    let expected = facet.ir_type(builder)?;
    let found = builder.value_type(value);
    if found != expected {
        return Err(FacetError::TypeMismatch {
            facet,
            expected: format!("{expected:?}"),
            found: format!("{found:?}"),
        }
        .into());
    }
    Ok(())
}

/// Reinterpret a facet value as a plain integer of the same width.
fn to_int<B: IrBuilder>(builder: &mut B, facet: Facet, value: B::Value) -> RegFileResult<B::Value> {
    let layout = facet.concrete_layout()?;
    if layout.is_plain_int() {
        return Ok(value);
    }
    let ty = builder.int_type(layout.bits());
    let value = match layout.kind {
        LaneKind::Ptr => builder.build_ptr_to_int(value, ty)?,
        LaneKind::Int | LaneKind::Float => builder.build_bitcast(value, ty)?,
    };
    Ok(value)
}

/// Reinterpret a plain integer of the facet's width as the facet's type.
fn from_int<B: IrBuilder>(builder: &mut B, value: B::Value, facet: Facet) -> RegFileResult<B::Value> {
    let layout = facet.concrete_layout()?;
    if layout.is_plain_int() {
        return Ok(value);
    }
    let ty = facet.ir_type(&*builder)?;
    let value = match layout.kind {
        LaneKind::Ptr => builder.build_int_to_ptr(value, ty)?,
        LaneKind::Int | LaneKind::Float => builder.build_bitcast(value, ty)?,
    };
    Ok(value)
}

/// Extract `facet` from an integer holding the low `bits` bits of the register.
fn extract<B: IrBuilder>(
    builder: &mut B,
    value: B::Value,
    bits: u32,
    facet: Facet,
) -> RegFileResult<B::Value> {
    let layout = facet.concrete_layout()?;
    let mut value = value;
    if layout.offset > 0 {
        value = builder.build_lshr(value, layout.offset)?;
    }
    if layout.bits() < bits {
        let ty = builder.int_type(layout.bits());
        value = builder.build_trunc(value, ty)?;
    }
    from_int(builder, value, facet)
}

/// Derive `target` from a present facet `source` that covers its bits.
fn derive<B: IrBuilder>(
    builder: &mut B,
    source: Facet,
    value: B::Value,
    target: Facet,
) -> RegFileResult<B::Value> {
    let from = source.concrete_layout()?;
    let to = target.concrete_layout()?;
    let casts_directly = from.bits() == to.bits()
        && from.offset == to.offset
        && from.kind != LaneKind::Ptr
        && to.kind != LaneKind::Ptr;
    if casts_directly {
        let ty = target.ir_type(&*builder)?;
        return Ok(builder.build_bitcast(value, ty)?);
    }
    let int = to_int(builder, source, value)?;
    // `int` holds the source bits starting at the source offset.
    let shifted = to.offset - from.offset;
    let mut value = int;
    if shifted > 0 {
        value = builder.build_lshr(value, shifted)?;
    }
    if to.bits() < from.bits() {
        let ty = builder.int_type(to.bits());
        value = builder.build_trunc(value, ty)?;
    }
    from_int(builder, value, target)
}

/// Build the `full` facet from the `source` view at offset zero, extending a
/// narrower source with `extension`.
fn materialize<B: IrBuilder>(
    builder: &mut B,
    source: Facet,
    value: B::Value,
    full: Facet,
    extension: Extension,
) -> RegFileResult<B::Value> {
    let from = source.concrete_layout()?;
    let to = full.concrete_layout()?;
    if from.bits() >= to.bits() {
        return derive(builder, source, value, full);
    }
    let wide = extend_to_int(builder, source, value, to.bits(), extension)?;
    from_int(builder, wide, full)
}

/// Zero- or sign-extend a facet value to a plain integer of `bits` bits.
fn extend_to_int<B: IrBuilder>(
    builder: &mut B,
    facet: Facet,
    value: B::Value,
    bits: u32,
    extension: Extension,
) -> RegFileResult<B::Value> {
    let int = to_int(builder, facet, value)?;
    let ty = builder.int_type(bits);
    let value = match extension {
        Extension::Zero => builder.build_zext(int, ty)?,
        Extension::Sign => builder.build_sext(int, ty)?,
    };
    Ok(value)
}
