//! Architecture write semantics.
//!
//! How a narrow register write affects the rest of the register is
//! architecture data: on x86-64 a 32-bit write zeroes bits 32..64 while 8- and
//! 16-bit writes keep them, on AArch64 every scalar SIMD write clears the rest
//! of the vector register. [`WritePolicy`] records that per register class and
//! facet. [`InvalidationTable`] turns a policy into the static
//! "writing facet A invalidates cached facet B" relation the register file
//! consults on every write. Tables are built once per
//! [`ArchConfig`](super::ArchConfig).

use std::fmt;

use super::facet::{Facet, FACET_COUNT};
use super::value_map::{FacetMask, FacetSet};

/// Register classes with separately tracked facet sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    Gp,
    Vector,
}

impl fmt::Display for RegClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegClass::Gp => f.write_str("gp"),
            RegClass::Vector => f.write_str("vector"),
        }
    }
}

/// How bits of a register outside a written facet are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Zero,
    Sign,
}

/// Effect of a non-clearing write of one facet on the rest of its register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Upper bits become zero.
    ZeroExtend,
    /// Upper bits become copies of the written value's sign bit.
    SignExtend,
    /// Bits outside the facet keep their previous content.
    Preserve,
}

impl WriteMode {
    pub const fn extension(self) -> Option<Extension> {
        match self {
            WriteMode::ZeroExtend => Some(Extension::Zero),
            WriteMode::SignExtend => Some(Extension::Sign),
            WriteMode::Preserve => None,
        }
    }
}

/// Per-architecture write semantics for every (class, facet) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePolicy {
    name: &'static str,
    gp: [WriteMode; FACET_COUNT],
    vector: [WriteMode; FACET_COUNT],
}

impl WritePolicy {
    /// A policy where every partial write preserves the remaining bits.
    pub const fn preserving(name: &'static str) -> Self {
        Self {
            name,
            gp: [WriteMode::Preserve; FACET_COUNT],
            vector: [WriteMode::Preserve; FACET_COUNT],
        }
    }

    pub const fn with_mode(mut self, class: RegClass, facet: Facet, mode: WriteMode) -> Self {
        match class {
            RegClass::Gp => self.gp[facet.index()] = mode,
            RegClass::Vector => self.vector[facet.index()] = mode,
        }
        self
    }

    /// x86-64: 32-bit GP writes zero-extend, 8/16-bit and high-byte writes
    /// merge. Legacy SSE writes keep the untouched lanes; VEX forms that zero
    /// the upper bits are issued as clearing writes by the handlers.
    pub const fn x86_64() -> Self {
        Self::preserving("x86_64").with_mode(RegClass::Gp, Facet::I32, WriteMode::ZeroExtend)
    }

    /// AArch64: W-register writes zero-extend, and any write to a narrower
    /// view of a SIMD register zeroes the rest of it.
    pub const fn aarch64() -> Self {
        let mut policy = Self::preserving("aarch64")
            .with_mode(RegClass::Gp, Facet::I32, WriteMode::ZeroExtend)
            .with_mode(RegClass::Gp, Facet::I16, WriteMode::ZeroExtend)
            .with_mode(RegClass::Gp, Facet::I8, WriteMode::ZeroExtend);
        policy.vector = [WriteMode::ZeroExtend; FACET_COUNT];
        policy
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn mode(&self, class: RegClass, facet: Facet) -> WriteMode {
        match class {
            RegClass::Gp => self.gp[facet.index()],
            RegClass::Vector => self.vector[facet.index()],
        }
    }
}

/// For each written facet, the cached facets a non-clearing write drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationTable {
    rows: [FacetMask; FACET_COUNT],
    defining: FacetMask,
}

impl InvalidationTable {
    /// Build the table for the facets of `set` in a register of
    /// `register_bits` bits.
    ///
    /// A write that spans the whole register, or whose mode extends into the
    /// upper bits, redefines every bit and drops all other facets. A
    /// preserving write drops exactly the facets sharing a bit with it.
    pub fn build(policy: &WritePolicy, class: RegClass, set: &FacetSet, register_bits: u32) -> Self {
        let mut rows = [FacetMask::EMPTY; FACET_COUNT];
        let mut defining = FacetMask::new();

        for &written in set.facets() {
            let Some(layout) = written.layout() else { continue };
            let full = layout.offset == 0 && layout.bits() >= register_bits;
            let extends = policy.mode(class, written).extension().is_some() && layout.offset == 0;

            let mut row = FacetMask::new();
            for &cached in set.facets() {
                if cached == written {
                    continue;
                }
                let Some(other) = cached.layout() else { continue };
                if full || extends || layout.overlaps(&other) {
                    row.set(cached);
                }
            }
            if full || extends {
                defining.set(written);
            }
            rows[written.index()] = row;
        }

        Self { rows, defining }
    }

    /// Facets invalidated by a non-clearing write of `written`.
    pub fn invalidated_by(&self, written: Facet) -> FacetMask {
        self.rows[written.index()]
    }

    /// Whether a non-clearing write of `written` defines the whole register.
    pub fn is_defining(&self, written: Facet) -> bool {
        self.defining.contains(written)
    }
}
