// This module is the hub of the lifter's register-file core, shared by every source
// architecture and IR backend. It exports: facets (typed views of a register and their bit
// layouts), value maps (the per-register facet slots and the static facet sets per register
// class), write policies (how a narrow write affects the rest of a register on a given
// architecture, compiled into invalidation tables), the IR builder boundary (the conversions
// the register file asks a backend to emit), the register file itself with its flag cache
// and pending-merge records, and the live-out snapshot consumed by the block-merge layer.

//! Register-file core.
//!
//! # Key Components
//!
//! ## Facets (`facet`)
//! - One enumerated view per width, lane shape and scalar kind
//! - Pseudo facets resolved against a requested width
//!
//! ## Value Maps (`value_map`)
//! - Const-built facet-to-slot tables per register class
//! - Bitset masks for invalidation and presence queries
//!
//! ## Write Policies (`write_policy`)
//! - Zero-extend, sign-extend or preserve per (class, facet)
//! - Invalidation tables built once per architecture configuration
//!
//! ## Register File (`register_file`)
//! - Lazy facet synthesis with caching
//! - Partial writes recorded for caller-side combining
//! - Condition flags, flag cache and instruction pointer
//!
//! ## Live-Out (`live_out`)
//! - End-of-block bindings for phi construction

pub mod builder;
pub mod error;
pub mod facet;
pub mod live_out;
pub mod register_file;
pub mod value_map;
pub mod write_policy;

pub use builder::{IrBuilder, TypeContext};

pub use error::{
    BuildError,
    BuildResult,
    FacetError,
    FacetResult,
    RegFileError,
    RegFileResult,
};

pub use facet::{Facet, LaneKind, Layout, UnknownFacet, VectorWidth, FACET_COUNT, POINTER_BITS};

pub use live_out::{Binding, LiveOut};

pub use register_file::{
    ArchConfig,
    Flag,
    FlagCache,
    MergeBase,
    PendingMerge,
    Reg,
    RegFileStats,
    RegIndex,
    RegisterFile,
};

pub use value_map::{FacetMask, FacetSet, ValueMap, GP_FACETS, VECTOR128_FACETS, VECTOR256_FACETS};

pub use write_policy::{Extension, InvalidationTable, RegClass, WriteMode, WritePolicy};
