// This module defines the error types of the register-file core using thiserror. There are
// three layers. FacetError covers configuration errors: a width that no facet can represent,
// a pseudo facet used where a concrete view is required, a facet outside the set a
// register class tracks, or a value whose IR type is not the type of the facet it is
// written as. These are handler bugs and abort translation of the instruction.
// BuildError is reported by an IR backend when it cannot construct a width conversion.
// RegFileError wraps both and adds the conditions the register file hands back to the
// instruction-handler layer: reads of never-written registers, flags or the instruction
// pointer, and wide reads that need a combine after a preserving partial write. Each variant
// names the offending register and facet so a translation abort can be reported precisely.

//! Error types for the register-file core.

use thiserror::Error;

use super::facet::Facet;
use super::register_file::{Flag, Reg};

/// Configuration errors in facet handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FacetError {
    #[error("no {facet} view of width {bits} bits")]
    UnsupportedWidth { facet: Facet, bits: u32 },

    #[error("pseudo-facet {0} has no concrete layout")]
    PseudoFacet(Facet),

    #[error("facet {facet} is not tracked by the {set} register set")]
    NotTracked { facet: Facet, set: &'static str },

    /// Types are rendered with the backend's `Debug` formatting.
    #[error("value of type {found} written as {facet}, which needs {expected}")]
    TypeMismatch { facet: Facet, expected: String, found: String },
}

/// Errors reported by an IR backend while emitting conversions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("builder has no insertion block")]
    NoInsertPoint,

    #[error("invalid operands for {op}: {reason}")]
    TypeMismatch { op: &'static str, reason: String },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by [`RegisterFile`](super::RegisterFile) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegFileError {
    #[error(transparent)]
    Facet(#[from] FacetError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("register {reg} is out of range")]
    RegisterOutOfRange { reg: Reg },

    #[error("cannot rename {src} onto {dst}: register classes differ")]
    ClassMismatch { dst: Reg, src: Reg },

    #[error("read of uninitialized register {reg} as {facet}")]
    Uninitialized { reg: Reg, facet: Facet },

    #[error("{reg} as {facet} needs a combine of pending partial writes")]
    CombineRequired { reg: Reg, facet: Facet },

    #[error("register {reg} has no pending partial write")]
    NoPendingMerge { reg: Reg },

    #[error("read of uninitialized flag {0}")]
    UninitializedFlag(Flag),

    #[error("read of uninitialized instruction pointer")]
    UninitializedIp,
}

impl RegFileError {
    /// Whether the handler layer is expected to recover from this error by
    /// supplying a value (a default or a combine) rather than aborting.
    pub fn is_deferred(&self) -> bool {
        matches!(
            self,
            RegFileError::Uninitialized { .. }
                | RegFileError::CombineRequired { .. }
                | RegFileError::UninitializedFlag(_)
                | RegFileError::UninitializedIp
        )
    }
}

/// Result type alias for facet operations.
pub type FacetResult<T> = Result<T, FacetError>;

/// Result type alias for IR backend operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type alias for register-file operations.
pub type RegFileResult<T> = Result<T, RegFileError>;
