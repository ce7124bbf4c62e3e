//! Register facets.
//!
//! A facet is one typed, fixed-width view of an architectural register: the
//! low 32 bits of a general-purpose register, the legacy high byte, a vector
//! register seen as `<4 x float>`, and so on. Every concrete facet has a
//! [`Layout`] (lane kind, lane width, lane count and bit offset inside the
//! register) and maps to exactly one IR type. Pseudo facets (`I`, `VI8`, ...)
//! only describe a request of natural width and must be resolved first.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::builder::TypeContext;
use super::error::{FacetError, FacetResult};

/// Width of the pointer view of a general-purpose register.
pub const POINTER_BITS: u32 = 64;

/// Number of facets, including pseudo facets.
pub const FACET_COUNT: usize = 36;

/// Configured width of the vector registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VectorWidth {
    V128,
    V256,
}

impl VectorWidth {
    pub const fn bits(self) -> u32 {
        match self {
            VectorWidth::V128 => 128,
            VectorWidth::V256 => 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Facet {
    I64,
    I32,
    I16,
    I8,
    /// Bits 8..16 of a general-purpose register (AH, BH, ...).
    I8H,
    Ptr,

    I128,
    I256,
    V1I8,
    V2I8,
    V4I8,
    V8I8,
    V16I8,
    V1I16,
    V2I16,
    V4I16,
    V8I16,
    V1I32,
    V2I32,
    V4I32,
    V1I64,
    V2I64,
    V1F32,
    V2F32,
    V4F32,
    V1F64,
    V2F64,
    F32,
    F64,

    // Pseudo facets
    I,
    VI8,
    VI16,
    VI32,
    VI64,
    VF32,
    VF64,
}

/// Scalar kind of the lanes of a facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKind {
    Int,
    Float,
    Ptr,
}

/// Position and shape of a facet inside its register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    pub kind: LaneKind,
    pub lane_bits: u32,
    /// `None` for scalar views, `Some(n)` for `<n x ty>` views.
    pub lanes: Option<u32>,
    /// Bit offset of the view inside the register.
    pub offset: u32,
}

impl Layout {
    const fn scalar(kind: LaneKind, bits: u32) -> Self {
        Self { kind, lane_bits: bits, lanes: None, offset: 0 }
    }

    const fn packed(kind: LaneKind, lane_bits: u32, lanes: u32) -> Self {
        Self { kind, lane_bits, lanes: Some(lanes), offset: 0 }
    }

    /// Total width of the view in bits.
    pub const fn bits(&self) -> u32 {
        match self.lanes {
            Some(lanes) => self.lane_bits * lanes,
            None => self.lane_bits,
        }
    }

    /// One past the highest bit covered by the view.
    pub const fn end(&self) -> u32 {
        self.offset + self.bits()
    }

    /// Every bit of `other` is also covered by `self`.
    pub const fn contains(&self, other: &Layout) -> bool {
        self.offset <= other.offset && other.end() <= self.end()
    }

    pub const fn overlaps(&self, other: &Layout) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }

    /// A scalar integer, i.e. a value the width conversions operate on directly.
    pub const fn is_plain_int(&self) -> bool {
        matches!(self.kind, LaneKind::Int) && self.lanes.is_none()
    }
}

/// Error returned when parsing an unknown facet name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown facet `{0}`")]
pub struct UnknownFacet(pub String);

impl Facet {
    pub const ALL: [Facet; FACET_COUNT] = {
        use Facet::*;
        [
            I64, I32, I16, I8, I8H, Ptr, I128, I256, V1I8, V2I8, V4I8, V8I8, V16I8, V1I16,
            V2I16, V4I16, V8I16, V1I32, V2I32, V4I32, V1I64, V2I64, V1F32, V2F32, V4F32,
            V1F64, V2F64, F32, F64, I, VI8, VI16, VI32, VI64, VF32, VF64,
        ]
    };

    /// Dense index, usable for lookup tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        use Facet::*;
        match self {
            I64 => "i64",
            I32 => "i32",
            I16 => "i16",
            I8 => "i8",
            I8H => "i8h",
            Ptr => "ptr",
            I128 => "i128",
            I256 => "i256",
            V1I8 => "v1i8",
            V2I8 => "v2i8",
            V4I8 => "v4i8",
            V8I8 => "v8i8",
            V16I8 => "v16i8",
            V1I16 => "v1i16",
            V2I16 => "v2i16",
            V4I16 => "v4i16",
            V8I16 => "v8i16",
            V1I32 => "v1i32",
            V2I32 => "v2i32",
            V4I32 => "v4i32",
            V1I64 => "v1i64",
            V2I64 => "v2i64",
            V1F32 => "v1f32",
            V2F32 => "v2f32",
            V4F32 => "v4f32",
            V1F64 => "v1f64",
            V2F64 => "v2f64",
            F32 => "f32",
            F64 => "f64",
            I => "i",
            VI8 => "vi8",
            VI16 => "vi16",
            VI32 => "vi32",
            VI64 => "vi64",
            VF32 => "vf32",
            VF64 => "vf64",
        }
    }

    pub const fn is_pseudo(self) -> bool {
        matches!(
            self,
            Facet::I | Facet::VI8 | Facet::VI16 | Facet::VI32 | Facet::VI64 | Facet::VF32 | Facet::VF64
        )
    }

    /// Layout of a concrete facet, `None` for pseudo facets.
    pub const fn layout(self) -> Option<Layout> {
        use Facet::*;
        use LaneKind::{Float, Int};
        let layout = match self {
            I64 => Layout::scalar(Int, 64),
            I32 => Layout::scalar(Int, 32),
            I16 => Layout::scalar(Int, 16),
            I8 => Layout::scalar(Int, 8),
            I8H => Layout { kind: Int, lane_bits: 8, lanes: None, offset: 8 },
            Ptr => Layout::scalar(LaneKind::Ptr, POINTER_BITS),
            I128 => Layout::scalar(Int, 128),
            I256 => Layout::scalar(Int, 256),
            V1I8 => Layout::packed(Int, 8, 1),
            V2I8 => Layout::packed(Int, 8, 2),
            V4I8 => Layout::packed(Int, 8, 4),
            V8I8 => Layout::packed(Int, 8, 8),
            V16I8 => Layout::packed(Int, 8, 16),
            V1I16 => Layout::packed(Int, 16, 1),
            V2I16 => Layout::packed(Int, 16, 2),
            V4I16 => Layout::packed(Int, 16, 4),
            V8I16 => Layout::packed(Int, 16, 8),
            V1I32 => Layout::packed(Int, 32, 1),
            V2I32 => Layout::packed(Int, 32, 2),
            V4I32 => Layout::packed(Int, 32, 4),
            V1I64 => Layout::packed(Int, 64, 1),
            V2I64 => Layout::packed(Int, 64, 2),
            V1F32 => Layout::packed(Float, 32, 1),
            V2F32 => Layout::packed(Float, 32, 2),
            V4F32 => Layout::packed(Float, 32, 4),
            V1F64 => Layout::packed(Float, 64, 1),
            V2F64 => Layout::packed(Float, 64, 2),
            F32 => Layout::scalar(Float, 32),
            F64 => Layout::scalar(Float, 64),
            I | VI8 | VI16 | VI32 | VI64 | VF32 | VF64 => return None,
        };
        Some(layout)
    }

    /// Like [`Facet::layout`], but reports pseudo facets as an error.
    pub fn concrete_layout(self) -> FacetResult<Layout> {
        self.layout().ok_or(FacetError::PseudoFacet(self))
    }

    /// Width in bits of a concrete facet.
    pub const fn bits(self) -> Option<u32> {
        match self.layout() {
            Some(layout) => Some(layout.bits()),
            None => None,
        }
    }

    /// The full-width integer view of a vector register.
    pub const fn ivec(width: VectorWidth) -> Facet {
        match width {
            VectorWidth::V128 => Facet::I128,
            VectorWidth::V256 => Facet::I256,
        }
    }

    /// The IR type of this facet.
    pub fn ir_type<C: TypeContext + ?Sized>(self, ctx: &C) -> FacetResult<C::Type> {
        let layout = self.concrete_layout()?;
        let lane = match layout.kind {
            LaneKind::Int => ctx.int_type(layout.lane_bits),
            LaneKind::Float => ctx.float_type(layout.lane_bits),
            LaneKind::Ptr => ctx.ptr_type(),
        };
        Ok(match layout.lanes {
            Some(lanes) => ctx.vector_type(lane, lanes),
            None => lane,
        })
    }

    /// Resolve a request of `bits` width to a concrete facet.
    ///
    /// Pseudo facets pick the view of that width (`I` with 32 is `I32`, `VF32`
    /// with 128 is `V4F32`). A concrete facet resolves to itself when its width
    /// matches. Everything else is a configuration error.
    pub fn resolve(self, bits: u32, width: VectorWidth) -> FacetResult<Facet> {
        use Facet::*;
        let resolved = match (self, bits) {
            (I, 8) => Some(I8),
            (I, 16) => Some(I16),
            (I, 32) => Some(I32),
            (I, 64) => Some(I64),
            (I, 128) => Some(I128),
            (I, 256) if width == VectorWidth::V256 => Some(I256),
            (VI8, 8) => Some(V1I8),
            (VI8, 16) => Some(V2I8),
            (VI8, 32) => Some(V4I8),
            (VI8, 64) => Some(V8I8),
            (VI8, 128) => Some(V16I8),
            (VI16, 16) => Some(V1I16),
            (VI16, 32) => Some(V2I16),
            (VI16, 64) => Some(V4I16),
            (VI16, 128) => Some(V8I16),
            (VI32, 32) => Some(V1I32),
            (VI32, 64) => Some(V2I32),
            (VI32, 128) => Some(V4I32),
            (VI64, 64) => Some(V1I64),
            (VI64, 128) => Some(V2I64),
            (VF32, 32) => Some(V1F32),
            (VF32, 64) => Some(V2F32),
            (VF32, 128) => Some(V4F32),
            (VF64, 64) => Some(V1F64),
            (VF64, 128) => Some(V2F64),
            (I256, 256) if width == VectorWidth::V256 => Some(I256),
            (facet, bits) if facet != I256 && facet.bits() == Some(bits) => Some(facet),
            _ => None,
        };
        resolved.ok_or(FacetError::UnsupportedWidth { facet: self, bits })
    }

    /// The canonical integer facet for a read of `bits` width.
    pub fn for_width(bits: u32, width: VectorWidth) -> FacetResult<Facet> {
        Facet::I.resolve(bits, width)
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Facet {
    type Err = UnknownFacet;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Facet::ALL
            .iter()
            .copied()
            .find(|facet| facet.name() == s)
            .ok_or_else(|| UnknownFacet(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_ir::{IrContext, Scalar, Type};
    use bumpalo::Bump;

    #[test]
    fn test_facet_table_is_dense() {
        for (i, facet) in Facet::ALL.iter().enumerate() {
            assert_eq!(facet.index(), i, "{facet} out of order");
        }
    }

    #[test]
    fn test_resolve_supported_widths() {
        for width in [VectorWidth::V128, VectorWidth::V256] {
            assert_eq!(Facet::for_width(8, width), Ok(Facet::I8));
            assert_eq!(Facet::for_width(16, width), Ok(Facet::I16));
            assert_eq!(Facet::for_width(32, width), Ok(Facet::I32));
            assert_eq!(Facet::for_width(64, width), Ok(Facet::I64));
            assert_eq!(Facet::for_width(128, width), Ok(Facet::I128));
            assert_eq!(Facet::for_width(width.bits(), width), Ok(Facet::ivec(width)));
        }
    }

    #[test]
    fn test_resolve_rejects_other_widths() {
        for bits in [0, 1, 7, 24, 48, 96, 512] {
            assert!(Facet::for_width(bits, VectorWidth::V256).is_err(), "{bits} resolved");
        }
        assert_eq!(
            Facet::for_width(256, VectorWidth::V128),
            Err(FacetError::UnsupportedWidth { facet: Facet::I, bits: 256 })
        );
    }

    #[test]
    fn test_resolve_packed_pseudo_facets() {
        let w = VectorWidth::V128;
        assert_eq!(Facet::VF32.resolve(128, w), Ok(Facet::V4F32));
        assert_eq!(Facet::VF32.resolve(32, w), Ok(Facet::V1F32));
        assert_eq!(Facet::VI8.resolve(64, w), Ok(Facet::V8I8));
        assert_eq!(Facet::VI64.resolve(128, w), Ok(Facet::V2I64));
        assert!(Facet::VI64.resolve(32, w).is_err());
        assert!(Facet::VF64.resolve(256, VectorWidth::V256).is_err());
    }

    #[test]
    fn test_concrete_facets_resolve_to_themselves() {
        assert_eq!(Facet::F64.resolve(64, VectorWidth::V128), Ok(Facet::F64));
        assert_eq!(Facet::I8H.resolve(8, VectorWidth::V128), Ok(Facet::I8H));
        assert!(Facet::F64.resolve(32, VectorWidth::V128).is_err());
        assert!(Facet::I256.resolve(256, VectorWidth::V128).is_err());
    }

    #[test]
    fn test_high_byte_layout() {
        let high = Facet::I8H.layout().unwrap();
        let low = Facet::I8.layout().unwrap();
        let word = Facet::I16.layout().unwrap();
        assert_eq!((high.offset, high.bits()), (8, 8));
        assert!(!high.overlaps(&low));
        assert!(word.contains(&high));
        assert!(word.contains(&low));
        assert!(!low.contains(&high));
    }

    #[test]
    fn test_ir_types() {
        let arena = Bump::new();
        let ctx = IrContext::new(&arena);
        assert_eq!(Facet::I32.ir_type(&ctx), Ok(Type::Int(32)));
        assert_eq!(Facet::I8H.ir_type(&ctx), Ok(Type::Int(8)));
        assert_eq!(Facet::Ptr.ir_type(&ctx), Ok(Type::Ptr));
        assert_eq!(Facet::V4F32.ir_type(&ctx), Ok(Type::Vector(Scalar::Float(32), 4)));
        assert_eq!(Facet::V1I64.ir_type(&ctx), Ok(Type::Vector(Scalar::Int(64), 1)));
        assert_eq!(Facet::VI32.ir_type(&ctx), Err(FacetError::PseudoFacet(Facet::VI32)));
    }

    #[test]
    fn test_parse_facet_names() {
        assert_eq!("v4f32".parse::<Facet>(), Ok(Facet::V4F32));
        assert_eq!("i8h".parse::<Facet>(), Ok(Facet::I8H));
        assert_eq!("i7".parse::<Facet>(), Err(UnknownFacet("i7".to_string())));
    }
}
