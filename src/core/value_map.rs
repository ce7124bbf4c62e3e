//! Per-register facet slots.
//!
//! A [`FacetSet`] describes which facets one register class tracks. The set
//! is built by a `const fn` into a dense facet-to-slot table, so the lookup
//! on every register access is a single array index. A [`ValueMap`] holds one
//! optional IR value per slot of its set.

use super::error::{FacetError, FacetResult};
use super::facet::{Facet, FACET_COUNT};

/// Bit set over facets, used for invalidation rows and presence queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FacetMask(u64);

impl FacetMask {
    pub const EMPTY: FacetMask = FacetMask(0);

    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn contains(self, facet: Facet) -> bool {
        self.0 & (1u64 << facet.index()) != 0
    }

    pub const fn with(self, facet: Facet) -> Self {
        Self(self.0 | (1u64 << facet.index()))
    }

    pub fn set(&mut self, facet: Facet) {
        self.0 |= 1u64 << facet.index();
    }

    pub fn clear(&mut self, facet: Facet) {
        self.0 &= !(1u64 << facet.index());
    }

    pub fn union(&mut self, other: FacetMask) {
        self.0 |= other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Facets in the mask, in facet declaration order.
    pub fn iter(self) -> impl Iterator<Item = Facet> {
        Facet::ALL.into_iter().filter(move |facet| self.contains(*facet))
    }
}

impl FromIterator<Facet> for FacetMask {
    fn from_iter<T: IntoIterator<Item = Facet>>(iter: T) -> Self {
        let mut mask = FacetMask::new();
        for facet in iter {
            mask.set(facet);
        }
        mask
    }
}

/// A fixed set of facets tracked for one register class.
#[derive(Debug)]
pub struct FacetSet {
    name: &'static str,
    facets: &'static [Facet],
    /// `slots[facet] == 0` means untracked, otherwise slot index + 1.
    slots: [u8; FACET_COUNT],
    mask: FacetMask,
}

impl FacetSet {
    /// Build the lookup table for `facets`. Duplicate or pseudo facets are
    /// rejected at compile time when used in a `const`/`static`.
    pub const fn new(name: &'static str, facets: &'static [Facet]) -> Self {
        let mut slots = [0u8; FACET_COUNT];
        let mut mask = FacetMask::new();
        let mut i = 0;
        while i < facets.len() {
            let facet = facets[i];
            assert!(!facet.is_pseudo(), "pseudo facets cannot own a slot");
            assert!(slots[facet.index()] == 0, "facet listed twice");
            slots[facet.index()] = (i + 1) as u8;
            mask = mask.with(facet);
            i += 1;
        }
        Self { name, facets, slots, mask }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Tracked facets in declaration order.
    pub fn facets(&self) -> &'static [Facet] {
        self.facets
    }

    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    pub fn mask(&self) -> FacetMask {
        self.mask
    }

    pub fn contains(&self, facet: Facet) -> bool {
        self.slots[facet.index()] != 0
    }

    #[inline]
    pub fn slot(&self, facet: Facet) -> Option<usize> {
        match self.slots[facet.index()] {
            0 => None,
            slot => Some(slot as usize - 1),
        }
    }

    /// Fail with a configuration error if `facet` is not tracked.
    pub fn check(&self, facet: Facet) -> FacetResult<usize> {
        self.slot(facet).ok_or(FacetError::NotTracked { facet, set: self.name })
    }
}

/// Facets of a general-purpose register.
pub static GP_FACETS: FacetSet = FacetSet::new(
    "gp",
    &[Facet::I64, Facet::I32, Facet::I16, Facet::I8, Facet::I8H, Facet::Ptr],
);

/// Facets of a 128-bit vector register.
pub static VECTOR128_FACETS: FacetSet = FacetSet::new(
    "vector128",
    &[
        Facet::I128,
        Facet::I8, Facet::V1I8, Facet::V2I8, Facet::V4I8, Facet::V8I8, Facet::V16I8,
        Facet::I16, Facet::V1I16, Facet::V2I16, Facet::V4I16, Facet::V8I16,
        Facet::I32, Facet::V1I32, Facet::V2I32, Facet::V4I32,
        Facet::I64, Facet::V1I64, Facet::V2I64,
        Facet::F32, Facet::V1F32, Facet::V2F32, Facet::V4F32,
        Facet::F64, Facet::V1F64, Facet::V2F64,
    ],
);

/// Facets of a 256-bit vector register.
pub static VECTOR256_FACETS: FacetSet = FacetSet::new(
    "vector256",
    &[
        Facet::I256,
        Facet::I128,
        Facet::I8, Facet::V1I8, Facet::V2I8, Facet::V4I8, Facet::V8I8, Facet::V16I8,
        Facet::I16, Facet::V1I16, Facet::V2I16, Facet::V4I16, Facet::V8I16,
        Facet::I32, Facet::V1I32, Facet::V2I32, Facet::V4I32,
        Facet::I64, Facet::V1I64, Facet::V2I64,
        Facet::F32, Facet::V1F32, Facet::V2F32, Facet::V4F32,
        Facet::F64, Facet::V1F64, Facet::V2F64,
    ],
);

/// Cached IR values for the facets of one register.
#[derive(Debug, Clone)]
pub struct ValueMap<V> {
    set: &'static FacetSet,
    values: Box<[Option<V>]>,
}

impl<V: Copy> ValueMap<V> {
    pub fn new(set: &'static FacetSet) -> Self {
        Self {
            set,
            values: vec![None; set.len()].into_boxed_slice(),
        }
    }

    pub fn set(&self) -> &'static FacetSet {
        self.set
    }

    #[inline]
    #[track_caller]
    fn index(&self, facet: Facet) -> usize {
        match self.set.slot(facet) {
            Some(slot) => slot,
            None => panic!("facet {facet} is not tracked by the {} value map", self.set.name()),
        }
    }

    /// The slot for `facet`. Panics if the facet is not part of the set.
    #[inline]
    #[track_caller]
    pub fn at(&self, facet: Facet) -> &Option<V> {
        &self.values[self.index(facet)]
    }

    /// Mutable slot for `facet`. Panics if the facet is not part of the set.
    #[inline]
    #[track_caller]
    pub fn at_mut(&mut self, facet: Facet) -> &mut Option<V> {
        let slot = self.index(facet);
        &mut self.values[slot]
    }

    /// Checked lookup that reports untracked facets as an error.
    pub fn get(&self, facet: Facet) -> FacetResult<Option<V>> {
        Ok(self.values[self.set.check(facet)?])
    }

    /// The facets of the set, in declaration order.
    pub fn facets(&self) -> &'static [Facet] {
        self.set.facets()
    }

    pub fn clear(&mut self) {
        self.values.fill(None);
    }

    /// Facets that currently hold a value, with their values.
    pub fn present(&self) -> impl Iterator<Item = (Facet, V)> + '_ {
        self.set
            .facets()
            .iter()
            .zip(self.values.iter())
            .filter_map(|(facet, value)| value.map(|value| (*facet, value)))
    }

    pub fn present_mask(&self) -> FacetMask {
        self.present().map(|(facet, _)| facet).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Drop the cached values of every facet in `mask`. Returns how many
    /// values were actually dropped.
    pub fn invalidate(&mut self, mask: FacetMask) -> usize {
        let mut dropped = 0;
        for (facet, value) in self.set.facets().iter().zip(self.values.iter_mut()) {
            if mask.contains(*facet) && value.take().is_some() {
                dropped += 1;
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facet_sets() {
        assert_eq!(GP_FACETS.len(), 6);
        assert_eq!(VECTOR128_FACETS.len(), 26);
        assert_eq!(VECTOR256_FACETS.len(), 27);
        assert!(GP_FACETS.contains(Facet::I8H));
        assert!(!GP_FACETS.contains(Facet::V4I32));
        assert!(!VECTOR128_FACETS.contains(Facet::I256));
        assert!(VECTOR256_FACETS.contains(Facet::I256));
        assert_eq!(GP_FACETS.slot(Facet::I64), Some(0));
        assert_eq!(GP_FACETS.slot(Facet::Ptr), Some(5));
    }

    #[test]
    fn test_value_map_slots() {
        let mut map: ValueMap<u32> = ValueMap::new(&GP_FACETS);
        assert!(map.is_empty());

        *map.at_mut(Facet::I32) = Some(7);
        *map.at_mut(Facet::I8H) = Some(9);
        assert_eq!(*map.at(Facet::I32), Some(7));
        assert_eq!(*map.at(Facet::I64), None);
        assert_eq!(
            map.present().collect::<Vec<_>>(),
            vec![(Facet::I32, 7), (Facet::I8H, 9)]
        );

        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_value_map_facet_order() {
        let map: ValueMap<u32> = ValueMap::new(&VECTOR128_FACETS);
        assert_eq!(map.facets()[0], Facet::I128);
        assert_eq!(map.facets().last(), Some(&Facet::V2F64));
    }

    #[test]
    fn test_checked_lookup() {
        let map: ValueMap<u32> = ValueMap::new(&GP_FACETS);
        assert_eq!(map.get(Facet::I16), Ok(None));
        assert_eq!(
            map.get(Facet::F32),
            Err(FacetError::NotTracked { facet: Facet::F32, set: "gp" })
        );
    }

    #[test]
    #[should_panic(expected = "not tracked")]
    fn test_untracked_facet_panics() {
        let map: ValueMap<u32> = ValueMap::new(&GP_FACETS);
        let _ = map.at(Facet::V4F32);
    }

    #[test]
    fn test_invalidate_mask() {
        let mut map: ValueMap<u32> = ValueMap::new(&GP_FACETS);
        *map.at_mut(Facet::I64) = Some(1);
        *map.at_mut(Facet::I32) = Some(2);
        *map.at_mut(Facet::I8H) = Some(3);

        let dropped = map.invalidate(FacetMask::new().with(Facet::I64).with(Facet::I16));
        assert_eq!(dropped, 1);
        assert_eq!(map.present_mask(), FacetMask::new().with(Facet::I32).with(Facet::I8H));
    }

    #[test]
    fn test_facet_mask_ops() {
        let mut mask = FacetMask::new();
        mask.set(Facet::I8);
        mask.set(Facet::F64);
        assert!(mask.contains(Facet::I8));
        assert_eq!(mask.count(), 2);
        mask.clear(Facet::I8);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![Facet::F64]);

        let mut other = FacetMask::new().with(Facet::I16);
        other.union(mask);
        assert_eq!(other.count(), 2);
    }
}
