//! Register state at the end of a block.
//!
//! The block-merge layer reads a [`LiveOut`] of every predecessor to decide
//! which values need phi nodes in a successor. The snapshot holds exactly what
//! was cached when it was taken: synthesized facets are included, facets that
//! were never read are not.

use hashbrown::HashMap;

use super::facet::Facet;
use super::register_file::{Flag, PendingMerge, Reg};

/// One cached register view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<V> {
    pub reg: Reg,
    pub facet: Facet,
    pub value: V,
}

/// Snapshot of a block's cached registers, flags and instruction pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveOut<V> {
    bindings: HashMap<(Reg, Facet), V>,
    flags: [Option<V>; Flag::COUNT],
    ip: Option<V>,
    compare: Option<(V, V)>,
    pending: HashMap<Reg, PendingMerge<V>>,
}

impl<V: Copy> LiveOut<V> {
    pub(crate) fn new(ip: Option<V>, flags: [Option<V>; Flag::COUNT], compare: Option<(V, V)>) -> Self {
        Self {
            bindings: HashMap::new(),
            flags,
            ip,
            compare,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn bind(&mut self, reg: Reg, facet: Facet, value: V) {
        self.bindings.insert((reg, facet), value);
    }

    pub(crate) fn add_pending(&mut self, reg: Reg, pending: PendingMerge<V>) {
        self.pending.insert(reg, pending);
    }

    pub fn get(&self, reg: Reg, facet: Facet) -> Option<V> {
        self.bindings.get(&(reg, facet)).copied()
    }

    /// All bindings ordered by register, then facet.
    pub fn bindings(&self) -> Vec<Binding<V>> {
        let mut bindings: Vec<_> = self
            .bindings
            .iter()
            .map(|(&(reg, facet), &value)| Binding { reg, facet, value })
            .collect();
        bindings.sort_by_key(|binding| (binding.reg, binding.facet.index()));
        bindings
    }

    /// Registers with at least one cached view, in order.
    pub fn registers(&self) -> Vec<Reg> {
        let mut regs: Vec<Reg> = self.bindings.keys().map(|(reg, _)| *reg).collect();
        regs.sort();
        regs.dedup();
        regs
    }

    /// Cached views of `reg`, in facet declaration order.
    pub fn facets_of(&self, reg: Reg) -> Vec<(Facet, V)> {
        let mut facets: Vec<_> = self
            .bindings
            .iter()
            .filter(|((bound, _), _)| *bound == reg)
            .map(|(&(_, facet), &value)| (facet, value))
            .collect();
        facets.sort_by_key(|(facet, _)| facet.index());
        facets
    }

    pub fn flag(&self, flag: Flag) -> Option<V> {
        self.flags[flag.index()]
    }

    /// Written flags, in [`Flag::ALL`] order.
    pub fn flags(&self) -> impl Iterator<Item = (Flag, V)> + '_ {
        Flag::ALL
            .into_iter()
            .filter_map(|flag| self.flags[flag.index()].map(|value| (flag, value)))
    }

    pub fn ip(&self) -> Option<V> {
        self.ip
    }

    /// Operands of the comparison that produced the flags, if still valid.
    pub fn compare_operands(&self) -> Option<(V, V)> {
        self.compare
    }

    pub fn pending_merge(&self, reg: Reg) -> Option<&PendingMerge<V>> {
        self.pending.get(&reg)
    }

    /// Registers whose partial writes were never combined in this block.
    pub fn pending_registers(&self) -> Vec<Reg> {
        let mut regs: Vec<Reg> = self.pending.keys().copied().collect();
        regs.sort();
        regs
    }

    /// Number of register bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.ip.is_none() && self.flags.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_are_ordered() {
        let mut live_out: LiveOut<u32> = LiveOut::new(None, [None; Flag::COUNT], None);
        live_out.bind(Reg::vector(0), Facet::V4F32, 4);
        live_out.bind(Reg::gp(3), Facet::I8, 3);
        live_out.bind(Reg::gp(3), Facet::I64, 2);
        live_out.bind(Reg::gp(0), Facet::I32, 1);

        let order: Vec<_> = live_out.bindings().iter().map(|b| b.value).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(live_out.registers(), vec![Reg::gp(0), Reg::gp(3), Reg::vector(0)]);
        assert_eq!(live_out.facets_of(Reg::gp(3)), vec![(Facet::I64, 2), (Facet::I8, 3)]);
        assert_eq!(live_out.get(Reg::gp(3), Facet::I16), None);
    }

    #[test]
    fn test_flags_and_ip() {
        let mut flags = [None; Flag::COUNT];
        flags[Flag::Cf.index()] = Some(7);
        let live_out: LiveOut<u32> = LiveOut::new(Some(9), flags, Some((1, 2)));
        assert_eq!(live_out.flags().collect::<Vec<_>>(), vec![(Flag::Cf, 7)]);
        assert_eq!(live_out.flag(Flag::Zf), None);
        assert_eq!(live_out.ip(), Some(9));
        assert_eq!(live_out.compare_operands(), Some((1, 2)));
        assert_eq!(live_out.len(), 0);
        assert!(!live_out.is_empty());
    }
}
