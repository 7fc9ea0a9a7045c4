//! Relation subsets as 64-bit masks over `NodeId`s.
//!
//! Ordering a `RelSet` by its raw mask gives the deterministic traversal
//! order used everywhere in enumeration.

use std::fmt;

use qjoin_core::id::NodeId;
use serde::{Deserialize, Serialize};

pub const MAX_RELATIONS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelSet(u64);

impl RelSet {
    pub const EMPTY: RelSet = RelSet(0);

    pub const fn from_mask(mask: u64) -> Self {
        Self(mask)
    }

    pub const fn mask(self) -> u64 {
        self.0
    }

    pub fn single(node: NodeId) -> Self {
        Self(1u64 << node.get())
    }

    /// `{0, 1, .., n-1}`.
    pub fn first_n(n: usize) -> Self {
        if n >= MAX_RELATIONS {
            Self(u64::MAX)
        } else {
            Self((1u64 << n) - 1)
        }
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Subset level as reported to users: size − 1.
    pub fn level(self) -> usize {
        self.len().saturating_sub(1)
    }

    pub fn contains(self, node: NodeId) -> bool {
        self.0 & (1u64 << node.get()) != 0
    }

    pub fn with(self, node: NodeId) -> Self {
        Self(self.0 | (1u64 << node.get()))
    }

    pub fn without(self, node: NodeId) -> Self {
        Self(self.0 & !(1u64 << node.get()))
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn minus(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn is_disjoint(self, other: Self) -> bool {
        self.0 & other.0 == 0
    }

    pub fn lowest(self) -> Option<NodeId> {
        (self.0 != 0).then(|| NodeId::new(self.0.trailing_zeros()))
    }

    /// Members in ascending id order.
    pub fn iter(self) -> impl Iterator<Item = NodeId> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let bit = rest.trailing_zeros();
            rest &= rest - 1;
            Some(NodeId::new(bit))
        })
    }

    /// Non-empty proper subsets, ascending by mask.
    pub fn proper_subsets(self) -> impl Iterator<Item = RelSet> {
        let full = self.0;
        // Standard submask walk, collected so the order is ascending.
        let mut subs = Vec::new();
        let mut sub = (full.wrapping_sub(1)) & full;
        while sub != 0 {
            subs.push(RelSet(sub));
            sub = (sub - 1) & full;
        }
        subs.reverse();
        subs.into_iter()
    }
}

impl FromIterator<NodeId> for RelSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        iter.into_iter().fold(RelSet::EMPTY, |s, n| s.with(n))
    }
}

impl fmt::Display for RelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, n) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", n.get())?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> RelSet {
        ids.iter().map(|i| NodeId::new(*i)).collect()
    }

    #[test]
    fn basic_set_algebra() {
        let s = set(&[0, 2, 5]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.level(), 2);
        assert!(s.contains(NodeId::new(2)));
        assert!(!s.contains(NodeId::new(1)));
        assert_eq!(s.lowest(), Some(NodeId::new(0)));
        assert_eq!(s.without(NodeId::new(0)), set(&[2, 5]));
        assert_eq!(s.iter().map(|n| n.get()).collect::<Vec<_>>(), vec![0, 2, 5]);
    }

    #[test]
    fn proper_subsets_are_ascending_and_complete() {
        let subs: Vec<u64> = set(&[0, 1, 2]).proper_subsets().map(|s| s.mask()).collect();
        assert_eq!(subs, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn first_n_saturates() {
        assert_eq!(RelSet::first_n(3).mask(), 0b111);
        assert_eq!(RelSet::first_n(64).len(), 64);
    }
}
