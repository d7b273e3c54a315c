//! Link identifiers and link sets.
//!
//! A [`LinkId`] is a small dense non-negative integer, stable for the
//! lifetime of a link and reusable after removal (spec.md §3). A
//! [`LinkSet`] is a bitset over link ids — used for ingress vectors, FIB
//! egress vectors, expected-return vectors, and send-result vectors
//! throughout the forwarder.

use fixedbitset::FixedBitSet;
use std::fmt;

/// A stable, dense link handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(u32);

impl LinkId {
    pub fn new(id: u32) -> Self {
        LinkId(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl From<u32> for LinkId {
    fn from(id: u32) -> Self {
        LinkId(id)
    }
}

/// A set of [`LinkId`]s, backed by a growable bitset.
///
/// Efficient at union, intersection, difference, membership,
/// next-set-bit-after-k, and cardinality, per spec.md §3.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    bits: FixedBitSet,
}

impl LinkSet {
    /// An empty link set.
    pub fn new() -> Self {
        LinkSet {
            bits: FixedBitSet::new(),
        }
    }

    /// A link set containing exactly one link.
    pub fn single(link: LinkId) -> Self {
        let mut set = LinkSet::new();
        set.insert(link);
        set
    }

    pub fn from_iter<I: IntoIterator<Item = LinkId>>(iter: I) -> Self {
        let mut set = LinkSet::new();
        for link in iter {
            set.insert(link);
        }
        set
    }

    fn ensure_capacity(&mut self, index: usize) {
        if index >= self.bits.len() {
            self.bits.grow(index + 1);
        }
    }

    pub fn insert(&mut self, link: LinkId) {
        self.ensure_capacity(link.index());
        self.bits.insert(link.index());
    }

    pub fn remove(&mut self, link: LinkId) {
        if link.index() < self.bits.len() {
            self.bits.set(link.index(), false);
        }
    }

    pub fn contains(&self, link: LinkId) -> bool {
        link.index() < self.bits.len() && self.bits.contains(link.index())
    }

    pub fn is_empty(&self) -> bool {
        self.bits.count_ones(..) == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones(..)
    }

    /// Union `other` into `self` in place.
    pub fn union_with(&mut self, other: &LinkSet) {
        self.ensure_capacity(other.bits.len().saturating_sub(1));
        self.bits.union_with(&other.bits);
    }

    /// Remove every link present in `other` from `self`, in place.
    pub fn difference_with(&mut self, other: &LinkSet) {
        self.bits.difference_with(&other.bits);
    }

    /// Intersect `self` with `other` in place.
    pub fn intersect_with(&mut self, other: &LinkSet) {
        self.bits.intersect_with(&other.bits);
    }

    /// `self ∩ other`, as a fresh set.
    pub fn intersection(&self, other: &LinkSet) -> LinkSet {
        let mut result = self.clone();
        result.intersect_with(other);
        result
    }

    /// `self \ other`, as a fresh set.
    pub fn difference(&self, other: &LinkSet) -> LinkSet {
        let mut result = self.clone();
        result.difference_with(other);
        result
    }

    /// `self ∪ other`, as a fresh set.
    pub fn union(&self, other: &LinkSet) -> LinkSet {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    pub fn intersects(&self, other: &LinkSet) -> bool {
        self.bits.intersection(&other.bits).next().is_some()
    }

    /// The smallest set bit at index ≥ `from`, if any.
    pub fn next_set_bit_after(&self, from: usize) -> Option<LinkId> {
        (from..self.bits.len())
            .find(|&i| self.bits.contains(i))
            .map(|i| LinkId::new(i as u32))
    }

    /// Iterate the member link ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.bits.ones().map(|i| LinkId::new(i as u32))
    }
}

impl fmt::Debug for LinkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<LinkId> for LinkSet {
    fn from_iter<I: IntoIterator<Item = LinkId>>(iter: I) -> Self {
        LinkSet::from_iter(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> LinkSet {
        LinkSet::from_iter(ids.iter().map(|&i| LinkId::new(i)))
    }

    #[test]
    fn union_intersection_difference() {
        let a = set(&[0, 2, 4]);
        let b = set(&[2, 3]);
        assert_eq!(a.union(&b).iter().collect::<Vec<_>>(), vec![LinkId::new(0), LinkId::new(2), LinkId::new(3), LinkId::new(4)]);
        assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), vec![LinkId::new(2)]);
        assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), vec![LinkId::new(0), LinkId::new(4)]);
    }

    #[test]
    fn membership_and_cardinality() {
        let s = set(&[1, 5, 9]);
        assert!(s.contains(LinkId::new(5)));
        assert!(!s.contains(LinkId::new(6)));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn next_set_bit_after() {
        let s = set(&[1, 5, 9]);
        assert_eq!(s.next_set_bit_after(0), Some(LinkId::new(1)));
        assert_eq!(s.next_set_bit_after(2), Some(LinkId::new(5)));
        assert_eq!(s.next_set_bit_after(10), None);
    }

    #[test]
    fn insert_grows_capacity_lazily() {
        let mut s = LinkSet::new();
        s.insert(LinkId::new(63));
        assert!(s.contains(LinkId::new(63)));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn empty_set_is_empty() {
        let s = LinkSet::new();
        assert!(s.is_empty());
        assert_eq!(s.next_set_bit_after(0), None);
    }
}
