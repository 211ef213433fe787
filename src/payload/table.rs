//! The VRP database: a deduplicated, mergeable set of validated payload.

use std::collections::HashSet;
use super::vrp::Vrp;


//------------ Table ---------------------------------------------------------------

/// A set of VRPs collected during one TAL's traversal, or the merge of
/// several such sets.
///
/// Backed by a `HashSet` so `insert` is naturally idempotent under set
/// equality (I3/I4's "duplicate VRPs collapse to a single entry").
#[derive(Clone, Debug, Default)]
pub struct Table {
    vrps: HashSet<Vrp>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    pub fn insert(&mut self, vrp: Vrp) {
        self.vrps.insert(vrp);
    }

    /// Absorbs `other`'s entries into `self`, draining `other`.
    ///
    /// A set union, so commutative and associative (I2) regardless of
    /// which side callers join into.
    pub fn join(&mut self, other: Table) {
        self.vrps.extend(other.vrps);
    }

    pub fn len(&self) -> usize {
        self.vrps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vrps.is_empty()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Vrp)) {
        for vrp in &self.vrps {
            f(vrp)
        }
    }

    pub fn contains(&self, vrp: &Vrp) -> bool {
        self.vrps.contains(vrp)
    }

    /// Returns the table's entries in deterministic serialization order.
    pub fn ordered(&self) -> Vec<Vrp> {
        let mut res: Vec<_> = self.vrps.iter().cloned().collect();
        res.sort();
        res
    }
}

impl FromIterator<Vrp> for Table {
    fn from_iter<I: IntoIterator<Item = Vrp>>(iter: I) -> Self {
        Table { vrps: iter.into_iter().collect() }
    }
}


//============ Testing ==========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::payload::vrp::{AddressPrefix, RoaEntry};
    use rpki::repository::resources::AsId;

    fn entry(asn: u32) -> Vrp {
        Vrp::RoaEntry(RoaEntry::new(
            AsId::from(asn),
            AddressPrefix::new("10.0.0.0".parse().unwrap(), 8),
            24,
        ))
    }

    #[test]
    fn join_is_union() {
        let mut a = Table::new();
        a.insert(entry(1));
        let mut b = Table::new();
        b.insert(entry(1));
        b.insert(entry(2));
        a.join(b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn duplicate_insert_collapses() {
        let mut a = Table::new();
        a.insert(entry(1));
        a.insert(entry(1));
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn ordered_is_deterministic() {
        let mut a = Table::new();
        a.insert(entry(2));
        a.insert(entry(1));
        let first = a.ordered();
        let second = a.ordered();
        assert_eq!(first, second);
    }
}
