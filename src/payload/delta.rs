//! Changes between two versions of the VRP table.

use std::cmp::Ordering;
use super::table::Table;
use super::vrp::Vrp;


//------------ Action --------------------------------------------------------------

/// Whether a VRP is being added or removed by a delta.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    Announce,
    Withdraw,
}


//------------ Delta ---------------------------------------------------------------

/// The changes between two snapshots of the VRP table: what got added,
/// what got withdrawn.
///
/// Items are kept in `Vrp`'s own order, which lets both `construct` and
/// `merge` run as a single linear merge over two sorted sequences rather
/// than a hash-based diff.
#[derive(Clone, Debug, Default)]
pub struct Delta {
    items: Vec<(Vrp, Action)>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn announce_len(&self) -> usize {
        self.items.iter().filter(|(_, a)| matches!(a, Action::Announce)).count()
    }

    pub fn withdraw_len(&self) -> usize {
        self.items.iter().filter(|(_, a)| matches!(a, Action::Withdraw)).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Vrp, Action)> {
        self.items.iter()
    }

    /// Builds the delta turning `old` into `new`.
    ///
    /// Both tables are sorted once up front, then walked with two cursors:
    /// an item only in `old` is a withdrawal, only in `new` is an
    /// announcement, and an item in both is unchanged and dropped.
    pub fn construct(old: &Table, new: &Table) -> Delta {
        let old = old.ordered();
        let new = new.ordered();
        let mut items = Vec::new();

        let mut old_iter = old.into_iter().peekable();
        let mut new_iter = new.into_iter().peekable();

        loop {
            match (old_iter.peek(), new_iter.peek()) {
                (Some(o), Some(n)) => {
                    match o.cmp(n) {
                        Ordering::Less => {
                            items.push((old_iter.next().unwrap(), Action::Withdraw));
                        }
                        Ordering::Greater => {
                            items.push((new_iter.next().unwrap(), Action::Announce));
                        }
                        Ordering::Equal => {
                            old_iter.next();
                            new_iter.next();
                        }
                    }
                }
                (Some(_), None) => {
                    items.push((old_iter.next().unwrap(), Action::Withdraw));
                }
                (None, Some(_)) => {
                    items.push((new_iter.next().unwrap(), Action::Announce));
                }
                (None, None) => break,
            }
        }

        Delta { items }
    }

    /// Applies `self` and then `other` in sequence, producing the single
    /// delta equivalent to both.
    ///
    /// Used when a router's requested serial is more than one step behind
    /// the current one: the retained per-serial deltas are folded together
    /// instead of recomputing from the snapshots.
    pub fn merge(&self, other: &Delta) -> Delta {
        let mut items = Vec::new();
        let mut old_iter = self.items.iter().peekable();
        let mut new_iter = other.items.iter().peekable();

        loop {
            match (old_iter.peek(), new_iter.peek()) {
                (Some((o, _)), Some((n, _))) => {
                    match o.cmp(n) {
                        Ordering::Less => items.push(old_iter.next().unwrap().clone()),
                        Ordering::Greater => items.push(new_iter.next().unwrap().clone()),
                        Ordering::Equal => {
                            let (vrp, old_action) = old_iter.next().unwrap();
                            let (_, new_action) = new_iter.next().unwrap();
                            match (old_action, new_action) {
                                (Action::Announce, Action::Withdraw)
                                | (Action::Withdraw, Action::Announce) => {
                                    // Cancel out: present in neither delta's
                                    // net effect.
                                }
                                _ => items.push((vrp.clone(), *new_action)),
                            }
                        }
                    }
                }
                (Some(_), None) => items.push(old_iter.next().unwrap().clone()),
                (None, Some(_)) => items.push(new_iter.next().unwrap().clone()),
                (None, None) => break,
            }
        }

        Delta { items }
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
    fn construct_detects_additions_and_removals() {
        let mut old = Table::new();
        old.insert(entry(1));
        let mut new = Table::new();
        new.insert(entry(2));

        let delta = Delta::construct(&old, &new);
        assert_eq!(delta.announce_len(), 1);
        assert_eq!(delta.withdraw_len(), 1);
    }

    #[test]
    fn construct_of_identical_tables_is_empty() {
        let mut t = Table::new();
        t.insert(entry(1));
        let delta = Delta::construct(&t, &t.clone());
        assert!(delta.is_empty());
    }

    #[test]
    fn merge_cancels_opposing_actions() {
        let mut empty = Table::new();
        let mut with_one = Table::new();
        with_one.insert(entry(1));

        let add = Delta::construct(&empty, &with_one);
        let remove = Delta::construct(&with_one, &empty);
        let merged = add.merge(&remove);
        assert!(merged.is_empty());
        let _ = &mut empty;
    }
}
