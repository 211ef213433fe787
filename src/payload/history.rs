//! The delta store: session id, current serial, and the retained history
//! of deltas an RTR session can be brought up to date from.

use std::collections::VecDeque;
use std::sync::Arc;
use log::info;
use rand::Rng;
use crate::rtr::serial::Serial;
use crate::utils::sync::RwLock;
use super::delta::Delta;
use super::table::Table;


//------------ Status ---------------------------------------------------------------

/// The answer to "what do you have for serial X".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// No publication has ever occurred.
    NoDataAvailable,

    /// The requested serial is the current one.
    NoDiff,

    /// The requested serial is retained in history and differs from
    /// current; a delta can be computed.
    DiffAvailable,

    /// The requested serial isn't in the retained history window.
    DiffUndetermined,
}


//------------ SharedHistory ---------------------------------------------------------

/// A shareable handle to the delta store.
///
/// Single-writer (the dispatcher, via [`publish`][Self::publish]) /
/// multi-reader (RTR sessions, via [`status`][Self::status] and
/// [`delta_since`][Self::delta_since]) discipline enforced by the
/// `RwLock` wrapper: a reader always observes `(current_serial, table,
/// history)` as the atomic triple left by the most recently completed
/// write.
#[derive(Clone, Debug)]
pub struct SharedHistory(Arc<RwLock<PayloadHistory>>);

impl SharedHistory {
    pub fn new(keep: usize) -> Self {
        SharedHistory(Arc::new(RwLock::new(PayloadHistory::new(keep))))
    }

    pub fn session_id(&self) -> u16 {
        self.0.read().session_id
    }

    pub fn current_serial(&self) -> Serial {
        self.0.read().current_serial
    }

    pub fn status(&self, requested: Serial) -> Status {
        self.0.read().status(requested)
    }

    pub fn current_table(&self) -> Option<Table> {
        self.0.read().current.clone()
    }

    pub fn delta_since(&self, requested: Serial) -> Option<Arc<Delta>> {
        self.0.read().delta_since(requested)
    }

    /// Publishes `new_table` as the latest VRP set.
    ///
    /// Computes `added`/`removed` against the previous table; if either is
    /// non-empty, bumps the serial and retains the delta. Returns whether a
    /// new serial was actually published.
    pub fn publish(&self, new_table: Table) -> bool {
        let mut history = self.0.write();
        let delta = history.current.as_ref().map(|old| {
            Delta::construct(old, &new_table)
        });
        let published = match delta {
            Some(delta) if !delta.is_empty() => {
                let next = history.current_serial.add(1);
                info!(
                    "Publishing serial {}: {} announced, {} withdrawn.",
                    next, delta.announce_len(), delta.withdraw_len()
                );
                history.push_delta(next, delta);
                history.current_serial = next;
                true
            }
            None => {
                // First publication ever.
                true
            }
            _ => false,
        };
        history.current = Some(new_table);
        published
    }
}


//------------ PayloadHistory ---------------------------------------------------------

/// The actual, lock-protected state of the delta store.
#[derive(Debug)]
struct PayloadHistory {
    /// The current full VRP table, once at least one publication has
    /// happened.
    current: Option<Table>,

    /// Retained deltas, newest first. The front entry's serial is always
    /// `current_serial`.
    deltas: VecDeque<(Serial, Arc<Delta>)>,

    /// The session id chosen once at process start.
    session_id: u16,

    /// The current serial number, `0` until the first publication.
    current_serial: Serial,

    /// How many deltas to retain.
    keep: usize,
}

impl PayloadHistory {
    fn new(keep: usize) -> Self {
        PayloadHistory {
            current: None,
            deltas: VecDeque::with_capacity(keep),
            session_id: rand::thread_rng().gen(),
            current_serial: Serial::from(0),
            keep,
        }
    }

    fn push_delta(&mut self, serial: Serial, delta: Delta) {
        if self.deltas.len() == self.keep {
            let _ = self.deltas.pop_back();
        }
        self.deltas.push_front((serial, Arc::new(delta)));
    }

    /// A delta exists from `requested` to `current_serial` exactly when
    /// the delta labeled `requested + 1` is still retained: since every
    /// publish advances the serial by exactly one and deltas are evicted
    /// oldest-first, the retained serials always form one contiguous run
    /// ending at `current_serial`.
    fn status(&self, requested: Serial) -> Status {
        if self.current.is_none() {
            return Status::NoDataAvailable
        }
        if requested == self.current_serial {
            return Status::NoDiff
        }
        if self.deltas.iter().any(|(serial, _)| *serial == requested.add(1)) {
            Status::DiffAvailable
        } else {
            Status::DiffUndetermined
        }
    }

    /// Folds the retained per-serial deltas into one delta bringing
    /// `requested` up to `current_serial`.
    fn delta_since(&self, requested: Serial) -> Option<Arc<Delta>> {
        if requested == self.current_serial {
            return Some(Arc::new(Delta::default()))
        }
        let idx = self.deltas.iter().position(
            |(serial, _)| *serial == requested.add(1)
        )?;
        let mut combined: Delta = (*self.deltas[idx].1).clone();
        let mut i = idx;
        while i > 0 {
            i -= 1;
            combined = combined.merge(&self.deltas[i].1);
        }
        Some(Arc::new(combined))
    }
}


//============ Testing ==========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::payload::vrp::{AddressPrefix, RoaEntry};
    use crate::payload::vrp::Vrp;
    use rpki::repository::resources::AsId;

    fn entry(asn: u32) -> Vrp {
        Vrp::RoaEntry(RoaEntry::new(
            AsId::from(asn),
            AddressPrefix::new("10.0.0.0".parse().unwrap(), 8),
            24,
        ))
    }

    #[test]
    fn first_publish_has_no_diff_but_is_published() {
        let history = SharedHistory::new(10);
        assert_eq!(history.status(Serial::from(0)), Status::NoDataAvailable);
        let mut t = Table::new();
        t.insert(entry(1));
        assert!(history.publish(t));
        assert_eq!(history.status(history.current_serial()), Status::NoDiff);
    }

    #[test]
    fn republishing_identical_table_does_not_advance_serial() {
        let history = SharedHistory::new(10);
        let mut t = Table::new();
        t.insert(entry(1));
        history.publish(t.clone());
        let serial = history.current_serial();
        history.publish(t);
        assert_eq!(history.current_serial(), serial);
    }

    #[test]
    fn changed_table_advances_serial_by_one() {
        let history = SharedHistory::new(10);
        let mut t1 = Table::new();
        t1.insert(entry(1));
        history.publish(t1);
        let first = history.current_serial();

        let mut t2 = Table::new();
        t2.insert(entry(1));
        t2.insert(entry(2));
        history.publish(t2);
        assert_eq!(history.current_serial(), first.add(1));
    }

    #[test]
    fn unknown_serial_is_undetermined() {
        let history = SharedHistory::new(1);
        let mut t = Table::new();
        t.insert(entry(1));
        history.publish(t);
        assert_eq!(
            history.status(Serial::from(9999)),
            Status::DiffUndetermined
        );
    }
}
