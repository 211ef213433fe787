//! The deferred-certificate stack.
//!
//! While a publication point's manifest is being walked, CA certificates
//! found on it aren't validated right away. Instead they are pushed here
//! and picked up afterwards, which turns what would otherwise be recursion
//! into an explicit LIFO -- the shape FORT-validator's `handle_tal_uri`
//! uses for the same reason: one stack per worker, no sharing.

use std::sync::Arc;
use super::CaCert;


//------------ DeferredCert ---------------------------------------------------------

/// A CA certificate reference found on a manifest, not yet fetched.
#[derive(Clone, Debug)]
pub struct DeferredCert {
    /// The publication point the reference was found under.
    pub parent: Arc<CaCert>,

    /// The referenced certificate's location, relative to `parent`'s
    /// repository.
    pub child_uri: rpki::uri::Rsync,

    /// The certificate chain depth `child_uri` would have, for the
    /// `max_cert_depth` bound.
    pub depth: u32,
}


//------------ DeferredStack ---------------------------------------------------------

/// A worker's LIFO of not-yet-visited CA certificates.
///
/// Popping an empty stack is normal termination, not an error, hence
/// `Option` rather than some dedicated sentinel type.
#[derive(Debug, Default)]
pub struct DeferredStack(Vec<DeferredCert>);

impl DeferredStack {
    pub fn new() -> Self {
        DeferredStack(Vec::new())
    }

    pub fn push(&mut self, entry: DeferredCert) {
        self.0.push(entry)
    }

    pub fn pop(&mut self) -> Option<DeferredCert> {
        self.0.pop()
    }
}
