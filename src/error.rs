//! Error types used across the crate.
//!
//! There are two narrow error types that get passed around internally —
//! [`Failed`] and [`ExitError`] — plus the wider, tagged [`Error`] enum
//! that callers outside the validation hot path are expected to match on.
//! The internal types exist because, once an operation has already logged
//! what went wrong, there is nothing left for an intermediate caller to do
//! but propagate a unit value; inventing a payload for it would just be
//! noise that has to be matched at every level.

use std::{fmt, io};
use log::error;


//------------ Failed --------------------------------------------------------

/// An operation has failed to complete.
///
/// Diagnostic information has already been logged; the caller can't
/// really do anything but unwind.
#[derive(Clone, Copy, Debug)]
pub struct Failed;

impl fmt::Display for Failed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "operation failed (see log)")
    }
}


//------------ ExitError ------------------------------------------------------

/// An error that should lead to terminating the process.
#[derive(Clone, Copy, Debug)]
pub enum ExitError {
    /// Something has happened. Exit status 1.
    Generic,

    /// A validation pass produced no usable result. Exit status 2.
    IncompleteUpdate,

    /// An object could not be validated. Exit status 3.
    Invalid,
}

impl ExitError {
    pub fn exit_code(self) -> i32 {
        match self {
            ExitError::Generic => 1,
            ExitError::IncompleteUpdate => 2,
            ExitError::Invalid => 3,
        }
    }
}

impl From<Failed> for ExitError {
    fn from(_: Failed) -> ExitError {
        error!("Fatal error. Exiting.");
        ExitError::Generic
    }
}


//------------ Error -----------------------------------------------------------

/// A tagged error covering every failure category the crate produces.
///
/// The original validator this crate is modeled after mixes positive
/// `errno`-style values, their negation, and a handful of domain-specific
/// codes. This type replaces all of that with explicit variants so callers
/// match on meaning rather than sign.
#[derive(Debug)]
pub enum Error {
    /// A TAL, manifest, or other structured file failed to parse.
    Parse(String),

    /// A repository fetch failed (rsync or RRDP transport, timeout).
    Fetch(String),

    /// Signature, hash, or resource-encompassment verification failed.
    Crypto(String),

    /// An RTR session violated the protocol.
    Protocol(String),

    /// Programmer error: a supposed invariant did not hold.
    Internal(String),

    /// Wrapped I/O error.
    Io(io::Error),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Error {
        Error::Protocol(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse(msg) => write!(f, "parse error: {}", msg),
            Error::Fetch(msg) => write!(f, "fetch error: {}", msg),
            Error::Crypto(msg) => write!(f, "validation error: {}", msg),
            Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
            Error::Io(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error { }

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
