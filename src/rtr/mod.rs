//! The RPKI-to-Router protocol: wire format and the PDU handler state
//! machine built on top of it.

pub mod pdu;
pub mod serial;
pub mod server;

pub use self::pdu::{ErrorCode, Pdu, PduType, Version};
pub use self::serial::Serial;
pub use self::server::{Handler, Verdict};
