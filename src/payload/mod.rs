//! Validated payload: VRPs, the table they live in, and the delta store
//! that tracks changes to that table across successive validation runs.

mod delta;
mod history;
mod table;
mod vrp;

pub use self::delta::{Action, Delta};
pub use self::history::{SharedHistory, Status};
pub use self::table::Table;
pub use self::vrp::{AddressPrefix, IpFamily, RoaEntry, RouterKey, Vrp};
