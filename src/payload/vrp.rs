//! Validated Payload Records: the two things a validated RPKI tree yields.

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use bytes::Bytes;
use rpki::repository::resources::AsId;
use rpki::repository::roa::FriendlyRoaIpAddress;


//------------ Vrp ---------------------------------------------------------------

/// A single validated payload record, in either of its two shapes.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Vrp {
    RoaEntry(RoaEntry),
    RouterKey(RouterKey),
}

impl Vrp {
    pub fn as_roa_entry(&self) -> Option<&RoaEntry> {
        match self {
            Vrp::RoaEntry(entry) => Some(entry),
            Vrp::RouterKey(_) => None,
        }
    }

    pub fn as_router_key(&self) -> Option<&RouterKey> {
        match self {
            Vrp::RouterKey(key) => Some(key),
            Vrp::RoaEntry(_) => None,
        }
    }
}

impl fmt::Display for Vrp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Vrp::RoaEntry(entry) => entry.fmt(f),
            Vrp::RouterKey(key) => key.fmt(f),
        }
    }
}

/// Orders ROA entries before router keys, then by each variant's own order.
///
/// ROA entries sort by `(ip_family, prefix, asn, max_length)`, so that
/// table serialization is deterministic regardless of insertion order.
impl Ord for Vrp {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Vrp::RoaEntry(a), Vrp::RoaEntry(b)) => a.cmp(b),
            (Vrp::RouterKey(a), Vrp::RouterKey(b)) => a.cmp(b),
            (Vrp::RoaEntry(_), Vrp::RouterKey(_)) => Ordering::Less,
            (Vrp::RouterKey(_), Vrp::RoaEntry(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Vrp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}


//------------ RoaEntry -----------------------------------------------------------

/// A validated ROA payload: `(asn, prefix, max_length)`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RoaEntry {
    asn: AsId,
    prefix: AddressPrefix,
    max_length: u8,
}

impl RoaEntry {
    pub fn new(asn: AsId, prefix: AddressPrefix, max_length: u8) -> Self {
        RoaEntry { asn, prefix, max_length }
    }

    /// Builds one entry per address in a ROA's prefix list.
    pub fn from_roa(asn: AsId, addr: FriendlyRoaIpAddress) -> Self {
        RoaEntry {
            asn,
            prefix: AddressPrefix::from(addr),
            max_length: addr.max_length(),
        }
    }

    pub fn asn(&self) -> AsId {
        self.asn
    }

    pub fn prefix(&self) -> AddressPrefix {
        self.prefix
    }

    pub fn max_length(&self) -> u8 {
        self.max_length
    }

    pub fn ip_family(&self) -> IpFamily {
        if self.prefix.is_v4() { IpFamily::V4 } else { IpFamily::V6 }
    }
}

impl fmt::Display for RoaEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}-{} => {}", self.prefix.address(),
            self.prefix.address_length(), self.max_length, self.asn)
    }
}

/// Orders by `(ip_family, prefix, asn, max_length)`.
impl Ord for RoaEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ip_family().cmp(&other.ip_family())
            .then_with(|| self.prefix.cmp(&other.prefix))
            .then_with(|| self.asn.cmp(&other.asn))
            .then_with(|| self.max_length.cmp(&other.max_length))
    }
}

impl PartialOrd for RoaEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}


//------------ IpFamily ------------------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum IpFamily { V4, V6 }


//------------ AddressPrefix -------------------------------------------------------

/// An IP address prefix: an address plus a prefix length.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AddressPrefix {
    addr: IpAddr,
    len: u8,
}

impl AddressPrefix {
    pub fn new(addr: IpAddr, len: u8) -> Self {
        AddressPrefix { addr, len }
    }

    pub fn is_v4(self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn address(self) -> IpAddr {
        self.addr
    }

    pub fn address_length(self) -> u8 {
        self.len
    }
}

impl From<FriendlyRoaIpAddress> for AddressPrefix {
    fn from(addr: FriendlyRoaIpAddress) -> Self {
        AddressPrefix { addr: addr.address(), len: addr.address_length() }
    }
}

impl fmt::Display for AddressPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}


//------------ RouterKey -----------------------------------------------------------

/// A validated BGPsec router key: `(asn, subject_key_identifier, spki)`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RouterKey {
    asn: AsId,
    ski: [u8; 20],
    spki: Bytes,
}

impl RouterKey {
    pub fn new(asn: AsId, ski: [u8; 20], spki: Bytes) -> Self {
        RouterKey { asn, ski, spki }
    }

    pub fn asn(&self) -> AsId {
        self.asn
    }

    pub fn ski(&self) -> &[u8; 20] {
        &self.ski
    }

    pub fn spki(&self) -> &Bytes {
        &self.spki
    }
}

impl fmt::Display for RouterKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "router-key {} => {}", hex(&self.ski), self.asn)
    }
}

impl Ord for RouterKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.asn.cmp(&other.asn).then_with(|| self.ski.cmp(&other.ski))
    }
}

impl PartialOrd for RouterKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}


//============ Testing ==========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    fn entry(prefix: &str, len: u8, asn: u32, max_len: u8) -> RoaEntry {
        let (addr, plen) = prefix.split_once('/').unwrap();
        let _ = plen;
        RoaEntry::new(
            AsId::from(asn),
            AddressPrefix::new(addr.parse().unwrap(), len),
            max_len,
        )
    }

    #[test]
    fn ordering_is_ip_family_prefix_asn_max_length() {
        let v4 = entry("10.0.0.0/8", 8, 10, 24);
        let v6 = entry("::", 0, 10, 24);
        assert!(v4 < v6);
    }

    #[test]
    fn same_prefix_orders_by_asn_then_max_length() {
        let a = entry("10.0.0.0/8", 8, 10, 24);
        let b = entry("10.0.0.0/8", 8, 20, 24);
        assert!(a < b);
        let c = entry("10.0.0.0/8", 8, 10, 32);
        assert!(a < c);
    }

    #[test]
    fn ipv4_addr_helper() {
        let prefix = AddressPrefix::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)), 8);
        assert!(prefix.is_v4());
    }
}
