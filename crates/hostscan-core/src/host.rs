//! Host records produced by discovery and completed by enrichment

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Vendor value used when a hardware address has no known manufacturer
pub const UNKNOWN_VENDOR: &str = "Unknown";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid hardware address: '{0}'")]
pub struct LinkAddressError(pub String);

/// A 48-bit hardware (MAC) address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkAddress(pub [u8; 6]);

impl LinkAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Organizationally unique identifier (first three octets)
    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    /// All-zero addresses show up in incomplete neighbour entries
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for LinkAddress {
    type Err = LinkAddressError;

    /// Accepts `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` and `aabb.ccdd.eeff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || LinkAddressError(s.to_string());
        let hex: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }
        let mut octets = [0u8; 6];
        for (i, slot) in octets.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(octets))
    }
}

/// Which discovery path produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    /// Answered the link-layer broadcast
    LinkLayer,
    /// Answered the echo probe only
    Reachability,
    /// Single-host request, identified directly
    Direct,
}

/// One discovered address and everything learned about it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub address: Ipv4Addr,
    pub link_address: Option<LinkAddress>,
    /// `Some("Unknown")` is a resolved value, not a missing one
    pub vendor: Option<String>,
    pub host_name: Option<String>,
    /// Descriptor label to value, in catalog order. Empty when the host
    /// did not answer the management protocol.
    pub management_info: IndexMap<String, String>,
    pub source: DiscoverySource,
}

impl HostRecord {
    pub fn new(address: Ipv4Addr, source: DiscoverySource) -> Self {
        Self {
            address,
            link_address: None,
            vendor: None,
            host_name: None,
            management_info: IndexMap::new(),
            source,
        }
    }

    pub fn with_link_address(mut self, link_address: Option<LinkAddress>) -> Self {
        self.link_address = link_address;
        self
    }

    /// Merge enrichment results into the record. Fields are only ever added.
    pub fn apply(mut self, enrichment: Enrichment) -> Self {
        if enrichment.vendor.is_some() {
            self.vendor = enrichment.vendor;
        }
        if enrichment.host_name.is_some() {
            self.host_name = enrichment.host_name;
        }
        for (label, value) in enrichment.management_info {
            self.management_info.entry(label).or_insert(value);
        }
        self
    }

    /// Name shown to clients: resolved host name, or the address itself
    pub fn display_name(&self) -> String {
        self.host_name
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }
}

/// Everything the enrichment sources found out about one host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub vendor: Option<String>,
    pub host_name: Option<String>,
    pub management_info: IndexMap<String, String>,
}
