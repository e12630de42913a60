//! Target ranges parsed from CIDR requests

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Message sent back when the request does not look like `A.B.C.D/N`
pub const FORMAT_HINT: &str = "Formato inválido. Use apenas: 192.168.1.0/24 (CIDR).";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("{}", FORMAT_HINT)]
    Format,
    #[error("Octeto {0} (> 255) não permitido em '{1}'")]
    OctetOutOfRange(u32, String),
    #[error("Zeros à esquerda não permitidos em '{0}'")]
    LeadingZero(String),
    #[error("'{0}' não é uma máscara de rede válida")]
    Prefix(u32),
}

/// A validated IPv4 block in CIDR form.
///
/// Host bits of the requested address are masked off, so `192.168.1.77/24`
/// and `192.168.1.0/24` denote the same range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetRange {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl TargetRange {
    /// Build a range from an address and prefix length
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Result<Self, RangeError> {
        if prefix_len > 32 {
            return Err(RangeError::Prefix(prefix_len as u32));
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix_len));
        Ok(Self { network, prefix_len })
    }

    /// Parse a request body of the form `A.B.C.D/N`
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let input = input.trim();
        let (addr_part, prefix_part) = input.split_once('/').ok_or(RangeError::Format)?;

        let octets: Vec<&str> = addr_part.split('.').collect();
        if octets.len() != 4 || !octets.iter().all(|o| is_digits(o, 3)) {
            return Err(RangeError::Format);
        }
        if !is_digits(prefix_part, 2) {
            return Err(RangeError::Format);
        }

        let mut bytes = [0u8; 4];
        for (slot, octet) in bytes.iter_mut().zip(&octets) {
            let value: u32 = octet.parse().map_err(|_| RangeError::Format)?;
            if value > 255 {
                return Err(RangeError::OctetOutOfRange(value, addr_part.to_string()));
            }
            if octet.len() > 1 && octet.starts_with('0') {
                return Err(RangeError::LeadingZero(addr_part.to_string()));
            }
            *slot = value as u8;
        }

        let prefix: u32 = prefix_part.parse().map_err(|_| RangeError::Format)?;
        if prefix > 32 {
            return Err(RangeError::Prefix(prefix));
        }

        Self::new(Ipv4Addr::from(bytes), prefix as u8)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix_len))
    }

    /// A /32 is scanned as a single host, without broadcast discovery
    pub fn is_single_host(&self) -> bool {
        self.prefix_len == 32
    }

    /// Check if an address falls inside the block
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & mask(self.prefix_len) == u32::from(self.network)
    }

    /// Number of addresses yielded by [`TargetRange::hosts`]
    pub fn host_count(&self) -> u64 {
        match self.prefix_len {
            32 => 1,
            31 => 2,
            p => (1u64 << (32 - p)) - 2,
        }
    }

    /// Usable host addresses, in ascending order.
    ///
    /// Network and broadcast addresses are skipped except for /31 and /32,
    /// where every address in the block is a host.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let first = u32::from(self.network);
        let last = u32::from(self.broadcast());
        let (start, end) = if self.prefix_len >= 31 {
            (first, last)
        } else {
            (first + 1, last - 1)
        };
        (start..=end).map(Ipv4Addr::from)
    }
}

impl fmt::Display for TargetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for TargetRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - prefix_len as u32)
    }
}

fn is_digits(s: &str, max_len: usize) -> bool {
    !s.is_empty() && s.len() <= max_len && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_masks_host_bits() {
        let range = TargetRange::parse("192.168.1.77/24").unwrap();
        assert_eq!(range.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(range.prefix_len(), 24);
        assert_eq!(range.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let range = TargetRange::parse("  10.0.0.0/8\r\n").unwrap();
        assert_eq!(range.to_string(), "10.0.0.0/8");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in [
            "not-a-cidr",
            "",
            "10.0.0.0",
            "10.0.0/24",
            "10.0.0.0.0/24",
            "10.0.0.0/",
            "10.0.0.0/024",
            "1000.0.0.0/8",
            "10.0.0.a/8",
            "10.0.0.0/8 extra",
        ] {
            assert_eq!(TargetRange::parse(input), Err(RangeError::Format), "{input}");
        }
    }

    #[test]
    fn test_parse_rejects_octet_out_of_range() {
        let err = TargetRange::parse("10.0.300.1/24").unwrap_err();
        assert_eq!(err, RangeError::OctetOutOfRange(300, "10.0.300.1".to_string()));
    }

    #[test]
    fn test_parse_rejects_bad_prefix() {
        assert_eq!(TargetRange::parse("10.0.0.0/33"), Err(RangeError::Prefix(33)));
    }

    #[test]
    fn test_parse_rejects_leading_zero() {
        assert!(matches!(
            TargetRange::parse("10.0.01.0/24"),
            Err(RangeError::LeadingZero(_))
        ));
    }

    #[test]
    fn test_hosts_skip_network_and_broadcast() {
        let range = TargetRange::parse("10.0.0.0/30").unwrap();
        let hosts: Vec<Ipv4Addr> = range.hosts().collect();
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]);
        assert_eq!(range.host_count(), 2);
    }

    #[test]
    fn test_hosts_point_to_point_and_single() {
        let p2p = TargetRange::parse("10.0.0.4/31").unwrap();
        assert_eq!(p2p.hosts().count(), 2);

        let single = TargetRange::parse("10.0.0.5/32").unwrap();
        assert!(single.is_single_host());
        assert_eq!(single.hosts().collect::<Vec<_>>(), vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert_eq!(single.host_count(), 1);
    }

    #[test]
    fn test_zero_prefix_covers_everything() {
        let range = TargetRange::parse("8.8.8.8/0").unwrap();
        assert_eq!(range.network(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(range.broadcast(), Ipv4Addr::BROADCAST);
        assert!(range.contains(Ipv4Addr::new(1, 2, 3, 4)));
    }

    #[test]
    fn test_contains() {
        let range = TargetRange::parse("192.168.186.0/24").unwrap();
        assert!(range.contains(Ipv4Addr::new(192, 168, 186, 1)));
        assert!(range.contains(Ipv4Addr::new(192, 168, 186, 255)));
        assert!(!range.contains(Ipv4Addr::new(192, 168, 187, 1)));
    }
}
