//! ARP-based link-layer discovery and neighbour table lookups

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use hostscan_core::{LinkAddress, TargetRange};
use pnet::datalink::{self, Channel, MacAddr, NetworkInterface};
use pnet::ipnetwork::IpNetwork;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::ports::{LinkAddressResolver, LinkLayerProbe};

const ETH_HDR_LEN: usize = 14;
const ARP_LEN: usize = 28;

/// Port used to provoke neighbour resolution before a table lookup
const PRIME_PORT: u16 = 55555;

/// Neighbour table entry; `mac` is missing for unresolved neighbours
#[derive(Debug, Clone)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: Option<LinkAddress>,
}

/// Get current ARP table entries
pub async fn get_arp_table() -> Result<Vec<ArpEntry>> {
    let output = tokio::process::Command::new("ip")
        .args(["-4", "neigh", "show"])
        .kill_on_drop(true)
        .output()
        .await
        .context("running `ip neigh`")?;

    if !output.status.success() {
        bail!(
            "Failed to get ARP table: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let entries: Vec<ArpEntry> = stdout.lines().filter_map(parse_ip_neigh_line).collect();

    trace!("Found {} ARP entries", entries.len());
    Ok(entries)
}

/// Parse a line from `ip neigh show` output
fn parse_ip_neigh_line(line: &str) -> Option<ArpEntry> {
    // Format: "192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE"
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 4 || !parts.contains(&"dev") {
        return None;
    }

    let ip = Ipv4Addr::from_str(parts[0]).ok()?;

    // MAC is missing for INCOMPLETE and FAILED entries
    let mac = parts
        .iter()
        .position(|&p| p == "lladdr")
        .and_then(|idx| parts.get(idx + 1))
        .and_then(|s| LinkAddress::from_str(s).ok())
        .filter(|m| !m.is_zero());

    Some(ArpEntry { ip, mac })
}

/// Hardware address lookups against the kernel neighbour table
///
/// Unknown neighbours are primed with a datagram and looked up again after
/// `settle`.
pub struct NeighbourTable {
    settle: Duration,
}

impl NeighbourTable {
    pub fn new() -> Self {
        Self {
            settle: Duration::from_millis(100),
        }
    }

    async fn lookup(&self, ip: Ipv4Addr) -> Result<Option<LinkAddress>> {
        let entries = get_arp_table().await?;
        Ok(entries.into_iter().find(|e| e.ip == ip).and_then(|e| e.mac))
    }
}

impl Default for NeighbourTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkAddressResolver for NeighbourTable {
    async fn resolve_link_address(&self, ip: Ipv4Addr) -> Result<Option<LinkAddress>> {
        if let Some(mac) = self.lookup(ip).await? {
            return Ok(Some(mac));
        }

        // Any outbound datagram makes the kernel ARP for the neighbour
        if let Ok(socket) = tokio::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
            let _ = socket.send_to(&[], (ip, PRIME_PORT)).await;
        }
        tokio::time::sleep(self.settle).await;
        self.lookup(ip).await
    }
}

/// Broadcast ARP sweep over raw ethernet frames.
///
/// Requires privileges to open a datalink channel.
pub struct ArpBroadcastProbe {
    interface: Option<String>,
}

impl ArpBroadcastProbe {
    /// Use `interface` if given, otherwise the interface attached to the target network
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }
}

#[async_trait]
impl LinkLayerProbe for ArpBroadcastProbe {
    async fn probe(&self, range: &TargetRange, wait: Duration) -> Result<Vec<(Ipv4Addr, LinkAddress)>> {
        let range = *range;
        let interface = self.interface.clone();
        tokio::task::spawn_blocking(move || broadcast_round(interface.as_deref(), range, wait))
            .await
            .context("ARP probe task")?
    }
}

/// Pick the interface and source address used for the sweep
fn select_interface(name: Option<&str>, range: &TargetRange) -> Result<(NetworkInterface, Ipv4Addr)> {
    let interfaces = datalink::interfaces();

    let candidate = interfaces.into_iter().find_map(|iface| {
        if iface.is_loopback() || !iface.is_up() || iface.mac.is_none() {
            return None;
        }
        if let Some(wanted) = name {
            if iface.name != wanted {
                return None;
            }
        }
        let source = iface.ips.iter().find_map(|net| match net {
            IpNetwork::V4(v4) if name.is_some() || v4.contains(range.network()) => Some(v4.ip()),
            _ => None,
        })?;
        Some((iface, source))
    });

    match (candidate, name) {
        (Some(found), _) => Ok(found),
        (None, Some(wanted)) => bail!("interface {} not usable for ARP", wanted),
        (None, None) => bail!("no local interface attached to {}", range),
    }
}

fn broadcast_round(
    interface: Option<&str>,
    range: TargetRange,
    wait: Duration,
) -> Result<Vec<(Ipv4Addr, LinkAddress)>> {
    let (iface, source_ip) = select_interface(interface, &range)?;
    let source_mac = iface
        .mac
        .with_context(|| format!("{} has no hardware address", iface.name))?;

    let config = datalink::Config {
        read_timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let (mut tx, mut rx) = match datalink::channel(&iface, config)
        .with_context(|| format!("opening datalink channel on {}", iface.name))?
    {
        Channel::Ethernet(tx, rx) => (tx, rx),
        _ => bail!("non-ethernet channel for {}", iface.name),
    };

    debug!(
        interface = %iface.name,
        source = %source_ip,
        range = %range,
        "Sending ARP requests"
    );

    for target in range.hosts() {
        let frame = create_request(source_mac, source_ip, target)?;
        if let Some(Err(e)) = tx.send_to(&frame, None) {
            return Err(e).context("sending ARP request");
        }
    }

    let deadline = Instant::now() + wait;
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();

    while Instant::now() < deadline {
        match rx.next() {
            Ok(frame) => {
                if let Some((ip, mac)) = parse_reply(frame) {
                    if range.contains(ip) && seen.insert(ip) {
                        trace!(ip = %ip, mac = %mac, "ARP reply");
                        hosts.push((ip, mac));
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) => return Err(e).context("reading ARP replies"),
        }
    }

    debug!(range = %range, found = hosts.len(), "ARP round complete");
    Ok(hosts)
}

/// Build a broadcast who-has frame for `target`
pub fn create_request(source_mac: MacAddr, source_ip: Ipv4Addr, target: Ipv4Addr) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; ETH_HDR_LEN + ARP_LEN];

    let mut eth = MutableEthernetPacket::new(&mut buffer).context("ethernet buffer too small")?;
    eth.set_destination(MacAddr::broadcast());
    eth.set_source(source_mac);
    eth.set_ethertype(EtherTypes::Arp);

    let mut arp = MutableArpPacket::new(&mut buffer[ETH_HDR_LEN..])
        .context("failed to create mutable ARP packet")?;
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(ArpOperations::Request);
    arp.set_sender_hw_addr(source_mac);
    arp.set_sender_proto_addr(source_ip);
    arp.set_target_hw_addr(MacAddr::zero());
    arp.set_target_proto_addr(target);

    Ok(buffer)
}

/// Extract the sender of an ARP reply frame
pub fn parse_reply(frame: &[u8]) -> Option<(Ipv4Addr, LinkAddress)> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_operation() != ArpOperations::Reply {
        return None;
    }
    let m = arp.get_sender_hw_addr();
    Some((
        arp.get_sender_proto_addr(),
        LinkAddress::new([m.0, m.1, m.2, m.3, m.4, m.5]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_neigh_line_reachable() {
        let line = "192.168.1.100 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(entry.mac.unwrap().to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_parse_zero_lladdr() {
        let line = "192.168.1.100 dev eth0 lladdr 00:00:00:00:00:00 STALE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert!(entry.mac.is_none());
    }

    #[test]
    fn test_parse_incomplete_line() {
        let line = "192.168.1.100 dev eth0 INCOMPLETE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 100));
        assert!(entry.mac.is_none());
    }

    #[test]
    fn test_parse_too_short() {
        assert!(parse_ip_neigh_line("192.168.1.100 dev").is_none());
    }

    #[test]
    fn test_create_request_frame() {
        let src_mac = MacAddr::new(0x01, 0x02, 0x03, 0x04, 0x05, 0x06);
        let src_ip = Ipv4Addr::new(192, 168, 1, 10);
        let target = Ipv4Addr::new(192, 168, 1, 1);

        let buffer = create_request(src_mac, src_ip, target).unwrap();
        let eth = EthernetPacket::new(&buffer).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
        assert_eq!(eth.get_source(), src_mac);
        assert_eq!(eth.get_ethertype(), EtherTypes::Arp);

        let arp = ArpPacket::new(eth.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_sender_proto_addr(), src_ip);
        assert_eq!(arp.get_target_proto_addr(), target);

        // A request is not a reply
        assert!(parse_reply(&buffer).is_none());
    }

    #[test]
    fn test_parse_reply() {
        let mut buffer = create_request(
            MacAddr::new(0xb8, 0x27, 0xeb, 0x10, 0x20, 0x30),
            Ipv4Addr::new(10, 0, 0, 7),
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .unwrap();
        {
            let mut arp = MutableArpPacket::new(&mut buffer[ETH_HDR_LEN..]).unwrap();
            arp.set_operation(ArpOperations::Reply);
        }

        let (ip, mac) = parse_reply(&buffer).unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(mac.to_string(), "b8:27:eb:10:20:30");
    }

    #[test]
    fn test_parse_reply_rejects_truncated() {
        let buffer = create_request(
            MacAddr::new(1, 2, 3, 4, 5, 6),
            Ipv4Addr::new(10, 0, 0, 7),
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .unwrap();
        assert!(parse_reply(&buffer[..ETH_HDR_LEN + 10]).is_none());
    }
}
