//! Management attribute queries over SNMPv2c

use hostscan_core::{Catalog, Descriptor};
use indexmap::IndexMap;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;
use tracing::{debug, trace};

use crate::ber::{parse_oid, CodecError};
use crate::transport::SnmpTransport;

/// Standard SNMP agent port
pub const SNMP_PORT: u16 = 161;

/// Community used when none is configured
pub const DEFAULT_COMMUNITY: &str = "public";

/// Default timeout for a single GET
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

#[derive(Error, Debug)]
pub enum SnmpError {
    #[error("No response from {0}")]
    Timeout(SocketAddr),
    #[error("Agent returned error status {0}")]
    ErrorStatus(i64),
    #[error("Response carried no variable bindings")]
    EmptyResponse,
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object names known to the resolver: module, object, base OID
const MIB_OBJECTS: &[(&str, &str, &str)] = &[
    ("SNMPv2-MIB", "sysDescr", "1.3.6.1.2.1.1.1"),
    ("SNMPv2-MIB", "sysObjectID", "1.3.6.1.2.1.1.2"),
    ("SNMPv2-MIB", "sysUpTime", "1.3.6.1.2.1.1.3"),
    ("SNMPv2-MIB", "sysContact", "1.3.6.1.2.1.1.4"),
    ("SNMPv2-MIB", "sysName", "1.3.6.1.2.1.1.5"),
    ("SNMPv2-MIB", "sysLocation", "1.3.6.1.2.1.1.6"),
    ("SNMPv2-MIB", "sysServices", "1.3.6.1.2.1.1.7"),
    ("IF-MIB", "ifNumber", "1.3.6.1.2.1.2.1"),
    ("IF-MIB", "ifDescr", "1.3.6.1.2.1.2.2.1.2"),
    ("IF-MIB", "ifType", "1.3.6.1.2.1.2.2.1.3"),
    ("IF-MIB", "ifMtu", "1.3.6.1.2.1.2.2.1.4"),
    ("IF-MIB", "ifSpeed", "1.3.6.1.2.1.2.2.1.5"),
    ("IF-MIB", "ifPhysAddress", "1.3.6.1.2.1.2.2.1.6"),
    ("IF-MIB", "ifOperStatus", "1.3.6.1.2.1.2.2.1.8"),
    ("HOST-RESOURCES-MIB", "hrSystemUptime", "1.3.6.1.2.1.25.1.1"),
    ("HOST-RESOURCES-MIB", "hrSystemNumUsers", "1.3.6.1.2.1.25.1.5"),
    ("HOST-RESOURCES-MIB", "hrSystemProcesses", "1.3.6.1.2.1.25.1.6"),
    ("HOST-RESOURCES-MIB", "hrMemorySize", "1.3.6.1.2.1.25.2.2"),
];

/// Resolve a descriptor to a numeric object identifier.
///
/// Returns `None` for malformed OIDs and for objects outside the built-in
/// module table.
pub fn resolve_descriptor(descriptor: &Descriptor) -> Option<Vec<u32>> {
    match descriptor {
        Descriptor::NumericOid { oid } => parse_oid(oid).ok(),
        Descriptor::NamedObject {
            module,
            object,
            index,
        } => {
            let (_, _, base) = MIB_OBJECTS
                .iter()
                .find(|(m, o, _)| m.eq_ignore_ascii_case(module) && *o == object.as_str())?;
            let mut arcs = parse_oid(base).ok()?;
            arcs.push(*index);
            Some(arcs)
        }
    }
}

/// Fetch every catalog attribute from one agent.
///
/// One GET per descriptor, in catalog order. Missing, empty and exception
/// values are left out of the result. If the agent does not answer the
/// first request the host is treated as silent and no further requests are
/// sent.
pub async fn fetch_management_info(
    ip: IpAddr,
    port: u16,
    community: &str,
    catalog: &Catalog,
    timeout_ms: u64,
) -> Result<IndexMap<String, String>, SnmpError> {
    let mut info = IndexMap::new();
    if catalog.is_empty() {
        return Ok(info);
    }

    let mut transport = SnmpTransport::new(ip, port, timeout_ms).await?;
    let mut answered = false;

    for entry in catalog.entries() {
        let Some(oid) = resolve_descriptor(&entry.descriptor) else {
            debug!(descriptor = %entry.descriptor, "Unresolvable descriptor, skipping");
            continue;
        };

        match transport.get(community, &oid).await {
            Ok(value) => {
                answered = true;
                if let Some(text) = value.to_text() {
                    info.insert(entry.label.clone(), text);
                } else {
                    trace!(ip = %ip, descriptor = %entry.descriptor, "No value");
                }
            }
            Err(SnmpError::Timeout(_)) if !answered => {
                trace!(ip = %ip, "Agent silent, giving up");
                break;
            }
            Err(e) => {
                answered = true;
                debug!(ip = %ip, descriptor = %entry.descriptor, error = %e, "SNMP GET failed");
            }
        }
    }

    Ok(info)
}
